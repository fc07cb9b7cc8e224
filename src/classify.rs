//! Score sanitisation and threshold classification.

use crate::config::{ClassifierConfig, Polarity};

/// Finite scores are clipped into `[-SCORE_LIMIT, SCORE_LIMIT]`.
pub const SCORE_LIMIT: f64 = 1e6;

/// A score after sanitisation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sanitized {
    pub score: f64,
    /// The raw score was NaN or infinite and has been replaced by 0.0
    pub replaced: bool,
}

/// Replace non-finite scores with 0.0 and clip the rest.
pub fn sanitize(raw: f64) -> Sanitized {
    if raw.is_finite() {
        Sanitized {
            score: raw.clamp(-SCORE_LIMIT, SCORE_LIMIT),
            replaced: false,
        }
    } else {
        Sanitized {
            score: 0.0,
            replaced: true,
        }
    }
}

/// Online estimate of the `q`-quantile of a score stream.
///
/// Stochastic approximation: the estimate moves up by `step * q` when a score
/// lands above it and down by `step * (1 - q)` otherwise, settling where a
/// fraction `q` of scores fall below it. The first score seeds the estimate.
#[derive(Debug, Clone)]
pub struct QuantileFilter {
    q: f64,
    step: f64,
    estimate: Option<f64>,
    observed: u64,
}

impl QuantileFilter {
    pub fn new(q: f64, step: f64) -> Self {
        QuantileFilter {
            q,
            step,
            estimate: None,
            observed: 0,
        }
    }

    pub fn learn(&mut self, score: f64) {
        self.observed += 1;
        self.estimate = Some(match self.estimate {
            None => score,
            Some(est) if score > est => est + self.step * self.q,
            Some(est) => est - self.step * (1.0 - self.q),
        });
    }

    /// Anomalous when the score exceeds the current estimate; nothing is
    /// anomalous before the first score has been learned.
    pub fn classify(&self, score: f64) -> bool {
        self.estimate.is_some_and(|est| score > est)
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }
}

/// How a sanitised score becomes a flag once detection is active
#[derive(Debug, Clone)]
pub enum ThresholdPolicy {
    /// Keep the model's own flag; polarity is the model's contract
    Model,
    Fixed { cutoff: f64, polarity: Polarity },
    Quantile {
        filter: QuantileFilter,
        adapt_during_detection: bool,
    },
}

impl ThresholdPolicy {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        match *config {
            ClassifierConfig::Model => ThresholdPolicy::Model,
            ClassifierConfig::Fixed { cutoff, polarity } => {
                ThresholdPolicy::Fixed { cutoff, polarity }
            }
            ClassifierConfig::Quantile {
                q,
                step,
                adapt_during_detection,
            } => ThresholdPolicy::Quantile {
                filter: QuantileFilter::new(q, step),
                adapt_during_detection,
            },
        }
    }

    /// Warm-up: only the adaptive policy learns the baseline distribution.
    pub fn learn(&mut self, score: f64) {
        if let ThresholdPolicy::Quantile { filter, .. } = self {
            filter.learn(score);
        }
    }

    /// Flag a score during detection. A frozen quantile policy is read-only here.
    pub fn classify(&mut self, score: f64, model_flag: bool) -> bool {
        match self {
            ThresholdPolicy::Model => model_flag,
            ThresholdPolicy::Fixed { cutoff, polarity } => match polarity {
                Polarity::Below => score < *cutoff,
                Polarity::Above => score > *cutoff,
            },
            ThresholdPolicy::Quantile {
                filter,
                adapt_during_detection,
            } => {
                let flagged = filter.classify(score);
                if *adapt_during_detection {
                    filter.learn(score);
                }
                flagged
            }
        }
    }
}

/// Sanitiser plus threshold policy, applied to every active-phase score.
#[derive(Debug, Clone)]
pub struct Classifier {
    policy: ThresholdPolicy,
}

impl Classifier {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Classifier { policy }
    }

    /// Feed a warm-up score to the policy; non-finite scores are ignored.
    pub fn learn(&mut self, raw: f64) {
        let s = sanitize(raw);
        if !s.replaced {
            self.policy.learn(s.score);
        }
    }

    /// Sanitise and classify one score into `(score, flag)`.
    pub fn classify(&mut self, raw: f64, model_flag: bool) -> (f64, bool) {
        let s = sanitize(raw);
        if s.replaced {
            return (0.0, false);
        }
        (s.score, self.policy.classify(s.score, model_flag))
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_non_finite_and_clips() {
        assert_eq!(sanitize(f64::NAN), Sanitized { score: 0.0, replaced: true });
        assert_eq!(sanitize(f64::INFINITY).score, 0.0);
        assert_eq!(sanitize(f64::NEG_INFINITY).score, 0.0);
        assert_eq!(sanitize(5e6).score, SCORE_LIMIT);
        assert_eq!(sanitize(-5e6).score, -SCORE_LIMIT);
        assert_eq!(sanitize(-3.5), Sanitized { score: -3.5, replaced: false });
    }

    #[test]
    fn non_finite_score_is_never_flagged() {
        let mut classifier = Classifier::new(ThresholdPolicy::Model);
        assert_eq!(classifier.classify(f64::NAN, true), (0.0, false));
    }

    #[test]
    fn clipping_happens_before_fixed_cutoff() {
        let mut classifier = Classifier::new(ThresholdPolicy::Fixed {
            cutoff: 2e6,
            polarity: Polarity::Above,
        });
        // 3e6 clips to 1e6, which is no longer above the cutoff
        assert_eq!(classifier.classify(3e6, false), (SCORE_LIMIT, false));
    }

    #[test]
    fn fixed_policy_polarity() {
        let mut below = ThresholdPolicy::Fixed {
            cutoff: 0.0,
            polarity: Polarity::Below,
        };
        assert!(below.classify(-1.0, false));
        assert!(!below.classify(1.0, true));

        let mut above = ThresholdPolicy::Fixed {
            cutoff: 0.0,
            polarity: Polarity::Above,
        };
        assert!(above.classify(1.0, false));
        assert!(!above.classify(0.0, false));
    }

    #[test]
    fn quantile_estimate_converges() {
        let mut filter = QuantileFilter::new(0.8, 0.001);
        // Uniform grid over [0, 1), visited in a scattered order
        for _ in 0..200 {
            for i in 0..100 {
                filter.learn((i * 37 % 100) as f64 / 100.0);
            }
        }
        let est = filter.estimate().unwrap();
        assert!((est - 0.8).abs() < 0.05, "estimate {}", est);
        assert!(filter.classify(0.95));
        assert!(!filter.classify(0.5));
    }

    #[test]
    fn quantile_is_frozen_unless_adapting() {
        let mut frozen = ThresholdPolicy::Quantile {
            filter: QuantileFilter::new(0.5, 1.0),
            adapt_during_detection: false,
        };
        frozen.learn(1.0);
        for _ in 0..10 {
            frozen.classify(100.0, false);
        }
        match &frozen {
            ThresholdPolicy::Quantile { filter, .. } => assert_eq!(filter.estimate(), Some(1.0)),
            _ => unreachable!(),
        }

        let mut adaptive = ThresholdPolicy::Quantile {
            filter: QuantileFilter::new(0.5, 1.0),
            adapt_during_detection: true,
        };
        adaptive.learn(1.0);
        adaptive.classify(100.0, false);
        match &adaptive {
            ThresholdPolicy::Quantile { filter, .. } => assert_eq!(filter.estimate(), Some(1.5)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn unseeded_quantile_flags_nothing() {
        let mut policy = ThresholdPolicy::from_config(&ClassifierConfig::Quantile {
            q: 0.9,
            step: 0.01,
            adapt_during_detection: false,
        });
        assert!(!policy.classify(1e5, true));
    }
}
