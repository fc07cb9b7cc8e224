use crate::error::Result;
use crate::models::base_model::{BatchCapable, BatchScores, ScoreFlag, SingleCapable};

/// Distance-from-threshold model: score = x - threshold, anomalous when below it.
#[derive(Debug, Clone)]
pub struct FixedThreshold {
    threshold: f64,
}

impl FixedThreshold {
    pub fn new(threshold: f64) -> Self {
        FixedThreshold { threshold }
    }

    fn score_flag(&self, x: f64) -> ScoreFlag {
        let score = x - self.threshold;
        (score, i64::from(score < 0.0))
    }
}

impl SingleCapable for FixedThreshold {
    fn process_one(&mut self, x: f64) -> Result<ScoreFlag> {
        Ok(self.score_flag(x))
    }
}

/// Batch form of [`FixedThreshold`], scoring a whole window per call.
#[derive(Debug, Clone)]
pub struct FixedThresholdBatch {
    inner: FixedThreshold,
}

impl FixedThresholdBatch {
    pub fn new(threshold: f64) -> Self {
        FixedThresholdBatch {
            inner: FixedThreshold::new(threshold),
        }
    }
}

impl BatchCapable for FixedThresholdBatch {
    fn process_batch(&mut self, values: &[f64]) -> Result<BatchScores> {
        Ok(values.iter().map(|&v| self.inner.score_flag(v)).unzip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_anomalous() {
        let mut model = FixedThreshold::new(80.0);
        assert_eq!(model.process_one(75.0).unwrap(), (-5.0, 1));
        assert_eq!(model.process_one(85.0).unwrap(), (5.0, 0));
        // Exactly on the threshold is normal
        assert_eq!(model.process_one(80.0).unwrap(), (0.0, 0));
    }

    #[test]
    fn batch_scores_each_value() {
        let mut model = FixedThresholdBatch::new(80.0);
        let (scores, flags) = model.process_batch(&[70.0, 75.0, 90.0]).unwrap();
        assert_eq!(scores, vec![-10.0, -5.0, 10.0]);
        assert_eq!(flags, vec![1, 1, 0]);
    }
}
