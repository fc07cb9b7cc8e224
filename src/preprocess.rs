//! Incremental value normalisation applied before the model sees a sample.

use crate::config::{PreprocessMethod, PreprocessorConfig};
use crate::utils::stats::RunningStats;

#[derive(Debug, Clone)]
enum Scaler {
    Identity,
    /// (x - mean) / std
    Standard(RunningStats),
    /// (x - min) / (max - min)
    MinMax(RunningStats),
}

/// Learns running statistics and rescales each value.
///
/// With `freeze_after_warmup` the statistics stop updating once detection
/// starts; otherwise they keep adapting for the life of the stream.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    scaler: Scaler,
    freeze_after_warmup: bool,
    frozen: bool,
}

impl Preprocessor {
    pub fn new(method: PreprocessMethod, freeze_after_warmup: bool) -> Self {
        let scaler = match method {
            PreprocessMethod::None => Scaler::Identity,
            PreprocessMethod::StandardScaler => Scaler::Standard(RunningStats::new()),
            PreprocessMethod::MinMaxScaler => Scaler::MinMax(RunningStats::new()),
        };
        Preprocessor {
            scaler,
            freeze_after_warmup,
            frozen: false,
        }
    }

    pub fn from_config(config: &PreprocessorConfig) -> Self {
        Self::new(config.method, config.freeze_after_warmup)
    }

    /// Learn from `x` (unless frozen), then return its rescaled form.
    pub fn process(&mut self, x: f64) -> f64 {
        if !self.frozen {
            self.learn_one(x);
        }
        self.transform_one(x)
    }

    pub fn learn_one(&mut self, x: f64) {
        match &mut self.scaler {
            Scaler::Identity => {}
            Scaler::Standard(stats) | Scaler::MinMax(stats) => stats.update(x),
        }
    }

    pub fn transform_one(&self, x: f64) -> f64 {
        match &self.scaler {
            Scaler::Identity => x,
            Scaler::Standard(stats) => safe_div(x - stats.mean(), stats.std()),
            Scaler::MinMax(stats) => match (stats.min(), stats.max()) {
                (Some(min), Some(max)) => safe_div(x - min, max - min),
                _ => 0.0,
            },
        }
    }

    /// Detection has started.
    pub fn on_active(&mut self) {
        self.frozen = self.freeze_after_warmup;
    }
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
