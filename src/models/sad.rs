use crate::error::Result;
use crate::models::base_model::{ScoreFlag, SingleCapable};
use crate::utils::stats::RunningStats;

/// Default z-distance past which the model flags a value on its own.
pub const DEFAULT_Z_CUTOFF: f64 = 3.0;

/// Standard absolute deviation: score = |x - mean| / std over the values learned so far.
///
/// Learns every value it is given until the runtime leaves warm-up, after which
/// the baseline is frozen unless `keep_learning` is set.
#[derive(Debug, Clone)]
pub struct StandardAbsoluteDeviation {
    stats: RunningStats,
    z_cutoff: f64,
    learning: bool,
    keep_learning: bool,
}

impl StandardAbsoluteDeviation {
    pub fn new(z_cutoff: f64, keep_learning: bool) -> Self {
        StandardAbsoluteDeviation {
            stats: RunningStats::new(),
            z_cutoff,
            learning: true,
            keep_learning,
        }
    }

    fn score(&self, x: f64) -> f64 {
        let std = self.stats.std();
        if std == 0.0 {
            return 0.0;
        }
        (x - self.stats.mean()).abs() / std
    }
}

impl Default for StandardAbsoluteDeviation {
    fn default() -> Self {
        Self::new(DEFAULT_Z_CUTOFF, false)
    }
}

impl SingleCapable for StandardAbsoluteDeviation {
    fn process_one(&mut self, x: f64) -> Result<ScoreFlag> {
        if self.learning {
            self.stats.update(x);
        }
        let score = self.score(x);
        Ok((score, i64::from(score > self.z_cutoff)))
    }

    fn on_active(&mut self) {
        self.learning = self.keep_learning;
    }
}
