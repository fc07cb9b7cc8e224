use std::f64::{INFINITY, NEG_INFINITY};

/// Running statistics for a univariate stream, with max, min, sum, mean, var and std.
///
/// Mean and variance are maintained incrementally (Welford), so no history is stored.
#[derive(Debug, Clone)]
pub struct RunningStats {
    num_items: u64,
    max: f64,
    min: f64,
    sum: f64,
    mean: f64,
    sum_squares: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    pub fn new() -> Self {
        RunningStats {
            num_items: 0,
            max: NEG_INFINITY,
            min: INFINITY,
            sum: 0.0,
            mean: 0.0,
            sum_squares: 0.0,
        }
    }

    /// Update with a new data point
    pub fn update(&mut self, item: f64) {
        self.num_items += 1;

        if self.max < item {
            self.max = item;
        }
        if self.min > item {
            self.min = item;
        }
        self.sum += item;

        let old_mean = self.mean;
        self.mean += (item - old_mean) / self.num_items as f64;
        self.sum_squares += (item - old_mean) * (item - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.num_items
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Population variance; zero until at least one item is seen.
    pub fn var(&self) -> f64 {
        if self.num_items == 0 {
            0.0
        } else {
            self.sum_squares / self.num_items as f64
        }
    }

    pub fn std(&self) -> f64 {
        self.var().sqrt()
    }

    /// `None` until the first update
    pub fn min(&self) -> Option<f64> {
        (self.num_items > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.num_items > 0).then_some(self.max)
    }
}
