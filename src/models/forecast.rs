use crate::error::{Error, Result};
use crate::models::base_model::{BatchCapable, BatchScores};
use ndarray::{s, Array1};
use std::collections::VecDeque;

/// Sequence-prediction model: each value is predicted as the mean of the
/// `time_step` values before it, and scored by the absolute prediction error.
///
/// The model collects `history` values of its own before fitting its error
/// threshold (the `percentile` of in-sample errors); until then every value
/// scores `(0.0, 0)`. A `time_step` tail is carried between batches.
#[derive(Debug, Clone)]
pub struct WindowForecast {
    time_step: usize,
    history_len: usize,
    percentile: f64,
    history: Vec<f64>,
    threshold: Option<f64>,
    tail: VecDeque<f64>,
}

impl WindowForecast {
    pub fn new(time_step: usize, history_len: usize, percentile: f64) -> Result<Self> {
        if time_step == 0 {
            return Err(Error::Configuration(
                "window_forecast time_step must be positive".into(),
            ));
        }
        if history_len <= time_step {
            return Err(Error::Configuration(format!(
                "window_forecast history ({}) must exceed time_step ({})",
                history_len, time_step
            )));
        }
        if !(0.0..=1.0).contains(&percentile) {
            return Err(Error::Configuration(format!(
                "window_forecast percentile must lie in [0, 1], got {}",
                percentile
            )));
        }
        Ok(WindowForecast {
            time_step,
            history_len,
            percentile,
            history: Vec::new(),
            threshold: None,
            tail: VecDeque::with_capacity(time_step + 1),
        })
    }

    /// Error threshold, once fitted
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    fn fit(&mut self) {
        let start = self.history.len() - self.history_len;
        let train = Array1::from_vec(self.history.split_off(start));
        self.history.clear();

        let mut errors: Vec<f64> = train
            .windows(self.time_step + 1)
            .into_iter()
            .map(|w| {
                let predicted = w.slice(s![..self.time_step]).mean().unwrap_or(0.0);
                (predicted - w[self.time_step]).abs()
            })
            .collect();
        errors.sort_by(|a, b| a.total_cmp(b));

        self.threshold = Some(percentile(&errors, self.percentile));
        self.tail = train
            .slice(s![train.len() - self.time_step..])
            .iter()
            .copied()
            .collect();
        tracing::info!(
            threshold = self.threshold,
            samples = train.len(),
            "window forecast fitted"
        );
    }

    fn score(&mut self, threshold: f64, value: f64) -> (f64, i64) {
        let out = if self.tail.len() < self.time_step {
            (0.0, 0)
        } else {
            let predicted = self.tail.iter().sum::<f64>() / self.tail.len() as f64;
            let error = (predicted - value).abs();
            (error, i64::from(error > threshold))
        };
        self.tail.push_back(value);
        if self.tail.len() > self.time_step {
            self.tail.pop_front();
        }
        out
    }
}

impl BatchCapable for WindowForecast {
    fn process_batch(&mut self, values: &[f64]) -> Result<BatchScores> {
        let Some(threshold) = self.threshold else {
            self.history.extend_from_slice(values);
            if self.history.len() > self.history_len {
                self.fit();
            }
            return Ok((vec![0.0; values.len()], vec![0; values.len()]));
        };
        Ok(values.iter().map(|&v| self.score(threshold, v)).unzip())
    }
}

/// Linear-interpolated percentile of sorted data, `p` in `[0, 1]`.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 1.0), 4.0);
        assert!((percentile(&data, 0.5) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_short_history() {
        assert!(WindowForecast::new(5, 5, 0.99).is_err());
        assert!(WindowForecast::new(0, 5, 0.99).is_err());
    }

    #[test]
    fn neutral_until_fitted_then_flags_jumps() {
        let mut model = WindowForecast::new(3, 12, 1.0).unwrap();
        let wave = [1.0, 2.0, 1.0, 2.0];

        for _ in 0..3 {
            let (scores, flags) = model.process_batch(&wave).unwrap();
            assert_eq!(scores, vec![0.0; 4]);
            assert_eq!(flags, vec![0; 4]);
        }
        assert!(model.threshold().is_none());

        // 16 values > 12 triggers the fit, still neutral output
        let (scores, _) = model.process_batch(&wave).unwrap();
        assert_eq!(scores, vec![0.0; 4]);
        assert!(model.threshold().is_some());

        let (scores, flags) = model.process_batch(&[1.0, 50.0]).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(flags, vec![0, 1]);
    }
}
