pub mod base_model;
pub mod forecast;
pub mod hst;
pub mod sad;
pub mod threshold;

use crate::config::ModelConfig;
use crate::error::Result;
use base_model::Model;

/// Build the configured model and the batch size its adapter needs.
pub fn build(config: &ModelConfig) -> Result<(Model, Option<usize>)> {
    let built = match *config {
        ModelConfig::FixedThreshold { threshold } => {
            (Model::single(threshold::FixedThreshold::new(threshold)), None)
        }
        ModelConfig::FixedThresholdBatch {
            threshold,
            batch_size,
        } => (
            Model::batch(threshold::FixedThresholdBatch::new(threshold)),
            batch_size,
        ),
        ModelConfig::StandardAbsoluteDeviation {
            z_cutoff,
            keep_learning,
        } => (
            Model::single(sad::StandardAbsoluteDeviation::new(z_cutoff, keep_learning)),
            None,
        ),
        ModelConfig::HalfSpaceTrees {
            min,
            max,
            window_size,
            num_trees,
            max_depth,
            anomaly_cutoff,
            seed,
        } => (
            Model::single(hst::HalfSpaceTrees::new(
                min,
                max,
                window_size,
                num_trees,
                max_depth,
                anomaly_cutoff,
                seed,
            )?),
            None,
        ),
        ModelConfig::WindowForecast {
            batch_size,
            time_step,
            history,
            percentile,
        } => (
            Model::batch(forecast::WindowForecast::new(time_step, history, percentile)?),
            batch_size,
        ),
    };
    Ok(built)
}
