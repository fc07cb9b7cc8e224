pub mod adapter;
pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod phase;
pub mod preprocess;
pub mod processor;
pub mod runtime;
pub mod sinks;
pub mod utils;

#[cfg(feature = "python")]
mod python;

pub use adapter::{AdapterMode, Emission, ModelAdapter};
pub use classify::{Classifier, ThresholdPolicy};
pub use config::PipelineConfig;
pub use error::{Error, Result, WorkUnit};
pub use models::base_model::{BatchCapable, Model, SingleCapable};
pub use phase::{Phase, PhaseController};
pub use processor::{ScoreRecord, StreamProcessor};
pub use runtime::{Pipeline, RunSummary};
pub use utils::evaluation::{EvaluationReport, Evaluator, Metric, MetricOutcome};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// A Python module implemented in Rust.
#[cfg(feature = "python")]
#[pymodule]
fn streamad(_py: Python, m: &PyModule) -> PyResult<()> {
    // Adapter over user models:
    m.add_class::<python::StreamAdapter>()?;

    // Evaluator:
    m.add_class::<python::PyEvaluator>()?;
    Ok(())
}
