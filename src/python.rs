use crate::adapter::{AdapterMode, Emission, ModelAdapter};
use crate::error::{Error, Result};
use crate::models::base_model::{BatchCapable, BatchScores, Model, ScoreFlag, SingleCapable};
use crate::utils::evaluation::{EvaluationDataset, Evaluator, Metric, MetricOutcome};
use numpy::PyArray1;
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

impl From<Error> for PyErr {
    fn from(err: Error) -> PyErr {
        match err {
            Error::Configuration(_) | Error::ContractViolation { .. } | Error::TransientInput(_) => {
                PyValueError::new_err(err.to_string())
            }
            Error::Io(_) | Error::EvaluationInput { .. } => PyIOError::new_err(err.to_string()),
            other => PyRuntimeError::new_err(other.to_string()),
        }
    }
}

// Flags may come back as floats (numpy); they must still be whole numbers
fn integral_flag(flag: f64) -> Result<i64> {
    if flag.fract() == 0.0 && flag.is_finite() {
        Ok(flag as i64)
    } else {
        Err(Error::contract(format!("flag must be an integer, got {}", flag)))
    }
}

/// Python object exposing `process_one(x) -> (score, flag)`
struct PySingle {
    obj: PyObject,
}

impl SingleCapable for PySingle {
    fn process_one(&mut self, x: f64) -> Result<ScoreFlag> {
        Python::with_gil(|py| {
            let out = self
                .obj
                .call_method1(py, "process_one", (x,))
                .map_err(|e| Error::contract(format!("process_one raised: {}", e)))?;
            let pair: Vec<f64> = out
                .extract(py)
                .map_err(|_| Error::contract("process_one(x) must return (score, flag)"))?;
            match pair.as_slice() {
                [score, flag] => Ok((*score, integral_flag(*flag)?)),
                _ => Err(Error::contract(format!(
                    "process_one(x) must return (score, flag), got {} values",
                    pair.len()
                ))),
            }
        })
    }
}

/// Python object exposing `process_batch(values) -> (scores, flags)`
struct PyBatch {
    obj: PyObject,
}

impl BatchCapable for PyBatch {
    fn process_batch(&mut self, values: &[f64]) -> Result<BatchScores> {
        Python::with_gil(|py| {
            let out = self
                .obj
                .call_method1(py, "process_batch", (values.to_vec(),))
                .map_err(|e| Error::contract(format!("process_batch raised: {}", e)))?;
            let parts: Vec<&PyAny> = out
                .extract(py)
                .map_err(|_| Error::contract("process_batch must return (scores, flags)"))?;
            let [scores, flags] = parts.as_slice() else {
                return Err(Error::contract(format!(
                    "process_batch must return (scores, flags), got {} values",
                    parts.len()
                )));
            };
            let scores: Vec<f64> = scores
                .extract()
                .map_err(|_| Error::contract("scores must be a sequence of numbers"))?;
            let flags: Vec<f64> = flags
                .extract()
                .map_err(|_| Error::contract("flags must be a sequence of numbers"))?;
            let flags = flags
                .into_iter()
                .map(integral_flag)
                .collect::<Result<Vec<i64>>>()?;
            Ok((scores, flags))
        })
    }
}

fn triple(py: Python<'_>, out: Option<Emission>) -> PyObject {
    match out {
        None => py.None(),
        Some(e) => (
            PyArray1::from_vec(py, e.values).to_object(py),
            PyArray1::from_vec(py, e.scores).to_object(py),
            PyArray1::from_vec(py, e.flags).to_object(py),
        )
            .into_py(py),
    }
}

/// Adapter over a Python model object.
///
/// The capability is decided once, here: the object must define exactly one
/// of `process_batch` (requires `batch_size`) or `process_one`.
#[pyclass]
pub struct StreamAdapter {
    inner: ModelAdapter,
}

#[pymethods]
impl StreamAdapter {
    #[new]
    #[pyo3(signature = (model, batch_size=None))]
    fn new(model: &PyAny, batch_size: Option<usize>) -> PyResult<Self> {
        let obj = model.to_object(model.py());
        let model = match (model.hasattr("process_batch")?, model.hasattr("process_one")?) {
            (true, false) => Model::batch(PyBatch { obj }),
            (false, true) => Model::single(PySingle { obj }),
            (true, true) => {
                return Err(Error::Configuration(
                    "model defines both process_batch and process_one; expose exactly one".into(),
                )
                .into())
            }
            (false, false) => {
                return Err(Error::Configuration(
                    "model must define process_batch(values) or process_one(x)".into(),
                )
                .into())
            }
        };
        Ok(StreamAdapter {
            inner: ModelAdapter::new(model, batch_size)?,
        })
    }

    /// Returns `(values, scores, flags)` arrays, or `None` while a batch fills.
    fn feed(&mut self, py: Python<'_>, x: f64) -> PyResult<PyObject> {
        let out = self.inner.feed(x)?;
        Ok(triple(py, out))
    }

    fn flush(&mut self, py: Python<'_>) -> PyResult<PyObject> {
        let out = self.inner.flush()?;
        Ok(triple(py, out))
    }

    #[getter]
    fn pending(&self) -> usize {
        self.inner.pending()
    }

    #[getter]
    fn mode(&self) -> &'static str {
        match self.inner.mode() {
            AdapterMode::Single => "single",
            AdapterMode::Batch { .. } => "batch",
        }
    }
}

/// Offline metrics over in-memory sequences
#[pyclass(name = "Evaluator")]
pub struct PyEvaluator {
    inner: Evaluator,
}

#[pymethods]
impl PyEvaluator {
    #[new]
    #[pyo3(signature = (metrics=None))]
    fn new(metrics: Option<Vec<String>>) -> PyResult<Self> {
        let metrics = match metrics {
            Some(names) => names
                .iter()
                .map(|name| name.parse::<Metric>())
                .collect::<Result<Vec<_>>>()?,
            None => Metric::ALL.to_vec(),
        };
        Ok(PyEvaluator {
            inner: Evaluator::new(metrics),
        })
    }

    /// Returns `{metric: value}`; a metric that cannot be computed maps to `None`.
    #[pyo3(signature = (labels, predictions, scores=None))]
    fn evaluate(
        &self,
        py: Python<'_>,
        labels: Vec<f64>,
        predictions: Vec<f64>,
        scores: Option<Vec<f64>>,
    ) -> PyResult<PyObject> {
        let report = self
            .inner
            .evaluate(&EvaluationDataset::new(labels, predictions, scores));
        let results = PyDict::new(py);
        for (metric, outcome) in &report.results {
            match outcome {
                MetricOutcome::Value(v) => results.set_item(metric.to_string(), *v)?,
                MetricOutcome::NotComputable(_) => results.set_item(metric.to_string(), py.None())?,
            }
        }
        results.set_item("warnings", report.warnings.clone())?;
        Ok(results.into())
    }
}
