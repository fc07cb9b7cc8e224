//! One request/response contract over single-value and batch models.

use crate::error::{Error, Result};
use crate::models::base_model::{BatchCapable, Model, SingleCapable};

/// Values that went into a model call, with the scores and flags it returned.
///
/// All three sequences always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub values: Vec<f64>,
    pub scores: Vec<f64>,
    pub flags: Vec<u8>,
}

impl Emission {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterMode {
    Single,
    Batch { batch_size: usize },
}

enum Inner {
    Single(Box<dyn SingleCapable>),
    Batch {
        model: Box<dyn BatchCapable>,
        batch_size: usize,
        buffer: Vec<f64>,
        // Hook deferred until the buffered warm-up values reach the model
        activate_after_call: bool,
    },
}

/// Feeds values to a model and normalises what comes back.
///
/// Single models answer every [`feed`](ModelAdapter::feed) immediately. Batch
/// models see nothing until `batch_size` values are buffered; the buffer is
/// taken and cleared before the model is called.
pub struct ModelAdapter {
    inner: Inner,
}

impl ModelAdapter {
    /// `batch_size` is mandatory (and must be positive) for batch models and
    /// ignored for single models.
    pub fn new(model: Model, batch_size: Option<usize>) -> Result<Self> {
        let inner = match model {
            Model::Single(model) => Inner::Single(model),
            Model::Batch(model) => {
                let batch_size = match batch_size {
                    Some(n) if n > 0 => n,
                    Some(_) => {
                        return Err(Error::Configuration(
                            "batch_size must be a positive integer for batch models".into(),
                        ))
                    }
                    None => {
                        return Err(Error::Configuration(
                            "batch_size is required for batch models".into(),
                        ))
                    }
                };
                Inner::Batch {
                    model,
                    batch_size,
                    buffer: Vec::with_capacity(batch_size),
                    activate_after_call: false,
                }
            }
        };
        Ok(ModelAdapter { inner })
    }

    pub fn mode(&self) -> AdapterMode {
        match &self.inner {
            Inner::Single(_) => AdapterMode::Single,
            Inner::Batch { batch_size, .. } => AdapterMode::Batch {
                batch_size: *batch_size,
            },
        }
    }

    /// Number of values buffered and not yet sent to the model
    pub fn pending(&self) -> usize {
        match &self.inner {
            Inner::Single(_) => 0,
            Inner::Batch { buffer, .. } => buffer.len(),
        }
    }

    /// Push one value. Returns `None` while a batch is still filling.
    pub fn feed(&mut self, x: f64) -> Result<Option<Emission>> {
        match &mut self.inner {
            Inner::Single(model) => {
                let (score, flag) = model.process_one(x)?;
                Ok(Some(Emission {
                    values: vec![x],
                    scores: vec![score],
                    flags: vec![coerce_flag(flag)?],
                }))
            }
            Inner::Batch {
                model,
                batch_size,
                buffer,
                activate_after_call,
            } => {
                buffer.push(x);
                if buffer.len() < *batch_size {
                    return Ok(None);
                }
                emit(model.as_mut(), buffer, activate_after_call).map(Some)
            }
        }
    }

    /// Send whatever is buffered to the model, even a short batch.
    ///
    /// Returns `None` for single models and for an empty buffer.
    pub fn flush(&mut self) -> Result<Option<Emission>> {
        match &mut self.inner {
            Inner::Batch {
                model,
                buffer,
                activate_after_call,
                ..
            } if !buffer.is_empty() => emit(model.as_mut(), buffer, activate_after_call).map(Some),
            _ => Ok(None),
        }
    }

    /// Forward the warm-up → detection transition to the model.
    ///
    /// Values still buffered at this point belong to warm-up, so a batch model
    /// only gets the hook right after the call that delivers them. A value
    /// fed after this, sharing that batch, reaches the model before the hook.
    pub fn on_active(&mut self) {
        match &mut self.inner {
            Inner::Single(model) => model.on_active(),
            Inner::Batch {
                model,
                buffer,
                activate_after_call,
                ..
            } => {
                if buffer.is_empty() {
                    model.on_active();
                } else {
                    *activate_after_call = true;
                }
            }
        }
    }
}

fn emit(
    model: &mut dyn BatchCapable,
    buffer: &mut Vec<f64>,
    activate_after_call: &mut bool,
) -> Result<Emission> {
    let values = std::mem::take(buffer);
    let result = model.process_batch(&values);
    // The values were delivered even if the output is rejected below
    if std::mem::take(activate_after_call) {
        model.on_active();
    }
    let (scores, flags) = result?;

    if scores.len() != flags.len() {
        return Err(Error::contract(format!(
            "process_batch returned {} scores but {} flags",
            scores.len(),
            flags.len()
        )));
    }
    if scores.len() != values.len() {
        return Err(Error::contract(format!(
            "process_batch returned {} outputs for {} inputs",
            scores.len(),
            values.len()
        )));
    }

    let flags = flags
        .into_iter()
        .map(coerce_flag)
        .collect::<Result<Vec<u8>>>()?;
    Ok(Emission {
        values,
        scores,
        flags,
    })
}

fn coerce_flag(flag: i64) -> Result<u8> {
    match flag {
        0 => Ok(0),
        1 => Ok(1),
        other => Err(Error::contract(format!(
            "flag must be 0 or 1, got {}",
            other
        ))),
    }
}
