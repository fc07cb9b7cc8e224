use crate::error::Result;

/// Raw `(score, flag)` pair as returned by a model, before coercion.
pub type ScoreFlag = (f64, i64);

/// Raw `(scores, flags)` sequences as returned by a batch model.
pub type BatchScores = (Vec<f64>, Vec<i64>);

/// A model that scores one value per call.
pub trait SingleCapable: Send {
    /// Score one value and classify it by the model's own convention.
    ///
    /// Any learning the model does happens inside this call.
    fn process_one(&mut self, x: f64) -> Result<ScoreFlag>;

    /// Called exactly once when the runtime leaves warm-up.
    fn on_active(&mut self) {}
}

/// A model that scores a fixed-size window of values per call.
pub trait BatchCapable: Send {
    /// Score every value in `values`; both outputs must match its length.
    fn process_batch(&mut self, values: &[f64]) -> Result<BatchScores>;

    /// Called exactly once when the runtime leaves warm-up, after every
    /// warm-up value has been passed to [`process_batch`](Self::process_batch).
    /// Detection values that share a batch with the last warm-up values are
    /// passed in that same call, before this hook.
    fn on_active(&mut self) {}
}

/// A pluggable detection model, tagged by the one capability it exposes.
pub enum Model {
    Single(Box<dyn SingleCapable>),
    Batch(Box<dyn BatchCapable>),
}

impl Model {
    pub fn single(model: impl SingleCapable + 'static) -> Self {
        Model::Single(Box::new(model))
    }

    pub fn batch(model: impl BatchCapable + 'static) -> Self {
        Model::Batch(Box::new(model))
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Model::Batch(_))
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Single(_) => f.write_str("Model::Single"),
            Model::Batch(_) => f.write_str("Model::Batch"),
        }
    }
}
