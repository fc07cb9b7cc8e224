//! Error types for the streaming detection runtime.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the unit of work a contract violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkUnit {
    /// A single sample, by its 1-based arrival index
    Sample(u64),
    /// A batch of `len` samples starting at arrival index `start`
    Batch { start: u64, len: usize },
    /// Output produced outside the runtime (e.g. direct adapter use)
    Unattributed,
}

impl std::fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkUnit::Sample(i) => write!(f, "sample #{}", i),
            WorkUnit::Batch { start, len } => {
                write!(f, "batch #{}..#{}", start, start + *len as u64 - 1)
            }
            WorkUnit::Unattributed => write!(f, "model call"),
        }
    }
}

/// Error types for the detection runtime
#[derive(Debug, Error)]
pub enum Error {
    /// Model or pipeline cannot be constructed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A model returned output that breaks the adapter contract
    #[error("Contract violation in {unit}: {reason}")]
    ContractViolation { unit: WorkUnit, reason: String },

    /// Inbound payload could not be turned into a sample
    #[error("Malformed input: {0}")]
    TransientInput(String),

    /// Evaluation file could not be read as a numeric sequence
    #[error("Evaluation input error in {}:{line}: {reason}", path.display())]
    EvaluationInput {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Sink write failure
    #[error("Sink error: {0}")]
    Sink(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration source could not be loaded
    #[error("Config load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}

impl Error {
    /// Contract violation not yet tied to a sample or batch
    pub fn contract(reason: impl Into<String>) -> Self {
        Error::ContractViolation {
            unit: WorkUnit::Unattributed,
            reason: reason.into(),
        }
    }

    /// Re-attribute a contract violation to the unit of work that produced it.
    pub fn attributed_to(self, unit: WorkUnit) -> Self {
        match self {
            Error::ContractViolation { reason, .. } => Error::ContractViolation { unit, reason },
            other => other,
        }
    }

    /// Whether this error is isolated to one unit of work (the stream continues)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ContractViolation { .. } | Error::TransientInput(_) | Error::Sink(_)
        )
    }
}
