//! Crate-wide error taxonomy.
//!
//! Every fallible public operation returns `Result<_, EngineError>`.
//! Allocation and I/O failures during construction, save and load are
//! reported through this type rather than aborting; a genuinely fatal
//! programmer error (a strategy used with a label shape it cannot
//! interpret) is the one case that is not recoverable and is documented as
//! such at the call site rather than silently producing garbage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated model file: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("clause {clause} has an invalid record count in its sparse segment")]
    UnexpectedRecordCount { clause: usize },

    #[error("invalid hyperparameters: {0}")]
    InvalidHyperparams(String),

    #[error("misconfigured strategy: {0}")]
    Misconfigured(String),

    #[error("allocation failed")]
    Alloc,
}

pub type Result<T> = std::result::Result<T, EngineError>;
