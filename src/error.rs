//! The solver's error taxonomy.

use thiserror::Error;

/// All hard errors the core can return from `reset`/`step`. Numerical
/// instability is deliberately not a variant here: it is a soft, per-step
/// warning, surfaced out-of-band via `StepReport` instead of `Result`'s
/// `Err` path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource allocation error: {0}")]
    ResourceAllocation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type SolverResult<T> = Result<T, SolverError>;
