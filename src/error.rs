//! Error types shared by the bnpmix crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the inference engine.
///
/// Configuration and domain errors are raised at setup time, before the
/// first iteration; numerical errors abort a running chain with the
/// collected snapshots already flushed to the collector.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{name} must be symmetric positive definite")]
    NotPositiveDefinite { name: &'static str },
    #[error("degrees of freedom for {name} must exceed {min}, got {value}")]
    DegreesOfFreedom {
        name: &'static str,
        min: f64,
        value: f64,
    },
    #[error("dimension mismatch for {name}: expected {expected}, got {actual}")]
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Cholesky factorization of {name} failed")]
    CholeskyFailed { name: &'static str },
    #[error("state payload does not match the {expected} family")]
    StateMismatch { expected: &'static str },
    #[error("serialization failure: {0}")]
    Serialization(String),
    #[error("collector I/O failure: {0}")]
    Io(#[from] std::io::Error),
}
