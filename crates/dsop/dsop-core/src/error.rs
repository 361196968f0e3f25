use thiserror::Error;

/// Everything that can go wrong running a schedule or validating its output.
#[derive(Debug, Error)]
pub enum DsopError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("schedule does not support this configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("validation failed on rank {rank}: frobenius^2 difference {frobenius_sq} exceeds tolerance")]
    Validation { rank: i32, frobenius_sq: f64 },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },
}
