//! Error types for kgembed.

use thiserror::Error;

/// kgembed error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error. NaN/Inf losses surface through here untouched.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Invalid configuration, detected eagerly at construction/call time.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An entity or relation id outside its embedding table.
    #[error("{kind} id {id} out of range (table has {num_rows} rows)")]
    IndexOutOfBounds {
        kind: &'static str,
        id: usize,
        num_rows: usize,
    },
}

/// Result type alias for kgembed.
pub type Result<T> = std::result::Result<T, Error>;
