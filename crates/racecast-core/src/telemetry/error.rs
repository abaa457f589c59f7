//! Decode errors

use thiserror::Error;

/// Errors that can occur while decoding a transport payload
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Zero-length payload
    #[error("Empty payload")]
    Empty,

    /// Not JSON, or a required field is missing
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `ts_ms` is not a representable instant
    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}
