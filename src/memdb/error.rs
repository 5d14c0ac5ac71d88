//! Memory database error types

use thiserror::Error;

/// Errors that can occur while buffering or flushing field data
#[derive(Error, Debug)]
pub enum MemDbError {
    /// Segment holds no written slot
    #[error("Segment of family time {0} is empty")]
    EmptySegment(i64),

    /// Segment encoding or decoding failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// Segment payload failed its checksum
    #[error("Corrupt segment: {0}")]
    Corruption(String),

    /// Table flusher refused the payload
    #[error("Flush error: {0}")]
    Flush(String),
}

impl From<bincode::Error> for MemDbError {
    fn from(err: bincode::Error) -> Self {
        MemDbError::Encode(err.to_string())
    }
}

/// Result type alias for memory database operations
pub type MemDbResult<T> = Result<T, MemDbError>;
