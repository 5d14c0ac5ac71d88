//! Query error types
//!
//! Errors raised while resolving a query's tag filter against the index.

use crate::index::IndexError;
use thiserror::Error;

/// Errors that can occur during query planning
#[derive(Error, Debug)]
pub enum QueryError {
    /// Binary operator other than AND/OR between tag filters
    #[error("wrong binary operator in tag filter: {0}")]
    WrongBinaryOperator(String),

    /// Tag key or tag value lookup failed
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
