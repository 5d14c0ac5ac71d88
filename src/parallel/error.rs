//! Job coordination error types

use crate::models::NodeIndicator;
use thiserror::Error;

/// Errors raised while sending requests to remote nodes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Node could not be reached
    #[error("Node unreachable: {0}")]
    Unreachable(String),

    /// Node refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Transport has been shut down
    #[error("Transport closed")]
    Closed,
}

/// Errors that can occur while submitting or running a job
#[derive(Error, Debug)]
pub enum JobError {
    /// Plan or payload encoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Plan has nothing to dispatch to
    #[error("Physical plan of database '{0}' has no node to dispatch to")]
    EmptyPlan(String),

    /// Sending a task request failed, remaining nodes were not contacted
    #[error("Failed to dispatch task to {indicator}: {source}")]
    Dispatch {
        indicator: NodeIndicator,
        #[source]
        source: TransportError,
    },

    /// A remote sub-task reported failure
    #[error("Task failed on {node}: {message}")]
    TaskFailed { node: NodeIndicator, message: String },

    /// A partial result payload could not be decoded
    #[error("Invalid result payload: {0}")]
    Payload(String),
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Serialization(err.to_string())
    }
}

/// Result type alias for job operations
pub type JobResult<T> = Result<T, JobError>;
