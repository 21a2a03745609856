//! Worker-specific error types.

use std::io;
use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur while talking to the storage worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Failed to spawn the worker process.
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Failed to write to worker stdin.
    #[error("failed to write to worker: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to serialize request to JSON.
    #[error("failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to deserialize response from JSON.
    #[error("failed to deserialize response: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// Request timed out waiting for response.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Worker process exited before answering.
    #[error("worker process exited unexpectedly")]
    WorkerExited,

    /// Response channel was closed (internal error).
    #[error("response channel closed unexpectedly")]
    ChannelClosed,

    /// Worker returned an error response.
    #[error("worker error: {message} (code: {code})")]
    Remote { code: String, message: String },

    /// The worker has no driver for the configured store.
    #[error("store driver not found: {0}")]
    DriverNotFound(String),

    /// The worker could not reach the store.
    #[error("store connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),
}

impl WorkerError {
    /// Create a remote error from an error response.
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Map a worker error code to a variant.
    pub fn classify(code: &str, message: &str) -> Self {
        match code {
            "DRIVER_NOT_FOUND" => Self::DriverNotFound(message.to_string()),
            "CONNECTION_FAILED" => Self::ConnectionFailed(message.to_string()),
            "INVALID_REQUEST" => Self::InvalidRequest(message.to_string()),
            "METHOD_NOT_FOUND" => Self::MethodNotFound(message.to_string()),
            "WORKER_EXITED" => Self::WorkerExited,
            _ => Self::remote(code, message),
        }
    }

    /// Check if this error indicates the worker has exited.
    pub fn is_worker_exited(&self) -> bool {
        matches!(self, Self::WorkerExited | Self::ChannelClosed)
    }

    /// Whether the store (or the worker in front of it) is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::WorkerExited | Self::ChannelClosed | Self::ConnectionFailed(_)
        )
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for WorkerError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_codes() {
        assert!(matches!(
            WorkerError::classify("CONNECTION_FAILED", "no route"),
            WorkerError::ConnectionFailed(m) if m == "no route"
        ));
        assert!(matches!(
            WorkerError::classify("METHOD_NOT_FOUND", "store.nope"),
            WorkerError::MethodNotFound(_)
        ));
        assert!(WorkerError::classify("WORKER_EXITED", "").is_worker_exited());
    }

    #[test]
    fn test_classify_unknown_code_is_remote() {
        let err = WorkerError::classify("E42", "boom");
        assert!(matches!(err, WorkerError::Remote { ref code, .. } if code == "E42"));
        assert_eq!(err.to_string(), "worker error: boom (code: E42)");
        assert!(!err.is_connectivity());
    }
}
