//! Worker error types.

use std::time::Duration;

use notify_smtp::SmtpError;
use thiserror::Error;

/// Errors surfaced by the worker pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    /// The task payload is not valid task JSON.
    #[error("failed to decode task: {0}")]
    Decode(#[from] serde_json::Error),

    /// No handler is registered for the task's channel.
    #[error("no handler registered for channel {0:?}")]
    UnknownChannel(String),

    /// The receiver kind does not fit the channel.
    #[error("task {task_id}: channel {channel} cannot deliver to a {receiver} receiver")]
    ReceiverMismatch {
        /// Task ID.
        task_id: i64,
        /// Channel the task was routed to.
        channel: &'static str,
        /// Receiver kind found on the task.
        receiver: &'static str,
    },

    /// Email delivery failed.
    #[error("email delivery failed: {0}")]
    Smtp(#[from] SmtpError),

    /// The executor no longer accepts tasks.
    #[error("executor is shut down")]
    ExecutorClosed,

    /// In-flight tasks did not finish within the shutdown timeout.
    #[error("{pending} task(s) still running after {timeout:?}")]
    ShutdownTimeout {
        /// The configured shutdown timeout.
        timeout: Duration,
        /// Tasks aborted when the timeout fired.
        pending: usize,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WorkerError {
    /// Check if a later attempt at the same task may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Smtp(e) => e.is_transient(),
            Self::ExecutorClosed | Self::ShutdownTimeout { .. } => true,
            _ => false,
        }
    }
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(WorkerError::ExecutorClosed.is_transient());
        assert!(WorkerError::Smtp(SmtpError::ConnectionClosed).is_transient());
        assert!(
            !WorkerError::Smtp(SmtpError::UnexpectedReply {
                command: "RCPT",
                code: 550,
                message: "no such user".into(),
            })
            .is_transient()
        );
        assert!(!WorkerError::UnknownChannel("fax".into()).is_transient());
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: WorkerError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, WorkerError::Decode(_)));
        assert!(!err.is_transient());
    }
}
