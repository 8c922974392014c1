//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a [`ConnectionLifecycle`](crate::ConnectionLifecycle).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool has been closed.
    #[error("connection pool is closed")]
    Closed,

    /// No admission slot became free within the pool timeout.
    #[error("timed out after {timeout:?} waiting for a pool slot")]
    Timeout {
        /// The configured admission timeout.
        timeout: Duration,
    },

    /// The caller cancelled while waiting for admission.
    #[error("pool acquisition cancelled")]
    Cancelled,

    /// Building a new connection failed.
    #[error("failed to establish connection: {0}")]
    Connect(#[source] BoxError),

    /// The pool configuration is invalid.
    #[error("invalid pool configuration: {0}")]
    Config(String),
}

impl PoolError {
    /// Whether retrying the operation later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connect(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(
            PoolError::Timeout {
                timeout: Duration::from_millis(100)
            }
            .is_transient()
        );
        assert!(PoolError::Connect("refused".into()).is_transient());
        assert!(!PoolError::Closed.is_transient());
        assert!(!PoolError::Cancelled.is_transient());
        assert!(!PoolError::Config("bad".into()).is_transient());
    }

    #[test]
    fn test_connect_error_keeps_source() {
        let err = PoolError::Connect("connection refused".into());
        assert_eq!(
            err.to_string(),
            "failed to establish connection: connection refused"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
