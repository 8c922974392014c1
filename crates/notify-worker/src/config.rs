//! Worker configuration.

use std::time::Duration;

use crate::error::{Result, WorkerError};

/// Configuration for the executor and the channel handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Tasks executed concurrently (default: available parallelism).
    pub workers: usize,

    /// Tasks accepted beyond `workers` before `submit` starts waiting.
    pub queue_capacity: usize,

    /// How long `shutdown` waits for in-flight tasks.
    pub shutdown_timeout: Duration,

    /// Sender mailbox for email tasks, e.g. `notify <noreply@example.com>`.
    pub email_from: String,

    /// Subject line for email tasks.
    pub email_subject: String,

    /// Simulated provider latency for the SMS and push senders, as an
    /// inclusive range.
    pub simulated_latency: (Duration, Duration),
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, usize::from),
            queue_capacity: 64,
            shutdown_timeout: Duration::from_secs(30),
            email_from: "notify <noreply@localhost>".to_string(),
            email_subject: "Notification".to_string(),
            simulated_latency: (Duration::from_millis(700), Duration::from_millis(800)),
        }
    }
}

impl WorkerConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of concurrent workers.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the email sender.
    #[must_use]
    pub fn email_from(mut self, from: impl Into<String>) -> Self {
        self.email_from = from.into();
        self
    }

    /// Set the email subject.
    #[must_use]
    pub fn email_subject(mut self, subject: impl Into<String>) -> Self {
        self.email_subject = subject.into();
        self
    }

    /// Set the simulated latency range for log-only senders.
    #[must_use]
    pub fn simulated_latency(mut self, min: Duration, max: Duration) -> Self {
        self.simulated_latency = (min, max);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(WorkerError::Config("workers must be greater than 0".into()));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(WorkerError::Config(
                "shutdown_timeout must be greater than 0".into(),
            ));
        }
        if self.email_from.trim().is_empty() {
            return Err(WorkerError::Config("email_from cannot be empty".into()));
        }
        let (min, max) = self.simulated_latency;
        if min > max {
            return Err(WorkerError::Config(format!(
                "simulated latency range is inverted: {min:?} > {max:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkerConfig::default();
        assert!(config.workers > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(WorkerConfig::new().workers(0).validate().is_err());
        assert!(WorkerConfig::new().email_from(" ").validate().is_err());
        assert!(
            WorkerConfig::new()
                .simulated_latency(Duration::from_millis(10), Duration::from_millis(5))
                .validate()
                .is_err()
        );
        assert!(
            WorkerConfig::new()
                .shutdown_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
