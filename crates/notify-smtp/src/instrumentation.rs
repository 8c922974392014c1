//! Tracing instrumentation for SMTP operations.
//!
//! Spans follow OpenTelemetry-style naming so they can be exported by any
//! `tracing` subscriber:
//!
//! - `smtp.connect`: connection establishment, including STARTTLS and AUTH
//! - `smtp.send`: one mail transaction, pool acquisition included
//!
//! Recipient addresses are never recorded; only their count is.

use std::time::Instant;

use tracing::Span;

/// Messaging system identifier.
pub const SYSTEM: &str = "smtp";

/// Span names for SMTP operations.
pub mod span_names {
    /// Span name for connection establishment.
    pub const CONNECT: &str = "smtp.connect";
    /// Span name for a mail transaction.
    pub const SEND: &str = "smtp.send";
}

/// Attribute keys.
pub mod attributes {
    /// Server hostname.
    pub const SERVER_ADDRESS: &str = "server.address";
    /// Server port.
    pub const SERVER_PORT: &str = "server.port";
    /// Number of envelope recipients.
    pub const RECIPIENT_COUNT: &str = "smtp.recipient_count";
    /// Rendered message size in bytes.
    pub const MESSAGE_SIZE: &str = "smtp.message_size";
}

/// Span around connection establishment.
#[must_use]
pub fn connect_span(host: &str, port: u16) -> Span {
    tracing::info_span!(
        "smtp.connect",
        messaging.system = SYSTEM,
        server.address = %host,
        server.port = port,
    )
}

/// Span around a mail transaction.
#[must_use]
pub fn send_span(host: &str, recipients: usize, size: usize) -> Span {
    tracing::info_span!(
        "smtp.send",
        messaging.system = SYSTEM,
        server.address = %host,
        smtp.recipient_count = recipients,
        smtp.message_size = size,
    )
}

/// Timer for a single operation, reported through `tracing`.
#[derive(Debug)]
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation.
    #[must_use]
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Elapsed time in seconds.
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Get the operation name.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Log the outcome and duration.
    pub fn finish(self, success: bool) {
        let elapsed_ms = self.start.elapsed().as_millis();
        if success {
            tracing::debug!(operation = self.operation, elapsed_ms, "operation completed");
        } else {
            tracing::debug!(operation = self.operation, elapsed_ms, "operation failed");
        }
    }
}
