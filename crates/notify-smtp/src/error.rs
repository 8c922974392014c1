//! SMTP error types.

use std::time::Duration;

use notify_pool::PoolError;
use thiserror::Error;

/// Errors that can occur while framing SMTP replies and commands.
#[derive(Debug, Error)]
pub enum CodecError {
    /// IO error during read/write operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A reply line exceeded the configured limit.
    #[error("reply line too long: {length} bytes (max {max})")]
    LineTooLong {
        /// Bytes buffered without a line terminator.
        length: usize,
        /// Maximum allowed line length.
        max: usize,
    },

    /// A multi-line reply ran past the line count limit.
    #[error("reply has too many lines (max {max})")]
    TooManyLines {
        /// Maximum allowed lines per reply.
        max: usize,
    },

    /// A reply line did not start with a three-digit code.
    #[error("malformed reply line: {0:?}")]
    MalformedLine(String),

    /// Lines of a multi-line reply carried different codes.
    #[error("inconsistent multi-line reply: expected code {expected}, got {actual}")]
    CodeMismatch {
        /// Code of the first line.
        expected: u16,
        /// Code of the offending line.
        actual: u16,
    },

    /// Reply text was not valid UTF-8.
    #[error("reply is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors surfaced by SMTP sessions and the pooled client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SmtpError {
    /// Network-level failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply framing failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection pool failure.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// An operation did not finish in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// What was being waited on.
        operation: &'static str,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The server answered a command with an unexpected code.
    #[error("{command} rejected: {code} {message}")]
    UnexpectedReply {
        /// Command verb.
        command: &'static str,
        /// Reply code.
        code: u16,
        /// Reply text.
        message: String,
    },

    /// TLS is required but the server does not offer STARTTLS.
    #[error("server does not support STARTTLS")]
    StartTlsUnavailable,

    /// No authentication mechanism is shared with the server.
    #[error("no supported AUTH mechanism (server offers: {offered})")]
    AuthUnsupported {
        /// Mechanisms advertised by the server.
        offered: String,
    },

    /// The message exceeds the size limit the server advertised.
    #[error("message of {size} bytes exceeds server limit of {limit} bytes")]
    MessageTooLarge {
        /// Rendered message size.
        size: usize,
        /// Advertised SIZE limit.
        limit: usize,
    },

    /// A mailbox could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The message is incomplete.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SmtpError {
    /// Check if this error is transient and the operation may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::ConnectionClosed | Self::Timeout { .. } => true,
            Self::UnexpectedReply { code, .. } => (400..500).contains(code),
            Self::Pool(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Check if this error leaves the session unusable.
    #[must_use]
    pub fn is_fatal_to_session(&self) -> bool {
        match self {
            Self::Io(_) | Self::Codec(_) | Self::ConnectionClosed | Self::Timeout { .. } => true,
            Self::UnexpectedReply { code, .. } => *code == 421,
            _ => false,
        }
    }

    /// Reply code, if the error came from a server reply.
    #[must_use]
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedReply { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for SMTP operations.
pub type Result<T> = std::result::Result<T, SmtpError>;
