//! SMTP commands.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::auth::Mechanism;

/// A client-to-server SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `EHLO <domain>`
    Ehlo(String),
    /// `HELO <domain>`, the fallback when EHLO is rejected.
    Helo(String),
    /// `STARTTLS`
    StartTls,
    /// `AUTH <mechanism> [initial-response]`
    Auth {
        /// SASL mechanism.
        mechanism: Mechanism,
        /// Base64 initial response.
        initial: Option<String>,
    },
    /// A base64 line answering a 334 challenge.
    AuthResponse(String),
    /// `MAIL FROM:<addr> [SIZE=n]`
    Mail {
        /// Reverse path.
        from: String,
        /// Declared message size, sent when the server supports SIZE.
        size: Option<usize>,
    },
    /// `RCPT TO:<addr>`
    Rcpt(String),
    /// `DATA`
    Data,
    /// Dot-stuffed message content including the terminating `.` line.
    Payload(Bytes),
    /// `RSET`
    Rset,
    /// `NOOP`
    Noop,
    /// `QUIT`
    Quit,
}

impl Command {
    /// The command verb, for logs and errors.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } | Self::AuthResponse(_) => "AUTH",
            Self::Mail { .. } => "MAIL",
            Self::Rcpt(_) => "RCPT",
            Self::Data => "DATA",
            Self::Payload(_) => "DATA",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }

    /// Write the command onto the wire buffer.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Self::Payload(data) => {
                dst.reserve(data.len());
                dst.put_slice(data);
                return;
            }
            Self::Ehlo(domain) => {
                dst.put_slice(b"EHLO ");
                dst.put_slice(domain.as_bytes());
            }
            Self::Helo(domain) => {
                dst.put_slice(b"HELO ");
                dst.put_slice(domain.as_bytes());
            }
            Self::StartTls => dst.put_slice(b"STARTTLS"),
            Self::Auth { mechanism, initial } => {
                dst.put_slice(b"AUTH ");
                dst.put_slice(mechanism.as_str().as_bytes());
                if let Some(initial) = initial {
                    dst.put_u8(b' ');
                    dst.put_slice(initial.as_bytes());
                }
            }
            Self::AuthResponse(line) => dst.put_slice(line.as_bytes()),
            Self::Mail { from, size } => {
                dst.put_slice(b"MAIL FROM:<");
                dst.put_slice(from.as_bytes());
                dst.put_u8(b'>');
                if let Some(size) = size {
                    dst.put_slice(format!(" SIZE={size}").as_bytes());
                }
            }
            Self::Rcpt(to) => {
                dst.put_slice(b"RCPT TO:<");
                dst.put_slice(to.as_bytes());
                dst.put_u8(b'>');
            }
            Self::Data => dst.put_slice(b"DATA"),
            Self::Rset => dst.put_slice(b"RSET"),
            Self::Noop => dst.put_slice(b"NOOP"),
            Self::Quit => dst.put_slice(b"QUIT"),
        }
        dst.put_slice(b"\r\n");
    }
}

/// Log-safe rendering. Credentials and message content are never shown.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo(domain) => write!(f, "EHLO {domain}"),
            Self::Helo(domain) => write!(f, "HELO {domain}"),
            Self::Auth {
                mechanism,
                initial: Some(_),
            } => write!(f, "AUTH {} ***", mechanism.as_str()),
            Self::Auth {
                mechanism,
                initial: None,
            } => write!(f, "AUTH {}", mechanism.as_str()),
            Self::AuthResponse(_) => f.write_str("***"),
            Self::Mail { from, size: None } => write!(f, "MAIL FROM:<{from}>"),
            Self::Mail {
                from,
                size: Some(size),
            } => write!(f, "MAIL FROM:<{from}> SIZE={size}"),
            Self::Rcpt(to) => write!(f, "RCPT TO:<{to}>"),
            Self::Payload(data) => write!(f, "<{} bytes of message data>", data.len()),
            other => f.write_str(other.verb()),
        }
    }
}

/// Prepare message content for the DATA phase.
///
/// Normalizes bare `\n` and `\r` line endings to CRLF, doubles a leading `.`
/// on every line, and appends the `.` terminator line.
#[must_use]
pub fn dot_stuff(message: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(message.len() + message.len() / 64 + 5);
    let mut at_line_start = true;
    let mut iter = message.iter().copied().peekable();

    while let Some(byte) = iter.next() {
        match byte {
            b'\r' => {
                if iter.peek() == Some(&b'\n') {
                    iter.next();
                }
                out.put_slice(b"\r\n");
                at_line_start = true;
            }
            b'\n' => {
                out.put_slice(b"\r\n");
                at_line_start = true;
            }
            _ => {
                if at_line_start && byte == b'.' {
                    out.put_u8(b'.');
                }
                out.put_u8(byte);
                at_line_start = false;
            }
        }
    }

    if !at_line_start {
        out.put_slice(b"\r\n");
    }
    out.put_slice(b".\r\n");
    out.freeze()
}
