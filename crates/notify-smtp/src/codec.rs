//! SMTP reply codec.
//!
//! Replies are one or more lines of the form `CCC-text` (continuation) or
//! `CCC text` (final), terminated by CRLF. A bare LF is tolerated.

use std::fmt;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::command::Command;
use crate::error::CodecError;

/// Default maximum reply line length, terminator included.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Maximum lines in one reply. EHLO replies are the longest in practice and
/// stay well under this.
pub const MAX_REPLY_LINES: usize = 128;

/// A three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyCode(u16);

/// Reply category, from the first digit of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// 2xx
    PositiveCompletion,
    /// 3xx
    PositiveIntermediate,
    /// 4xx
    TransientNegative,
    /// 5xx
    PermanentNegative,
}

impl ReplyCode {
    /// Service ready.
    pub const SERVICE_READY: Self = Self(220);
    /// Service closing transmission channel.
    pub const SERVICE_CLOSING: Self = Self(221);
    /// Authentication succeeded.
    pub const AUTH_SUCCESSFUL: Self = Self(235);
    /// Requested action completed.
    pub const OK: Self = Self(250);
    /// User not local; will forward.
    pub const FORWARDING: Self = Self(251);
    /// Server challenge during AUTH.
    pub const AUTH_CHALLENGE: Self = Self(334);
    /// Start mail input.
    pub const START_MAIL_INPUT: Self = Self(354);
    /// Service not available, closing channel.
    pub const SERVICE_UNAVAILABLE: Self = Self(421);

    /// Create a reply code, rejecting values outside 200..=599.
    pub fn new(code: u16) -> Option<Self> {
        (200..600).contains(&code).then_some(Self(code))
    }

    /// The numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// The reply category.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self.0 / 100 {
            2 => Severity::PositiveCompletion,
            3 => Severity::PositiveIntermediate,
            4 => Severity::TransientNegative,
            _ => Severity::PermanentNegative,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: ReplyCode,
    lines: Vec<String>,
}

impl Reply {
    /// Create a reply from its parts.
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply code.
    #[must_use]
    pub fn code(&self) -> ReplyCode {
        self.code
    }

    /// Text of each line, code and separator stripped.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// All lines joined with spaces.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// Whether the code is 2xx or 3xx.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        matches!(
            self.code.severity(),
            Severity::PositiveCompletion | Severity::PositiveIntermediate
        )
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message())
    }
}

/// Parse one complete reply from the front of `buf`.
///
/// Returns the reply and the number of bytes it occupied, or `None` if more
/// data is needed.
pub fn parse_reply(buf: &[u8], max_line: usize) -> Result<Option<(Reply, usize)>, CodecError> {
    let mut offset = 0;
    let mut code: Option<u16> = None;
    let mut lines = Vec::new();

    loop {
        let rest = &buf[offset..];
        let Some(newline) = rest.iter().position(|b| *b == b'\n') else {
            if rest.len() > max_line {
                return Err(CodecError::LineTooLong {
                    length: rest.len(),
                    max: max_line,
                });
            }
            return Ok(None);
        };

        if newline + 1 > max_line {
            return Err(CodecError::LineTooLong {
                length: newline + 1,
                max: max_line,
            });
        }

        let mut line = &rest[..newline];
        if let [head @ .., b'\r'] = line {
            line = head;
        }
        offset += newline + 1;

        if lines.len() == MAX_REPLY_LINES {
            return Err(CodecError::TooManyLines {
                max: MAX_REPLY_LINES,
            });
        }

        let (line_code, last, text) = split_line(line)?;
        match code {
            None => code = Some(line_code),
            Some(expected) if expected != line_code => {
                return Err(CodecError::CodeMismatch {
                    expected,
                    actual: line_code,
                });
            }
            Some(_) => {}
        }
        lines.push(text);

        if last {
            let code = ReplyCode::new(line_code).ok_or_else(|| {
                CodecError::MalformedLine(String::from_utf8_lossy(line).into_owned())
            })?;
            return Ok(Some((Reply::new(code, lines), offset)));
        }
    }
}

fn split_line(line: &[u8]) -> Result<(u16, bool, String), CodecError> {
    let malformed = || CodecError::MalformedLine(String::from_utf8_lossy(line).into_owned());

    if line.len() < 3 || !line[..3].iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    let code = line[..3]
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));

    let last = match line.get(3) {
        None | Some(b' ') => true,
        Some(b'-') => false,
        Some(_) => return Err(malformed()),
    };

    let text = line.get(4..).unwrap_or_default();
    let text = std::str::from_utf8(text).map_err(|_| CodecError::InvalidUtf8)?;
    Ok((code, last, text.to_owned()))
}

/// Codec for the SMTP client side: decodes [`Reply`]s, encodes [`Command`]s.
#[derive(Debug, Clone)]
pub struct SmtpCodec {
    max_line_length: usize,
}

impl SmtpCodec {
    /// Create a codec with the default line limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Set the maximum reply line length.
    #[must_use]
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }
}

impl Default for SmtpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SmtpCodec {
    type Item = Reply;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match parse_reply(src, self.max_line_length)? {
            Some((reply, consumed)) => {
                src.advance(consumed);
                tracing::trace!(code = reply.code().as_u16(), "decoded reply");
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Command> for SmtpCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_reply() {
        let mut codec = SmtpCodec::new();
        let mut buf = BytesMut::from(&b"220 mail.example.com ESMTP ready\r\n"[..]);

        let reply = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.code(), ReplyCode::SERVICE_READY);
        assert_eq!(reply.lines(), ["mail.example.com ESMTP ready"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multi_line_reply() {
        let mut codec = SmtpCodec::new();
        let mut buf = BytesMut::from(
            &b"250-mail.example.com\r\n250-STARTTLS\r\n250-AUTH PLAIN LOGIN\r\n250 SIZE 1000\r\n"[..],
        );

        let reply = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.code(), ReplyCode::OK);
        assert_eq!(reply.lines().len(), 4);
        assert_eq!(reply.lines()[2], "AUTH PLAIN LOGIN");
    }

    #[test]
    fn test_partial_reply_waits_for_more() {
        let mut codec = SmtpCodec::new();
        let mut buf = BytesMut::from(&b"250-first\r\n250 sec"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 18);

        buf.extend_from_slice(b"ond\r\n");
        let reply = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.message(), "first second");
    }

    #[test]
    fn test_pipelined_replies_decode_one_at_a_time() {
        let mut codec = SmtpCodec::new();
        let mut buf = BytesMut::from(&b"250 ok\r\n354 go ahead\r\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().code().as_u16(), 250);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().code().as_u16(), 354);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_endless_continuation_rejected() {
        let mut data = b"250-x\r\n".repeat(MAX_REPLY_LINES - 1);
        data.extend_from_slice(b"250 last\r\n");
        let (reply, consumed) = parse_reply(&data, DEFAULT_MAX_LINE_LENGTH)
            .unwrap()
            .unwrap();
        assert_eq!(reply.lines().len(), MAX_REPLY_LINES);
        assert_eq!(consumed, data.len());

        let mut codec = SmtpCodec::new();
        let mut buf = BytesMut::from(&b"250-x\r\n".repeat(MAX_REPLY_LINES + 1)[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::TooManyLines { max: MAX_REPLY_LINES })
        ));
    }

    #[test]
    fn test_bare_code_and_bare_lf() {
        let mut codec = SmtpCodec::new();
        let mut buf = BytesMut::from(&b"250\n"[..]);
        let reply = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.code(), ReplyCode::OK);
        assert_eq!(reply.lines(), [""]);
    }

    #[test]
    fn test_malformed_lines_rejected() {
        let mut codec = SmtpCodec::new();
        assert!(matches!(
            codec.decode(&mut BytesMut::from(&b"hello\r\n"[..])),
            Err(CodecError::MalformedLine(_))
        ));
        assert!(matches!(
            codec.decode(&mut BytesMut::from(&b"250*x\r\n"[..])),
            Err(CodecError::MalformedLine(_))
        ));
        assert!(matches!(
            codec.decode(&mut BytesMut::from(&b"199 too low\r\n"[..])),
            Err(CodecError::MalformedLine(_))
        ));
    }

    #[test]
    fn test_code_mismatch_rejected() {
        let mut codec = SmtpCodec::new();
        let mut buf = BytesMut::from(&b"250-a\r\n251 b\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::CodeMismatch {
                expected: 250,
                actual: 251
            })
        ));
    }

    #[test]
    fn test_line_too_long() {
        let mut codec = SmtpCodec::new().with_max_line_length(16);
        let mut buf = BytesMut::from(&b"250 this line never ends"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::LineTooLong { max: 16, .. })
        ));
    }

    #[test]
    fn test_severity() {
        assert_eq!(ReplyCode::OK.severity(), Severity::PositiveCompletion);
        assert_eq!(
            ReplyCode::START_MAIL_INPUT.severity(),
            Severity::PositiveIntermediate
        );
        assert_eq!(
            ReplyCode::SERVICE_UNAVAILABLE.severity(),
            Severity::TransientNegative
        );
        assert_eq!(
            ReplyCode::new(554).unwrap().severity(),
            Severity::PermanentNegative
        );
        assert!(ReplyCode::new(600).is_none());
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = parse_reply(&data, 64);
            }

            #[test]
            fn consumed_matches_rendered_length(
                code in 200u16..600,
                lines in proptest::collection::vec("[ -~]{0,40}", 1..6),
            ) {
                let mut wire = String::new();
                for (i, line) in lines.iter().enumerate() {
                    let sep = if i + 1 == lines.len() { ' ' } else { '-' };
                    wire.push_str(&format!("{code}{sep}{line}\r\n"));
                }

                let (reply, consumed) = parse_reply(wire.as_bytes(), 4096).unwrap().unwrap();
                prop_assert_eq!(consumed, wire.len());
                prop_assert_eq!(reply.code().as_u16(), code);
                prop_assert_eq!(reply.lines(), &lines[..]);
            }
        }
    }
}
