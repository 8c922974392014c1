//! Email messages and envelopes.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SmtpError;

/// A mailbox: an address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    name: Option<String>,
    address: String,
}

impl Mailbox {
    /// Create a mailbox after validating the address.
    pub fn new(name: Option<String>, address: impl Into<String>) -> Result<Self, SmtpError> {
        let address = address.into();
        validate_address(&address)?;
        if let Some(name) = &name {
            if name.contains(['\r', '\n']) {
                return Err(SmtpError::InvalidAddress(format!(
                    "display name for {address} contains a line break"
                )));
            }
        }
        Ok(Self {
            name: name.filter(|n| !n.is_empty()),
            address,
        })
    }

    /// The bare address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl FromStr for Mailbox {
    type Err = SmtpError;

    /// Accepts `addr@example.com`, `<addr@example.com>` and
    /// `Display Name <addr@example.com>` (the name may be quoted).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match (s.rfind('<'), s.ends_with('>')) {
            (Some(open), true) => {
                let name = s[..open].trim().trim_matches('"').trim();
                let address = s[open + 1..s.len() - 1].trim();
                Self::new(Some(name.to_owned()), address)
            }
            (None, false) => Self::new(None, s),
            _ => Err(SmtpError::InvalidAddress(s.to_owned())),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", encode_display_name(name), self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// Validate an address before it is placed in an SMTP command.
#[allow(clippy::expect_used)]
fn validate_address(address: &str) -> Result<(), SmtpError> {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]{1,64}@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
        )
        .expect("address pattern is valid")
    });

    if address.is_empty() {
        return Err(SmtpError::InvalidAddress("address cannot be empty".into()));
    }

    if address.len() > 254 || !ADDRESS_RE.is_match(address) {
        return Err(SmtpError::InvalidAddress(address.to_owned()));
    }

    Ok(())
}

fn encode_display_name(name: &str) -> String {
    if !name.is_ascii() {
        return encode_word(name);
    }
    if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || " !#$%&'*+-/=?^_`{|}~".contains(c))
    {
        name.to_owned()
    } else {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_word(text: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(text.as_bytes()))
}

fn encode_header_text(text: &str) -> String {
    if text.is_ascii() {
        text.to_owned()
    } else {
        encode_word(text)
    }
}

/// The SMTP envelope: reverse path and forward paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `MAIL FROM` address.
    pub from: String,
    /// `RCPT TO` addresses: To, Cc and Bcc, deduplicated.
    pub recipients: Vec<String>,
}

/// A complete email message.
///
/// Bcc recipients are part of the envelope but never of the rendered headers.
#[derive(Debug, Clone)]
pub struct Email {
    from: Mailbox,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    reply_to: Option<Mailbox>,
    subject: String,
    text: Option<String>,
    html: Option<String>,
    headers: Vec<(String, String)>,
}

impl Email {
    /// Start building a message.
    #[must_use]
    pub fn builder() -> EmailBuilder {
        EmailBuilder::default()
    }

    /// The sender.
    #[must_use]
    pub fn from(&self) -> &Mailbox {
        &self.from
    }

    /// `To` recipients.
    #[must_use]
    pub fn to(&self) -> &[Mailbox] {
        &self.to
    }

    /// `Cc` recipients.
    #[must_use]
    pub fn cc(&self) -> &[Mailbox] {
        &self.cc
    }

    /// `Bcc` recipients.
    #[must_use]
    pub fn bcc(&self) -> &[Mailbox] {
        &self.bcc
    }

    /// The subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The envelope for this message.
    #[must_use]
    pub fn envelope(&self) -> Envelope {
        let mut recipients: Vec<String> = Vec::new();
        for mailbox in self.to.iter().chain(&self.cc).chain(&self.bcc) {
            if !recipients
                .iter()
                .any(|r| r.eq_ignore_ascii_case(mailbox.address()))
            {
                recipients.push(mailbox.address().to_owned());
            }
        }

        Envelope {
            from: self.from.address().to_owned(),
            recipients,
        }
    }

    /// Render the message with the current date and a fresh Message-ID.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        let domain = self
            .from
            .address()
            .rsplit_once('@')
            .map_or("localhost", |(_, d)| d);
        let message_id = format!("<{}@{}>", Uuid::new_v4().simple(), domain);
        self.render_with(Utc::now(), &message_id)
    }

    /// Render the message with an explicit date and Message-ID.
    #[must_use]
    pub fn render_with(&self, date: DateTime<Utc>, message_id: &str) -> Vec<u8> {
        let mut out = String::with_capacity(512);

        push_header(&mut out, "From", &self.from.to_string());
        push_address_header(&mut out, "To", &self.to);
        push_address_header(&mut out, "Cc", &self.cc);
        if let Some(reply_to) = &self.reply_to {
            push_header(&mut out, "Reply-To", &reply_to.to_string());
        }
        push_header(&mut out, "Subject", &encode_header_text(&self.subject));
        push_header(&mut out, "Date", &date.to_rfc2822());
        push_header(&mut out, "Message-ID", message_id);
        for (name, value) in &self.headers {
            push_header(&mut out, name, &encode_header_text(value));
        }
        push_header(&mut out, "MIME-Version", "1.0");

        match (&self.text, &self.html) {
            (Some(text), Some(html)) => {
                let boundary = format!("=_{}", Uuid::new_v4().simple());
                push_header(
                    &mut out,
                    "Content-Type",
                    &format!("multipart/alternative; boundary=\"{boundary}\""),
                );
                out.push_str("\r\n");
                out.push_str(&format!("--{boundary}\r\n"));
                push_part(&mut out, "text/plain", text);
                out.push_str(&format!("--{boundary}\r\n"));
                push_part(&mut out, "text/html", html);
                out.push_str(&format!("--{boundary}--\r\n"));
            }
            (Some(text), None) => push_part(&mut out, "text/plain", text),
            (None, Some(html)) => push_part(&mut out, "text/html", html),
            (None, None) => push_part(&mut out, "text/plain", ""),
        }

        out.into_bytes()
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

fn push_address_header(out: &mut String, name: &str, mailboxes: &[Mailbox]) {
    if mailboxes.is_empty() {
        return;
    }
    let value = mailboxes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    push_header(out, name, &value);
}

/// Content headers, a blank line, then the body. ASCII bodies go out as
/// 7bit; anything else is base64 in 76-column lines.
fn push_part(out: &mut String, content_type: &str, body: &str) {
    push_header(
        out,
        "Content-Type",
        &format!("{content_type}; charset=utf-8"),
    );

    if body.is_ascii() {
        push_header(out, "Content-Transfer-Encoding", "7bit");
        out.push_str("\r\n");
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push_str("\r\n");
        }
    } else {
        push_header(out, "Content-Transfer-Encoding", "base64");
        out.push_str("\r\n");
        let encoded = STANDARD.encode(body.as_bytes());
        for chunk in encoded.as_bytes().chunks(76) {
            // base64 output is ASCII.
            out.push_str(&String::from_utf8_lossy(chunk));
            out.push_str("\r\n");
        }
    }
}

/// Builder for [`Email`]. Addresses are parsed by [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct EmailBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    reply_to: Option<String>,
    subject: String,
    text: Option<String>,
    html: Option<String>,
    headers: Vec<(String, String)>,
}

impl EmailBuilder {
    /// Set the sender.
    #[must_use]
    pub fn from(mut self, mailbox: impl Into<String>) -> Self {
        self.from = Some(mailbox.into());
        self
    }

    /// Add a `To` recipient.
    #[must_use]
    pub fn to(mut self, mailbox: impl Into<String>) -> Self {
        self.to.push(mailbox.into());
        self
    }

    /// Add a `Cc` recipient.
    #[must_use]
    pub fn cc(mut self, mailbox: impl Into<String>) -> Self {
        self.cc.push(mailbox.into());
        self
    }

    /// Add a `Bcc` recipient.
    #[must_use]
    pub fn bcc(mut self, mailbox: impl Into<String>) -> Self {
        self.bcc.push(mailbox.into());
        self
    }

    /// Set the `Reply-To` mailbox.
    #[must_use]
    pub fn reply_to(mut self, mailbox: impl Into<String>) -> Self {
        self.reply_to = Some(mailbox.into());
        self
    }

    /// Set the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain-text body.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    /// Set the HTML body.
    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Add a custom header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Parse every address and assemble the message.
    pub fn build(self) -> Result<Email, SmtpError> {
        let from = self
            .from
            .ok_or_else(|| SmtpError::InvalidMessage("missing sender".into()))?
            .parse::<Mailbox>()?;

        let parse_all = |list: Vec<String>| -> Result<Vec<Mailbox>, SmtpError> {
            list.iter().map(|s| s.parse::<Mailbox>()).collect()
        };
        let to = parse_all(self.to)?;
        let cc = parse_all(self.cc)?;
        let bcc = parse_all(self.bcc)?;

        if to.is_empty() && cc.is_empty() && bcc.is_empty() {
            return Err(SmtpError::InvalidMessage("no recipients".into()));
        }

        let reply_to = self.reply_to.map(|s| s.parse::<Mailbox>()).transpose()?;

        for (name, value) in &self.headers {
            let valid_name = !name.is_empty()
                && name
                    .bytes()
                    .all(|b| b.is_ascii_graphic() && b != b':');
            if !valid_name || value.contains(['\r', '\n']) {
                return Err(SmtpError::InvalidMessage(format!("invalid header {name:?}")));
            }
        }

        if self.subject.contains(['\r', '\n']) {
            return Err(SmtpError::InvalidMessage(
                "subject cannot contain line breaks".into(),
            ));
        }

        Ok(Email {
            from,
            to,
            cc,
            bcc,
            reply_to,
            subject: self.subject,
            text: self.text,
            html: self.html,
            headers: self.headers,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> Email {
        Email::builder()
            .from("notify <noreply@example.com>")
            .to("alice@example.com")
            .cc("\"Bob B.\" <bob@example.com>")
            .bcc("audit@example.com")
            .subject("Awesome Subject")
            .text("Text Body is, of course, supported!")
            .html("<h1>Fancy HTML is supported, too!</h1>")
            .build()
            .unwrap()
    }

    fn rendered(email: &Email) -> String {
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        String::from_utf8(email.render_with(date, "<id@example.com>")).unwrap()
    }

    #[test]
    fn test_mailbox_parsing() {
        let bare: Mailbox = "user@example.com".parse().unwrap();
        assert_eq!(bare.address(), "user@example.com");
        assert_eq!(bare.name(), None);

        let named: Mailbox = "Jane Doe <jane@example.com>".parse().unwrap();
        assert_eq!(named.address(), "jane@example.com");
        assert_eq!(named.name(), Some("Jane Doe"));

        let quoted: Mailbox = "\"Doe, Jane\" <jane@example.com>".parse().unwrap();
        assert_eq!(quoted.name(), Some("Doe, Jane"));

        let angle: Mailbox = "<jane@example.com>".parse().unwrap();
        assert_eq!(angle.name(), None);
    }

    #[test]
    fn test_invalid_addresses() {
        assert!("".parse::<Mailbox>().is_err());
        assert!("no-at-sign".parse::<Mailbox>().is_err());
        assert!("a@b@c".parse::<Mailbox>().is_err());
        assert!("Jane <jane@example.com".parse::<Mailbox>().is_err());
        assert!("evil@example.com>\r\nRCPT TO:<x@y.z".parse::<Mailbox>().is_err());
    }

    #[test]
    fn test_display_name_line_breaks_rejected() {
        assert!(matches!(
            "A\r\nBcc: x@y.z <a@b.c>".parse::<Mailbox>(),
            Err(SmtpError::InvalidAddress(_))
        ));
        assert!("A\nB <a@b.c>".parse::<Mailbox>().is_err());
        assert!(Mailbox::new(Some("A\rB".into()), "a@b.c").is_err());

        let result = Email::builder()
            .from("Evil\r\nBcc: victim@example.com <a@example.com>")
            .to("b@example.com")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_mailbox_display() {
        let m: Mailbox = "\"Doe, Jane\" <jane@example.com>".parse().unwrap();
        assert_eq!(m.to_string(), "\"Doe, Jane\" <jane@example.com>");

        let plain: Mailbox = "Jane <jane@example.com>".parse().unwrap();
        assert_eq!(plain.to_string(), "Jane <jane@example.com>");

        let utf8: Mailbox = "Zoë <zoe@example.com>".parse().unwrap();
        assert!(utf8.to_string().starts_with("=?UTF-8?B?"));
    }

    #[test]
    fn test_envelope_includes_bcc_and_dedupes() {
        let email = Email::builder()
            .from("a@example.com")
            .to("b@example.com")
            .cc("B@example.com")
            .bcc("c@example.com")
            .build()
            .unwrap();

        let envelope = email.envelope();
        assert_eq!(envelope.from, "a@example.com");
        assert_eq!(envelope.recipients, ["b@example.com", "c@example.com"]);
    }

    #[test]
    fn test_render_headers() {
        let text = rendered(&sample());

        assert!(text.starts_with("From: notify <noreply@example.com>\r\n"));
        assert!(text.contains("To: alice@example.com\r\n"));
        assert!(text.contains("Cc: \"Bob B.\" <bob@example.com>\r\n"));
        assert!(text.contains("Subject: Awesome Subject\r\n"));
        assert!(text.contains("Date: Wed, 1 May 2024 12:00:00 +0000\r\n"));
        assert!(text.contains("Message-ID: <id@example.com>\r\n"));
        assert!(text.contains("MIME-Version: 1.0\r\n"));
        assert!(!text.contains("Bcc"));
        assert!(!text.contains("audit@example.com"));
    }

    #[test]
    fn test_render_multipart_alternative() {
        let text = rendered(&sample());
        assert!(text.contains("Content-Type: multipart/alternative; boundary=\"=_"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(text.trim_end().ends_with("--"));
    }

    #[test]
    fn test_render_single_part_and_utf8() {
        let email = Email::builder()
            .from("a@example.com")
            .to("b@example.com")
            .subject("Grüße")
            .text("héllo")
            .build()
            .unwrap();

        let text = rendered(&email);
        assert!(text.contains("Subject: =?UTF-8?B?R3LDvMOfZQ==?=\r\n"));
        assert!(text.contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(text.contains("aMOpbGxv\r\n"));
        assert!(!text.contains("multipart"));
    }

    #[test]
    fn test_build_validation() {
        assert!(matches!(
            Email::builder().to("b@example.com").build(),
            Err(SmtpError::InvalidMessage(_))
        ));
        assert!(matches!(
            Email::builder().from("a@example.com").build(),
            Err(SmtpError::InvalidMessage(_))
        ));
        assert!(
            Email::builder()
                .from("a@example.com")
                .to("b@example.com")
                .header("X-Bad", "line\r\nBcc: x@y.z")
                .build()
                .is_err()
        );
        assert!(
            Email::builder()
                .from("a@example.com")
                .to("b@example.com")
                .subject("two\nlines")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_render_generates_message_id() {
        let bytes = sample().render();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("@example.com>\r\n"));
        assert!(text.contains("Message-ID: <"));
    }
}
