//! SMTP authentication (RFC 4954).

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Username and password for SMTP AUTH.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Supported SASL mechanisms, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// `PLAIN`: credentials in a single initial response.
    Plain,
    /// `LOGIN`: username and password answered to two challenges.
    Login,
}

impl Mechanism {
    /// Mechanisms this client can use, most preferred first.
    pub const PREFERENCE: [Mechanism; 2] = [Mechanism::Plain, Mechanism::Login];

    /// The mechanism name as sent on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }

    /// Parse a mechanism name (case-insensitive). Unsupported names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("PLAIN") {
            Some(Self::Plain)
        } else if name.eq_ignore_ascii_case("LOGIN") {
            Some(Self::Login)
        } else {
            None
        }
    }

    /// Choose the most preferred mechanism the server offers.
    #[must_use]
    pub fn select(offered: &[Mechanism]) -> Option<Self> {
        Self::PREFERENCE
            .into_iter()
            .find(|candidate| offered.contains(candidate))
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `PLAIN` initial response: base64 of `\0username\0password`.
pub(crate) fn plain_response(credentials: &Credentials) -> String {
    let mut raw = Vec::with_capacity(credentials.username.len() + credentials.password.len() + 2);
    raw.push(0);
    raw.extend_from_slice(credentials.username.as_bytes());
    raw.push(0);
    raw.extend_from_slice(credentials.password.as_bytes());
    STANDARD.encode(raw)
}

/// Base64 answer to a `LOGIN` challenge.
pub(crate) fn login_response(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_response() {
        let creds = Credentials::new("user@example.com", "secret");
        assert_eq!(plain_response(&creds), "AHVzZXJAZXhhbXBsZS5jb20Ac2VjcmV0");
    }

    #[test]
    fn test_login_response() {
        assert_eq!(login_response("user"), "dXNlcg==");
    }

    #[test]
    fn test_mechanism_selection_prefers_plain() {
        assert_eq!(
            Mechanism::select(&[Mechanism::Login, Mechanism::Plain]),
            Some(Mechanism::Plain)
        );
        assert_eq!(Mechanism::select(&[Mechanism::Login]), Some(Mechanism::Login));
        assert_eq!(Mechanism::select(&[]), None);
    }

    #[test]
    fn test_mechanism_names() {
        assert_eq!(Mechanism::from_name("plain"), Some(Mechanism::Plain));
        assert_eq!(Mechanism::from_name("LOGIN"), Some(Mechanism::Login));
        assert_eq!(Mechanism::from_name("CRAM-MD5"), None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("user", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }
}
