//! ESMTP service extensions advertised in the EHLO reply.

use crate::auth::Mechanism;
use crate::codec::Reply;

/// Capabilities the server advertised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    /// Domain from the first EHLO line.
    pub server_name: String,
    /// `STARTTLS`
    pub starttls: bool,
    /// `AUTH` was advertised at all.
    pub auth: bool,
    /// Supported mechanisms among those advertised.
    pub auth_mechanisms: Vec<Mechanism>,
    /// Raw mechanism names, for diagnostics.
    pub auth_offered: Vec<String>,
    /// `SIZE` limit in bytes; `Some(0)` means no fixed limit.
    pub size: Option<usize>,
    /// `8BITMIME`
    pub eight_bit_mime: bool,
    /// `PIPELINING`
    pub pipelining: bool,
    /// `SMTPUTF8`
    pub smtputf8: bool,
}

impl Extensions {
    /// Parse the lines of a 250 EHLO reply.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        let mut ext = Self::default();
        let mut lines = reply.lines().iter();

        if let Some(first) = lines.next() {
            ext.server_name = first.split_whitespace().next().unwrap_or_default().to_owned();
        }

        for line in lines {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };

            // Some servers still send the pre-RFC `AUTH=PLAIN LOGIN` form.
            let (keyword, first_param) = match keyword.split_once('=') {
                Some((k, p)) => (k, Some(p)),
                None => (keyword, None),
            };

            match keyword.to_ascii_uppercase().as_str() {
                "STARTTLS" => ext.starttls = true,
                "AUTH" => {
                    ext.auth = true;
                    for name in first_param.into_iter().chain(words) {
                        if !ext.auth_offered.iter().any(|o| o.eq_ignore_ascii_case(name)) {
                            ext.auth_offered.push(name.to_ascii_uppercase());
                        }
                        if let Some(mech) = Mechanism::from_name(name) {
                            if !ext.auth_mechanisms.contains(&mech) {
                                ext.auth_mechanisms.push(mech);
                            }
                        }
                    }
                }
                "SIZE" => {
                    ext.size = Some(words.next().and_then(|n| n.parse().ok()).unwrap_or(0));
                }
                "8BITMIME" => ext.eight_bit_mime = true,
                "PIPELINING" => ext.pipelining = true,
                "SMTPUTF8" => ext.smtputf8 = true,
                _ => {}
            }
        }

        ext
    }

    /// Extensions known after a HELO fallback: none.
    #[must_use]
    pub fn from_helo(reply: &Reply) -> Self {
        Self {
            server_name: reply
                .lines()
                .first()
                .and_then(|l| l.split_whitespace().next())
                .unwrap_or_default()
                .to_owned(),
            ..Self::default()
        }
    }

    /// The mechanism this client would use.
    #[must_use]
    pub fn preferred_mechanism(&self) -> Option<Mechanism> {
        Mechanism::select(&self.auth_mechanisms)
    }

    /// The size limit to enforce, if the server declared one.
    #[must_use]
    pub fn size_limit(&self) -> Option<usize> {
        self.size.filter(|limit| *limit > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ReplyCode;

    fn ehlo(lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::OK,
            lines.iter().map(|l| (*l).to_owned()).collect(),
        )
    }

    #[test]
    fn test_parse_full_ehlo() {
        let ext = Extensions::from_ehlo(&ehlo(&[
            "mail.example.com Hello client",
            "PIPELINING",
            "SIZE 35882577",
            "STARTTLS",
            "AUTH LOGIN PLAIN XOAUTH2",
            "8BITMIME",
            "SMTPUTF8",
        ]));

        assert_eq!(ext.server_name, "mail.example.com");
        assert!(ext.starttls);
        assert!(ext.auth);
        assert!(ext.pipelining);
        assert!(ext.eight_bit_mime);
        assert!(ext.smtputf8);
        assert_eq!(ext.size_limit(), Some(35_882_577));
        assert_eq!(ext.auth_mechanisms, [Mechanism::Login, Mechanism::Plain]);
        assert_eq!(ext.auth_offered, ["LOGIN", "PLAIN", "XOAUTH2"]);
        assert_eq!(ext.preferred_mechanism(), Some(Mechanism::Plain));
    }

    #[test]
    fn test_legacy_auth_equals_form() {
        let ext = Extensions::from_ehlo(&ehlo(&["mx", "AUTH=LOGIN", "AUTH LOGIN"]));
        assert!(ext.auth);
        assert_eq!(ext.auth_mechanisms, [Mechanism::Login]);
        assert_eq!(ext.auth_offered, ["LOGIN"]);
    }

    #[test]
    fn test_size_without_limit() {
        let ext = Extensions::from_ehlo(&ehlo(&["mx", "SIZE"]));
        assert_eq!(ext.size, Some(0));
        assert_eq!(ext.size_limit(), None);
    }

    #[test]
    fn test_unsupported_auth_only() {
        let ext = Extensions::from_ehlo(&ehlo(&["mx", "AUTH CRAM-MD5"]));
        assert!(ext.auth);
        assert!(ext.auth_mechanisms.is_empty());
        assert_eq!(ext.preferred_mechanism(), None);
    }

    #[test]
    fn test_helo_has_no_extensions() {
        let ext = Extensions::from_helo(&ehlo(&["legacy.example.com"]));
        assert_eq!(ext.server_name, "legacy.example.com");
        assert!(!ext.starttls);
        assert!(!ext.auth);
    }
}
