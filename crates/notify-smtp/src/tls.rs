//! TLS configuration for STARTTLS.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::SmtpError;

/// When to upgrade the session with STARTTLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Never upgrade.
    None,
    /// Upgrade when the server advertises STARTTLS, otherwise stay plaintext.
    #[default]
    Opportunistic,
    /// Upgrade, and fail the connection if the server cannot.
    Required,
}

impl FromStr for TlsMode {
    type Err = SmtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" | "false" | "no" | "0" => Ok(Self::None),
            "opportunistic" | "auto" | "optional" => Ok(Self::Opportunistic),
            "required" | "true" | "yes" | "1" | "strict" => Ok(Self::Required),
            other => Err(SmtpError::Config(format!("invalid TLS mode: {other}"))),
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Upgrade policy.
    pub mode: TlsMode,

    /// Extra PEM file of trusted root certificates, added to the bundled
    /// web PKI roots.
    pub ca_file: Option<PathBuf>,

    /// Name to verify the server certificate against. Defaults to the host.
    pub server_name: Option<String>,
}

impl TlsConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upgrade policy.
    #[must_use]
    pub fn mode(mut self, mode: TlsMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a PEM file of trusted roots.
    #[must_use]
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Override the name used for certificate verification.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Build a connector, or `None` when TLS is disabled.
    pub fn connector(&self) -> Result<Option<TlsConnector>, SmtpError> {
        if self.mode == TlsMode::None {
            return Ok(None);
        }

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        if let Some(path) = &self.ca_file {
            let file = File::open(path).map_err(|e| {
                SmtpError::Tls(format!("cannot open CA file {}: {e}", path.display()))
            })?;
            let mut reader = BufReader::new(file);
            let mut added = 0usize;
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| SmtpError::Tls(format!("invalid PEM: {e}")))?;
                roots
                    .add(cert)
                    .map_err(|e| SmtpError::Tls(format!("invalid CA certificate: {e}")))?;
                added += 1;
            }
            tracing::debug!(path = %path.display(), added, "loaded extra root certificates");
        }

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| SmtpError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Some(TlsConnector::from(Arc::new(config))))
    }

    /// The name to verify the server certificate against.
    pub fn verify_name(&self, host: &str) -> Result<ServerName<'static>, SmtpError> {
        let name = self.server_name.as_deref().unwrap_or(host).to_owned();
        ServerName::try_from(name)
            .map_err(|e| SmtpError::Tls(format!("invalid server name {host:?}: {e}")))
    }
}
