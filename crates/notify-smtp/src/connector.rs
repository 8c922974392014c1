//! Pool lifecycle for SMTP sessions.

use async_trait::async_trait;
use notify_pool::ConnectionLifecycle;
use tokio_rustls::TlsConnector;
use tracing::Instrument;

use crate::config::SmtpConfig;
use crate::error::{Result, SmtpError};
use crate::instrumentation;
use crate::session::SmtpSession;
use crate::state::Ready;
use crate::tls::TlsMode;

/// Builds, probes, resets and closes [`SmtpSession`]s for the pool.
///
/// `connect` runs the whole handshake: greeting, EHLO, STARTTLS according to
/// the [`TlsMode`], then AUTH when credentials are configured and the server
/// advertises it.
pub struct SmtpConnector {
    config: SmtpConfig,
    tls: Option<TlsConnector>,
}

impl SmtpConnector {
    /// Create a connector. Builds the TLS client configuration up front.
    pub fn new(config: SmtpConfig) -> Result<Self> {
        config.validate()?;
        let tls = config.tls.connector()?;
        Ok(Self { config, tls })
    }

    /// The configuration this connector dials with.
    #[must_use]
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// Run the full handshake and return a ready session.
    pub async fn establish(&self) -> Result<SmtpSession<Ready>> {
        let config = &self.config;
        let span = instrumentation::connect_span(&config.host, config.port);

        async move {
            let session = SmtpSession::connect(
                &config.host,
                config.port,
                config.connect_timeout,
                config.command_timeout,
            )
            .await?;
            let mut session = session.hello(&config.hello_name).await?;

            match (&self.tls, session.extensions().starttls) {
                (Some(connector), true) => {
                    let name = config.tls.verify_name(&config.host)?;
                    session = session
                        .starttls(connector, name)
                        .await?
                        .hello(&config.hello_name)
                        .await?;
                }
                (Some(_), false) if config.tls.mode == TlsMode::Required => {
                    return Err(SmtpError::StartTlsUnavailable);
                }
                (Some(_), false) => {
                    tracing::debug!("server does not offer STARTTLS; continuing in plaintext");
                }
                (None, _) => {}
            }

            let session = match &config.credentials {
                Some(credentials) if session.extensions().auth => {
                    session.authenticate(credentials).await?
                }
                Some(_) => {
                    tracing::warn!("credentials configured but server does not advertise AUTH");
                    session.into_ready()
                }
                None => session.into_ready(),
            };

            tracing::info!(
                encrypted = session.is_encrypted(),
                authenticated = session.is_authenticated(),
                "smtp session established"
            );
            Ok(session)
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for SmtpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConnector")
            .field("address", &self.config.address())
            .field("tls", &self.config.tls.mode)
            .finish()
    }
}

#[async_trait]
impl ConnectionLifecycle for SmtpConnector {
    type Connection = SmtpSession<Ready>;
    type Error = SmtpError;

    async fn connect(&self) -> Result<Self::Connection> {
        self.establish().await
    }

    async fn health_check(&self, conn: &mut Self::Connection) -> Result<()> {
        conn.noop().await
    }

    async fn reset(&self, conn: &mut Self::Connection) -> Result<()> {
        conn.rset().await
    }

    async fn close(&self, conn: Self::Connection) {
        conn.quit().await;
    }

    fn is_broken(&self, conn: &Self::Connection) -> bool {
        conn.is_broken()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use notify_pool::PoolConfig;

    #[test]
    fn test_new_validates_config() {
        assert!(SmtpConnector::new(SmtpConfig::new()).is_ok());
        assert!(SmtpConnector::new(SmtpConfig::new().host("")).is_err());
        assert!(
            SmtpConnector::new(SmtpConfig::new().pool(PoolConfig::new().pool_size(0))).is_err()
        );
    }

    #[test]
    fn test_tls_disabled_builds_no_connector() {
        let connector = SmtpConnector::new(SmtpConfig::new().tls_mode(TlsMode::None)).unwrap();
        assert!(connector.tls.is_none());
    }
}
