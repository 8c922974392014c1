//! Pool-backed SMTP client.

use notify_pool::{Pool, PoolStats, PoolStatus};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::codec::Reply;
use crate::config::SmtpConfig;
use crate::connector::SmtpConnector;
use crate::error::Result;
use crate::instrumentation::{self, OperationTimer};
use crate::message::Email;

/// SMTP client backed by a connection pool.
///
/// Every send acquires a session, runs one mail transaction and returns the
/// session to the pool, whether the transaction succeeded or not. Cloning is
/// cheap; clones share the pool.
///
/// # Example
///
/// ```rust,ignore
/// use notify_smtp::{Email, SmtpClient, SmtpConfig};
///
/// let config = SmtpConfig::from_connection_string(
///     "Server=smtp.example.com:587;User Id=app;Password=secret;Pool Size=10;Min Idle=2;"
/// )?;
/// let client = SmtpClient::connect(config).await?;
///
/// let email = Email::builder()
///     .from("notify <noreply@example.com>")
///     .to("user@example.com")
///     .subject("Hello")
///     .text("Hi there")
///     .build()?;
///
/// client.send(&email).await?;
/// client.close().await?;
/// ```
#[derive(Clone, Debug)]
pub struct SmtpClient {
    pool: Pool<SmtpConnector>,
}

impl SmtpClient {
    /// Create the pool and start warming it up to `min_idle_conns`.
    pub async fn connect(config: SmtpConfig) -> Result<Self> {
        let pool_config = config.pool.clone();
        let connector = SmtpConnector::new(config)?;

        tracing::info!(
            address = %connector.config().address(),
            tls = ?connector.config().tls.mode,
            "creating SMTP client"
        );

        let pool = Pool::new(connector, pool_config).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool<SmtpConnector>) -> Self {
        Self { pool }
    }

    /// Deliver one message.
    ///
    /// Session-level failures (a rejected recipient, a dropped connection)
    /// are returned unchanged.
    pub async fn send(&self, email: &Email) -> Result<Reply> {
        self.send_inner(email, None).await
    }

    /// Like [`send`](Self::send), but stops waiting for a pooled session
    /// when `cancel` fires.
    pub async fn send_with_cancel(&self, email: &Email, cancel: &CancellationToken) -> Result<Reply> {
        self.send_inner(email, Some(cancel)).await
    }

    async fn send_inner(&self, email: &Email, cancel: Option<&CancellationToken>) -> Result<Reply> {
        let envelope = email.envelope();
        let message = email.render();
        let span = instrumentation::send_span(
            &self.pool.lifecycle().config().host,
            envelope.recipients.len(),
            message.len(),
        );

        async move {
            let timer = OperationTimer::start("send");

            let mut session = match cancel {
                Some(token) => self.pool.get_with_cancel(token).await?,
                None => self.pool.get().await?,
            };

            let result = session.send(&envelope, &message).await;
            session.release().await;

            timer.finish(result.is_ok());
            result
        }
        .instrument(span)
        .await
    }

    /// Check out a session and return it without sending anything.
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await?;
        Ok(())
    }

    /// Pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Pool occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<SmtpConnector> {
        &self.pool
    }

    /// Close the pool and every idle session.
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await?;
        Ok(())
    }
}
