//! SMTP session with type-state handshake management.

use std::marker::PhantomData;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::auth::{self, Credentials, Mechanism};
use crate::codec::{Reply, ReplyCode};
use crate::command::{self, Command};
use crate::error::{Result, SmtpError};
use crate::extensions::Extensions;
use crate::framed::ReplyStream;
use crate::message::Envelope;
use crate::state::{Connected, Greeted, Ready, SessionState};
use crate::stream::MaybeTlsStream;

/// One SMTP connection.
///
/// The generic parameter `S` tracks how far the handshake has progressed,
/// so mail transactions can only be started on a `SmtpSession<Ready>`.
///
/// Any I/O failure, framing error, timeout or `421` reply marks the session
/// broken; a pooled broken session is closed instead of reused.
pub struct SmtpSession<S: SessionState> {
    stream: ReplyStream<MaybeTlsStream>,
    host: String,
    extensions: Extensions,
    command_timeout: Duration,
    broken: bool,
    authenticated: bool,
    _state: PhantomData<S>,
}

impl<S: SessionState> SmtpSession<S> {
    fn transition<T: SessionState>(self) -> SmtpSession<T> {
        SmtpSession {
            stream: self.stream,
            host: self.host,
            extensions: self.extensions,
            command_timeout: self.command_timeout,
            broken: self.broken,
            authenticated: self.authenticated,
            _state: PhantomData,
        }
    }

    /// Extensions from the most recent EHLO.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Whether the session has failed and must not be reused.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Whether the transport is TLS-encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.stream.get_ref().is_tls()
    }

    /// Whether AUTH succeeded on this session.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The server host this session is connected to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Send a command and read its reply, bounded by the command timeout.
    ///
    /// Only transport-level failures are errors here; reply codes are
    /// checked by the caller.
    async fn exchange(&mut self, cmd: Command) -> Result<Reply> {
        if self.broken {
            return Err(SmtpError::ConnectionClosed);
        }

        tracing::debug!(command = %cmd, "smtp command");

        let timeout = self.command_timeout;
        let stream = &mut self.stream;
        let outcome = tokio::time::timeout(timeout, async move {
            stream.send(cmd).await?;
            let reply = stream.next().await.ok_or(SmtpError::ConnectionClosed)??;
            Ok::<_, SmtpError>(reply)
        })
        .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_elapsed) => Err(SmtpError::Timeout {
                operation: "smtp command",
                timeout,
            }),
        };

        match &result {
            Ok(reply) => {
                tracing::debug!(code = reply.code().as_u16(), "smtp reply");
                if reply.code() == ReplyCode::SERVICE_UNAVAILABLE {
                    tracing::warn!(host = %self.host, reply = %reply, "server is closing the connection");
                    self.broken = true;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "smtp exchange failed");
                self.broken = true;
            }
        }

        result
    }

    /// Send a command and require one of `accept` as the reply code.
    async fn command(&mut self, cmd: Command, accept: &[ReplyCode]) -> Result<Reply> {
        let verb = cmd.verb();
        let reply = self.exchange(cmd).await?;
        if accept.contains(&reply.code()) {
            Ok(reply)
        } else {
            Err(SmtpError::UnexpectedReply {
                command: verb,
                code: reply.code().as_u16(),
                message: reply.message(),
            })
        }
    }

    /// Say goodbye and drop the connection. Errors are ignored.
    pub async fn quit(mut self) {
        if !self.broken {
            if let Err(e) = self.command(Command::Quit, &[ReplyCode::SERVICE_CLOSING]).await {
                tracing::trace!(error = %e, "QUIT failed");
            }
        }
        tracing::debug!(host = %self.host, "smtp session closed");
    }
}

impl SmtpSession<Connected> {
    /// Open a TCP connection and read the server greeting.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self> {
        tracing::debug!(host = %host, port, "connecting to SMTP server");

        let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| SmtpError::Timeout {
                operation: "connect",
                timeout: connect_timeout,
            })??;
        tcp.set_nodelay(true)?;

        let mut stream = ReplyStream::new(MaybeTlsStream::Plain(tcp));

        let greeting = tokio::time::timeout(command_timeout, stream.next())
            .await
            .map_err(|_| SmtpError::Timeout {
                operation: "greeting",
                timeout: command_timeout,
            })?
            .ok_or(SmtpError::ConnectionClosed)??;

        if greeting.code() != ReplyCode::SERVICE_READY {
            return Err(SmtpError::UnexpectedReply {
                command: "CONNECT",
                code: greeting.code().as_u16(),
                message: greeting.message(),
            });
        }

        Ok(Self {
            stream,
            host: host.to_owned(),
            extensions: Extensions::default(),
            command_timeout,
            broken: false,
            authenticated: false,
            _state: PhantomData,
        })
    }

    /// Identify with EHLO, falling back to HELO if EHLO is rejected.
    pub async fn hello(mut self, name: &str) -> Result<SmtpSession<Greeted>> {
        let reply = self.exchange(Command::Ehlo(name.to_owned())).await?;

        if reply.code() == ReplyCode::OK {
            self.extensions = Extensions::from_ehlo(&reply);
        } else if reply.code().as_u16() >= 500 && reply.code().as_u16() < 503 {
            tracing::debug!(reply = %reply, "EHLO rejected, falling back to HELO");
            let reply = self
                .command(Command::Helo(name.to_owned()), &[ReplyCode::OK])
                .await?;
            self.extensions = Extensions::from_helo(&reply);
        } else {
            return Err(SmtpError::UnexpectedReply {
                command: "EHLO",
                code: reply.code().as_u16(),
                message: reply.message(),
            });
        }

        Ok(self.transition())
    }
}

impl SmtpSession<Greeted> {
    /// Upgrade the transport with STARTTLS.
    ///
    /// The returned session must say EHLO again; extensions learned before
    /// the upgrade are discarded.
    pub async fn starttls(
        mut self,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<SmtpSession<Connected>> {
        if !self.extensions.starttls {
            return Err(SmtpError::StartTlsUnavailable);
        }

        self.command(Command::StartTls, &[ReplyCode::SERVICE_READY])
            .await?;

        if !self.stream.read_buffer().is_empty() {
            // Data the server sent before the handshake must not be trusted.
            return Err(SmtpError::Tls(
                "unexpected data after STARTTLS reply".into(),
            ));
        }

        let tcp = match self.stream.into_inner() {
            MaybeTlsStream::Plain(tcp) => tcp,
            MaybeTlsStream::Tls(_) => {
                return Err(SmtpError::Tls("session is already encrypted".into()));
            }
        };

        let tls = tokio::time::timeout(self.command_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| SmtpError::Timeout {
                operation: "TLS handshake",
                timeout: self.command_timeout,
            })?
            .map_err(|e| SmtpError::Tls(e.to_string()))?;

        tracing::debug!(host = %self.host, "STARTTLS handshake complete");

        Ok(SmtpSession {
            stream: ReplyStream::new(MaybeTlsStream::Tls(Box::new(tls))),
            host: self.host,
            extensions: Extensions::default(),
            command_timeout: self.command_timeout,
            broken: false,
            authenticated: false,
            _state: PhantomData,
        })
    }

    /// Authenticate with the most preferred mechanism both sides support.
    pub async fn authenticate(mut self, credentials: &Credentials) -> Result<SmtpSession<Ready>> {
        let mechanism = self.extensions.preferred_mechanism().ok_or_else(|| {
            SmtpError::AuthUnsupported {
                offered: self.extensions.auth_offered.join(" "),
            }
        })?;

        tracing::debug!(
            mechanism = %mechanism,
            username = credentials.username(),
            "authenticating"
        );

        match mechanism {
            Mechanism::Plain => {
                self.command(
                    Command::Auth {
                        mechanism,
                        initial: Some(auth::plain_response(credentials)),
                    },
                    &[ReplyCode::AUTH_SUCCESSFUL],
                )
                .await?;
            }
            Mechanism::Login => {
                self.command(
                    Command::Auth {
                        mechanism,
                        initial: None,
                    },
                    &[ReplyCode::AUTH_CHALLENGE],
                )
                .await?;
                self.command(
                    Command::AuthResponse(auth::login_response(credentials.username())),
                    &[ReplyCode::AUTH_CHALLENGE],
                )
                .await?;
                self.command(
                    Command::AuthResponse(auth::login_response(credentials.password())),
                    &[ReplyCode::AUTH_SUCCESSFUL],
                )
                .await?;
            }
        }

        self.authenticated = true;
        Ok(self.transition())
    }

    /// Finish the handshake without authenticating.
    #[must_use]
    pub fn into_ready(self) -> SmtpSession<Ready> {
        self.transition()
    }
}

impl SmtpSession<Ready> {
    /// Liveness probe.
    pub async fn noop(&mut self) -> Result<()> {
        self.command(Command::Noop, &[ReplyCode::OK]).await?;
        Ok(())
    }

    /// Abort any open mail transaction.
    pub async fn rset(&mut self) -> Result<()> {
        self.command(Command::Rset, &[ReplyCode::OK]).await?;
        Ok(())
    }

    /// Run one mail transaction: MAIL FROM, RCPT TO for every recipient,
    /// DATA with the dot-stuffed message.
    ///
    /// Returns the server's final reply, which usually carries a queue ID.
    pub async fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<Reply> {
        if envelope.recipients.is_empty() {
            return Err(SmtpError::InvalidMessage("no recipients".into()));
        }

        let size = match self.extensions.size {
            Some(limit) => {
                if limit > 0 && message.len() > limit {
                    return Err(SmtpError::MessageTooLarge {
                        size: message.len(),
                        limit,
                    });
                }
                Some(message.len())
            }
            None => None,
        };

        self.command(
            Command::Mail {
                from: envelope.from.clone(),
                size,
            },
            &[ReplyCode::OK],
        )
        .await?;

        for recipient in &envelope.recipients {
            self.command(
                Command::Rcpt(recipient.clone()),
                &[ReplyCode::OK, ReplyCode::FORWARDING],
            )
            .await?;
        }

        self.command(Command::Data, &[ReplyCode::START_MAIL_INPUT])
            .await?;

        let reply = self
            .command(
                Command::Payload(command::dot_stuff(message)),
                &[ReplyCode::OK],
            )
            .await?;

        tracing::debug!(
            recipients = envelope.recipients.len(),
            bytes = message.len(),
            reply = %reply,
            "message accepted"
        );

        Ok(reply)
    }
}

impl<S: SessionState> std::fmt::Debug for SmtpSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSession")
            .field("host", &self.host)
            .field("encrypted", &self.is_encrypted())
            .field("authenticated", &self.authenticated)
            .field("broken", &self.broken)
            .finish()
    }
}
