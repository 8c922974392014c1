//! # notify-smtp
//!
//! Pooled async SMTP client for notification delivery.
//!
//! Sessions are built by [`SmtpConnector`] (greeting, EHLO, optional
//! STARTTLS, optional AUTH) and pooled by `notify-pool`. Idle sessions are
//! probed with `NOOP` before reuse and cleared with `RSET` before they are
//! idled again.
//!
//! ## Features
//!
//! - **Type-state sessions**: mail transactions only on a fully handshaken session
//! - **STARTTLS** via rustls, with `none`, `opportunistic` and `required` policies
//! - **AUTH PLAIN / LOGIN**
//! - **Message builder** with multipart/alternative bodies; Bcc stays off the headers
//! - **Connection strings** for configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use notify_smtp::{Email, SmtpClient, SmtpConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SmtpConfig::from_connection_string(
//!         "Server=smtp.example.com:587;User Id=app;Password=secret;Tls=required;"
//!     )?;
//!
//!     let client = SmtpClient::connect(config).await?;
//!
//!     let email = Email::builder()
//!         .from("notify <noreply@example.com>")
//!         .to("user@example.com")
//!         .subject("Your code")
//!         .text("123456")
//!         .build()?;
//!
//!     client.send(&email).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod connector;
pub mod error;
pub mod extensions;
pub mod framed;
pub mod instrumentation;
pub mod message;
pub mod session;
pub mod state;
pub mod stream;
pub mod tls;

// Re-export commonly used types
pub use auth::{Credentials, Mechanism};
pub use client::SmtpClient;
pub use codec::{Reply, ReplyCode, SmtpCodec};
pub use command::Command;
pub use config::SmtpConfig;
pub use connector::SmtpConnector;
pub use error::{CodecError, SmtpError};
pub use extensions::Extensions;
pub use message::{Email, EmailBuilder, Envelope, Mailbox};
pub use session::SmtpSession;
pub use state::{Connected, Greeted, Ready, SessionState};
pub use tls::{TlsConfig, TlsMode};
