//! # notify-worker
//!
//! Channel workers for notification delivery.
//!
//! A broker consumer hands each payload to a [`Consumer`], which decodes it
//! into a [`Task`], picks the [`Handler`] registered for the task's channel
//! and queues it on the bounded [`Executor`]. The email handler sends through
//! the pooled `notify-smtp` client; SMS and push are log-only senders.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use notify_smtp::{SmtpClient, SmtpConfig};
//! use notify_worker::{Consumer, Executor, WorkerConfig, standard_handlers};
//!
//! let config = WorkerConfig::new().email_from("notify <noreply@example.com>");
//! let client = SmtpClient::connect(SmtpConfig::from_connection_string(
//!     "Server=smtp.example.com:587;User Id=app;Password=secret;Min Idle=2;",
//! )?)
//! .await?;
//!
//! let executor = Arc::new(Executor::new(&config)?);
//! let consumer = Consumer::new(standard_handlers(client, &config), executor.clone());
//!
//! consumer.handle_message(payload).await?;
//! executor.shutdown().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod consumer;
pub mod error;
pub mod executor;
pub mod handler;
pub mod sender;
pub mod task;

pub use config::WorkerConfig;
pub use consumer::Consumer;
pub use error::{Result, WorkerError};
pub use executor::{Executor, ExecutorStats};
pub use handler::{Handler, HandlerRegistry};
pub use sender::{EmailHandler, PushHandler, SmsHandler};
pub use task::{MsgContent, Receiver, Task};

use notify_smtp::SmtpClient;

/// Registry with the email, SMS and push handlers.
#[must_use]
pub fn standard_handlers(client: SmtpClient, config: &WorkerConfig) -> HandlerRegistry {
    HandlerRegistry::new()
        .with(EmailHandler::new(client, config))
        .with(SmsHandler::new(config))
        .with(PushHandler::new(config))
}
