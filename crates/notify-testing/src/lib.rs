//! # notify-testing
//!
//! Test infrastructure for the notify crates.
//!
//! - [`MockLifecycle`]: an in-memory `ConnectionLifecycle` with call counters
//!   and switchable failures, for exercising `notify-pool` without sockets.
//! - [`FakeSmtpServer`]: a scripted SMTP server on a loopback port, for
//!   driving `notify-smtp` end to end.
//!
//! The integration suites for the pool, the SMTP client and the worker live
//! in this crate's `tests/` directory.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock;
pub mod smtp_server;

pub use mock::{MockConnection, MockError, MockLifecycle};
pub use smtp_server::{FakeSmtpServer, ReceivedMessage, ServerOptions};

