//! Session state types for the type-state pattern.
//!
//! The handshake order (greeting, EHLO, optional STARTTLS, optional AUTH) is
//! enforced at compile time: mail transactions are only available on a
//! [`Ready`] session.

/// Marker trait for session states.
pub trait SessionState: private::Sealed {}

/// Greeting received; EHLO not yet sent (or must be re-sent after STARTTLS).
#[derive(Debug)]
pub struct Connected;

/// EHLO accepted; extensions known.
#[derive(Debug)]
pub struct Greeted;

/// Handshake complete; mail transactions allowed.
#[derive(Debug)]
pub struct Ready;

impl SessionState for Connected {}
impl SessionState for Greeted {}
impl SessionState for Ready {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Connected {}
    impl Sealed for super::Greeted {}
    impl Sealed for super::Ready {}
}
