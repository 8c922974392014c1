//! Connection lifecycle management.
//!
//! The pool is protocol-agnostic: it drives connections through a
//! [`ConnectionLifecycle`] implementation that knows how to build, probe,
//! reset and close them. Per-connection bookkeeping lives in
//! [`ConnectionMetadata`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Protocol operations the pool needs from a connection type.
///
/// `connect` covers the whole build step (dial, optional transport upgrade,
/// optional authentication). `health_check` should be a cheap round trip.
/// `reset` clears per-session protocol state before the connection is idled.
#[async_trait]
pub trait ConnectionLifecycle: Send + Sync + 'static {
    /// The live connection handed to callers.
    type Connection: Send + 'static;

    /// Error produced by the protocol layer.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Build a new, fully authenticated connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Liveness probe run before an idle connection is handed out.
    async fn health_check(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Reset protocol state before the connection returns to the idle set.
    async fn reset(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Close the connection. Errors are not interesting at this point.
    async fn close(&self, conn: Self::Connection);

    /// Whether the protocol layer has flagged the connection as unusable.
    ///
    /// Broken connections are closed on release instead of being idled.
    fn is_broken(&self, _conn: &Self::Connection) -> bool {
        false
    }
}

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Being built (dial, upgrade, authenticate).
    Building,
    /// Sitting in the idle set.
    Idle,
    /// Owned by a caller.
    CheckedOut,
    /// Closed. Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::{Building, CheckedOut, Closed, Idle};

        matches!(
            (self, next),
            (Building, Idle)
                | (Building, CheckedOut)
                | (Building, Closed)
                | (Idle, CheckedOut)
                | (Idle, Closed)
                | (CheckedOut, Idle)
                | (CheckedOut, Closed)
        )
    }

    /// Whether the state is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

/// Bookkeeping attached to every pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Pool-unique connection ID.
    pub id: u64,
    /// When the connection was built.
    pub created_at: Instant,
    /// Last checkout or idle return.
    pub last_used_at: Instant,
    /// Failed probes, resets and broken releases seen on this connection.
    pub failure_count: u32,
    /// False when built while the pool was already at capacity; such
    /// connections are never idled.
    pub poolable: bool,
}

impl ConnectionMetadata {
    pub(crate) fn new(id: u64, now: Instant) -> Self {
        Self {
            id,
            created_at: now,
            last_used_at: now,
            failure_count: 0,
            poolable: true,
        }
    }

    /// Time since the connection was built.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Time since the connection was last used.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_used_at = now;
    }
}

/// Outcome of validating an idle connection before checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheckResult {
    /// Usable.
    Healthy,
    /// Older than the configured maximum lifetime.
    Expired {
        /// Connection age at the time of the check.
        age: Duration,
    },
    /// Idle longer than the configured maximum idle time.
    IdleTimeout {
        /// Idle duration at the time of the check.
        idle: Duration,
    },
    /// The liveness probe failed.
    ProbeFailed,
}

impl HealthCheckResult {
    /// Whether the connection may be handed out.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthCheckResult::Healthy)
    }
}

impl fmt::Display for HealthCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Expired { age } => write!(f, "exceeded max lifetime (age {age:?})"),
            Self::IdleTimeout { idle } => write!(f, "exceeded max idle time (idle {idle:?})"),
            Self::ProbeFailed => f.write_str("liveness probe failed"),
        }
    }
}

/// A raw connection plus its pool bookkeeping.
pub(crate) struct Conn<C> {
    pub(crate) raw: C,
    pub(crate) meta: ConnectionMetadata,
    pub(crate) state: ConnectionState,
}

impl<C> Conn<C> {
    pub(crate) fn new(id: u64, raw: C, now: Instant) -> Self {
        Self {
            raw,
            meta: ConnectionMetadata::new(id, now),
            state: ConnectionState::Building,
        }
    }

    pub(crate) fn transition(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal connection transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use ConnectionState::*;

        assert!(Building.can_transition_to(Idle));
        assert!(Building.can_transition_to(CheckedOut));
        assert!(Idle.can_transition_to(CheckedOut));
        assert!(CheckedOut.can_transition_to(Idle));
        assert!(CheckedOut.can_transition_to(Closed));
        assert!(Idle.can_transition_to(Closed));

        assert!(!Closed.can_transition_to(Idle));
        assert!(!Closed.can_transition_to(CheckedOut));
        assert!(!Idle.can_transition_to(Building));
        assert!(Closed.is_terminal());
        assert!(!Idle.is_terminal());
    }

    #[test]
    fn test_metadata_age_and_idle() {
        let start = Instant::now();
        let mut meta = ConnectionMetadata::new(7, start);
        assert_eq!(meta.id, 7);
        assert!(meta.poolable);

        let later = start + Duration::from_secs(5);
        assert_eq!(meta.age(later), Duration::from_secs(5));
        assert_eq!(meta.idle_for(later), Duration::from_secs(5));

        meta.touch(later);
        assert_eq!(meta.idle_for(later), Duration::ZERO);
        assert_eq!(meta.age(later), Duration::from_secs(5));
    }

    #[test]
    fn test_health_result_display() {
        assert_eq!(HealthCheckResult::Healthy.to_string(), "healthy");
        assert!(HealthCheckResult::Healthy.is_healthy());
        assert!(!HealthCheckResult::ProbeFailed.is_healthy());
        assert!(
            HealthCheckResult::Expired {
                age: Duration::from_secs(61)
            }
            .to_string()
            .contains("max lifetime")
        );
    }
}
