//! Scriptable pool lifecycle.
//!
//! [`MockLifecycle`] builds in-memory [`MockConnection`]s and counts every
//! lifecycle call. Clones share the same counters and failure switches, so a
//! test keeps one clone and hands the other to the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use notify_pool::ConnectionLifecycle;
use parking_lot::Mutex;
use thiserror::Error;

/// Error produced by a scripted failure.
#[derive(Debug, Error)]
#[error("mock {0} failed")]
pub struct MockError(pub &'static str);

/// In-memory connection handed out by [`MockLifecycle`].
#[derive(Debug)]
pub struct MockConnection {
    /// Lifecycle-assigned ID, starting at 1. Independent of the pool's own IDs.
    pub id: u64,
    /// Set by tests to make the pool close the connection on release.
    pub broken: bool,
}

#[derive(Default)]
struct Counters {
    next_id: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    probes: AtomicUsize,
    resets: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    fail_connect: AtomicBool,
    fail_probe: AtomicBool,
    fail_reset: AtomicBool,
    connect_delay: Mutex<Duration>,
    closed_ids: Mutex<Vec<u64>>,
}

/// Connection lifecycle with switchable failures and call counters.
///
/// # Example
///
/// ```rust,ignore
/// let lifecycle = MockLifecycle::new();
/// let pool = Pool::new(lifecycle.clone(), PoolConfig::new().pool_size(2)).await?;
///
/// pool.ping().await?;
/// assert_eq!(lifecycle.opened(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockLifecycle {
    counters: Arc<Counters>,
}

impl MockLifecycle {
    /// Create a lifecycle whose operations all succeed immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `connect` by `delay`.
    #[must_use]
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.counters.connect_delay.lock() = delay;
        self
    }

    /// Make subsequent `connect` calls fail.
    pub fn fail_connect(&self, fail: bool) {
        self.counters.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent liveness probes fail.
    pub fn fail_probe(&self, fail: bool) {
        self.counters.fail_probe.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent resets fail.
    pub fn fail_reset(&self, fail: bool) {
        self.counters.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// Connections built so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Connections closed so far.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// IDs of closed connections, in close order.
    #[must_use]
    pub fn closed_ids(&self) -> Vec<u64> {
        self.counters.closed_ids.lock().clone()
    }

    /// Liveness probes run so far.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.counters.probes.load(Ordering::SeqCst)
    }

    /// Resets run so far.
    #[must_use]
    pub fn resets(&self) -> usize {
        self.counters.resets.load(Ordering::SeqCst)
    }

    /// Connections built and not yet closed.
    #[must_use]
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// High-water mark of [`live`](Self::live).
    #[must_use]
    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLifecycle")
            .field("opened", &self.opened())
            .field("closed", &self.closed())
            .field("probes", &self.probes())
            .field("resets", &self.resets())
            .finish()
    }
}

#[async_trait]
impl ConnectionLifecycle for MockLifecycle {
    type Connection = MockConnection;
    type Error = MockError;

    async fn connect(&self) -> Result<MockConnection, MockError> {
        let delay = *self.counters.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let c = &self.counters;
        if c.fail_connect.load(Ordering::SeqCst) {
            return Err(MockError("connect"));
        }

        let id = c.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        c.opened.fetch_add(1, Ordering::SeqCst);
        let live = c.live.fetch_add(1, Ordering::SeqCst) + 1;
        c.max_live.fetch_max(live, Ordering::SeqCst);

        tracing::trace!(id, "mock connection opened");
        Ok(MockConnection { id, broken: false })
    }

    async fn health_check(&self, _conn: &mut MockConnection) -> Result<(), MockError> {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_probe.load(Ordering::SeqCst) {
            return Err(MockError("probe"));
        }
        Ok(())
    }

    async fn reset(&self, _conn: &mut MockConnection) -> Result<(), MockError> {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_reset.load(Ordering::SeqCst) {
            return Err(MockError("reset"));
        }
        Ok(())
    }

    async fn close(&self, conn: MockConnection) {
        let c = &self.counters;
        c.closed.fetch_add(1, Ordering::SeqCst);
        c.live.fetch_sub(1, Ordering::SeqCst);
        c.closed_ids.lock().push(conn.id);
        tracing::trace!(id = conn.id, "mock connection closed");
    }

    fn is_broken(&self, conn: &MockConnection) -> bool {
        conn.broken
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_shared_between_clones() {
        let lifecycle = MockLifecycle::new();
        let other = lifecycle.clone();

        let mut conn = other.connect().await.unwrap();
        assert_eq!(conn.id, 1);
        other.health_check(&mut conn).await.unwrap();
        other.reset(&mut conn).await.unwrap();
        other.close(conn).await;

        assert_eq!(lifecycle.opened(), 1);
        assert_eq!(lifecycle.probes(), 1);
        assert_eq!(lifecycle.resets(), 1);
        assert_eq!(lifecycle.closed(), 1);
        assert_eq!(lifecycle.live(), 0);
        assert_eq!(lifecycle.max_live(), 1);
        assert_eq!(lifecycle.closed_ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let lifecycle = MockLifecycle::new();
        lifecycle.fail_connect(true);
        assert!(lifecycle.connect().await.is_err());
        assert_eq!(lifecycle.opened(), 0);

        lifecycle.fail_connect(false);
        let mut conn = lifecycle.connect().await.unwrap();

        lifecycle.fail_probe(true);
        assert!(lifecycle.health_check(&mut conn).await.is_err());
        lifecycle.fail_reset(true);
        assert!(lifecycle.reset(&mut conn).await.is_err());

        conn.broken = true;
        assert!(lifecycle.is_broken(&conn));
    }
}
