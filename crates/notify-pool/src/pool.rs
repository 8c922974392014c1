//! Connection pool implementation.
//!
//! Two capacity mechanisms cooperate here. The admission semaphore bounds
//! in-flight acquisitions (one permit from checkout until release), while the
//! idle registry bounds tracked connections. Both are reconciled under a
//! single state mutex that is never held across I/O.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::admission::{Admission, Reservation};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::health::HealthPolicy;
use crate::idle::IdleRegistry;
use crate::lifecycle::{Conn, ConnectionLifecycle, ConnectionMetadata, ConnectionState};

/// A bounded, health-gated connection pool.
///
/// Idle connections are reused most-recently-idled first and validated
/// (lifetime, idle time, liveness probe) before every checkout. When
/// `min_idle_conns` is set the pool keeps building connections in the
/// background to hold that many idle.
///
/// Cloning a `Pool` is cheap; clones share the same connections.
///
/// # Example
///
/// ```rust,ignore
/// use notify_pool::{Pool, PoolConfig};
///
/// let config = PoolConfig::new()
///     .pool_size(10)
///     .min_idle_conns(2)
///     .max_idle_conns(5);
///
/// let pool = Pool::new(lifecycle, config).await?;
///
/// let conn = pool.get().await?;
/// // Use connection...
/// conn.release().await;
/// ```
pub struct Pool<L: ConnectionLifecycle> {
    inner: Arc<PoolInner<L>>,
}

struct PoolInner<L: ConnectionLifecycle> {
    config: PoolConfig,
    lifecycle: L,
    health: HealthPolicy,
    admission: Admission,

    /// Set once by `close`.
    closed: AtomicBool,

    next_connection_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    /// Idle registry and counters, guarded together.
    state: Mutex<PoolState<L::Connection>>,
}

struct PoolState<C> {
    registry: IdleRegistry<C>,
    stats: StatsCounters,
}

#[derive(Debug, Default)]
struct StatsCounters {
    hits: u64,
    misses: u64,
    timeouts: u64,
    stale_conns: u64,
}

impl<L: ConnectionLifecycle> Pool<L> {
    /// Create a new pool.
    ///
    /// Background replenishment toward `min_idle_conns` starts immediately.
    /// Must be called from within a Tokio runtime.
    pub async fn new(lifecycle: L, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        if config.idle_floor_exceeds_ceiling() {
            tracing::warn!(
                min_idle_conns = config.min_idle_conns,
                max_idle_conns = config.max_idle_conns,
                "min_idle_conns exceeds max_idle_conns; replenishment is capped at max_idle_conns"
            );
        }

        let inner = Arc::new(PoolInner {
            health: HealthPolicy::from_config(&config),
            admission: Admission::new(config.pool_size, config.pool_timeout),
            state: Mutex::new(PoolState {
                registry: IdleRegistry::new(config.pool_size, config.max_idle_conns),
                stats: StatsCounters::default(),
            }),
            config,
            lifecycle,
            closed: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
            created_at: Instant::now(),
        });

        {
            let mut state = inner.state.lock();
            inner.replenish(&mut state);
        }

        tracing::info!(
            pool_size = inner.config.pool_size,
            min_idle = inner.config.min_idle_conns,
            max_idle = inner.config.max_idle_conns,
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Get a connection from the pool.
    ///
    /// Reuses a healthy idle connection when one exists and builds a new one
    /// otherwise. Waits up to `pool_timeout` when every slot is taken.
    pub async fn get(&self) -> Result<PooledConnection<L>, PoolError> {
        self.acquire(None).await
    }

    /// Like [`get`](Self::get), but gives up with [`PoolError::Cancelled`]
    /// if `cancel` fires while waiting for a slot.
    pub async fn get_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PooledConnection<L>, PoolError> {
        self.acquire(Some(cancel)).await
    }

    /// Acquire and immediately release a connection.
    ///
    /// Exercises the full checkout path without a payload; useful for
    /// warm-up.
    pub async fn ping(&self) -> Result<(), PoolError> {
        let conn = self.get().await?;
        conn.release().await;
        Ok(())
    }

    async fn acquire(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<PooledConnection<L>, PoolError> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(PoolError::Closed);
        }

        tracing::trace!("acquiring connection from pool");

        let reservation = match inner.admission.reserve(cancel).await {
            Ok(reservation) => reservation,
            Err(e) => {
                if matches!(e, PoolError::Timeout { .. }) {
                    inner.state.lock().stats.timeouts += 1;
                }
                return Err(e);
            }
        };

        if inner.is_closed() {
            return Err(PoolError::Closed);
        }

        loop {
            let popped = {
                let mut state = inner.state.lock();
                let conn = state.registry.pop();
                if conn.is_some() {
                    inner.replenish(&mut state);
                }
                conn
            };

            let Some(mut conn) = popped else {
                break;
            };

            let verdict = inner.health.validate(&inner.lifecycle, &mut conn).await;
            if verdict.is_healthy() {
                conn.meta.touch(Instant::now());
                conn.transition(ConnectionState::CheckedOut);
                inner.state.lock().stats.hits += 1;

                tracing::trace!(connection_id = conn.meta.id, "reusing idle connection");
                return Ok(PooledConnection::new(conn, reservation, Arc::clone(inner)));
            }

            tracing::debug!(
                connection_id = conn.meta.id,
                reason = %verdict,
                "evicting stale idle connection"
            );
            inner.discard(conn).await;
        }

        inner.state.lock().stats.misses += 1;

        let raw = match inner.lifecycle.connect().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(error = %e, "failed to build connection");
                drop(reservation);
                return Err(PoolError::Connect(Box::new(e)));
            }
        };

        let mut conn = Conn::new(inner.next_connection_id(), raw, Instant::now());

        let tracked = {
            let mut state = inner.state.lock();
            if inner.is_closed() {
                None
            } else {
                Some(state.registry.track())
            }
        };

        let Some(poolable) = tracked else {
            conn.transition(ConnectionState::Closed);
            inner.lifecycle.close(conn.raw).await;
            return Err(PoolError::Closed);
        };

        conn.meta.poolable = poolable;
        conn.transition(ConnectionState::CheckedOut);

        tracing::debug!(
            connection_id = conn.meta.id,
            poolable,
            "opened new connection"
        );

        Ok(PooledConnection::new(conn, reservation, Arc::clone(inner)))
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            hits: state.stats.hits,
            misses: state.stats.misses,
            timeouts: state.stats.timeouts,
            total_conns: state.registry.total(),
            idle_conns: state.registry.idle(),
            stale_conns: state.stats.stale_conns,
        }
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let (total, idle) = {
            let state = self.inner.state.lock();
            (state.registry.total(), state.registry.idle())
        };

        PoolStatus {
            available: idle,
            in_use: total.saturating_sub(idle),
            total,
            max: self.inner.config.pool_size,
            reserved: self.inner.admission.outstanding(),
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are closed now; checked-out connections are closed
    /// when their holders release them. Callers waiting for a slot fail with
    /// [`PoolError::Closed`]. A second call returns [`PoolError::Closed`].
    pub async fn close(&self) -> Result<(), PoolError> {
        let inner = &self.inner;
        if inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PoolError::Closed);
        }

        inner.admission.close();

        let drained = inner.state.lock().registry.drain();
        let count = drained.len();
        for mut conn in drained {
            conn.transition(ConnectionState::Closed);
            inner.lifecycle.close(conn.raw).await;
        }

        tracing::info!(closed_connections = count, "connection pool closed");
        Ok(())
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the connection lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> &L {
        &self.inner.lifecycle
    }
}

impl<L: ConnectionLifecycle> PoolInner<L> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawn background builds until the idle floor is met or no slot is
    /// free. Called with the state lock held so concurrent triggers observe
    /// each other's reserved slots.
    fn replenish(self: &Arc<Self>, state: &mut PoolState<L::Connection>) {
        if self.is_closed() {
            return;
        }

        let target = self.config.replenish_target();
        while state.registry.needs_replenish(target) {
            let Some(reservation) = self.admission.try_reserve() else {
                break;
            };

            state.registry.reserve_slot();

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.add_idle_conn(reservation).await;
            });
        }
    }

    async fn add_idle_conn(self: Arc<Self>, reservation: Reservation) {
        match self.lifecycle.connect().await {
            Ok(raw) => {
                let mut conn = Conn::new(self.next_connection_id(), raw, Instant::now());
                conn.transition(ConnectionState::Idle);
                let id = conn.meta.id;

                let rejected = {
                    let mut state = self.state.lock();
                    if self.is_closed() {
                        Some(conn)
                    } else {
                        state.registry.fill_slot(conn);
                        None
                    }
                };

                match rejected {
                    Some(mut conn) => {
                        conn.transition(ConnectionState::Closed);
                        self.lifecycle.close(conn.raw).await;
                    }
                    None => tracing::trace!(connection_id = id, "replenished idle connection"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "background connection build failed");
                if !self.is_closed() {
                    self.state.lock().registry.cancel_slot();
                }
            }
        }

        drop(reservation);
    }

    /// Return a checked-out connection. The reservation is dropped last on
    /// every path.
    async fn release(self: &Arc<Self>, mut conn: Conn<L::Connection>, reservation: Reservation) {
        if self.is_closed() {
            conn.transition(ConnectionState::Closed);
            self.lifecycle.close(conn.raw).await;
            drop(reservation);
            return;
        }

        let broken = self.lifecycle.is_broken(&conn.raw);
        if broken {
            conn.meta.failure_count += 1;
        }

        let keep = conn.meta.poolable && !broken && self.state.lock().registry.has_idle_capacity();

        if keep {
            match self.lifecycle.reset(&mut conn.raw).await {
                Ok(()) => {
                    conn.meta.touch(Instant::now());
                    conn.transition(ConnectionState::Idle);
                    let id = conn.meta.id;

                    let rejected = {
                        let mut state = self.state.lock();
                        if self.is_closed() {
                            Err(conn)
                        } else {
                            state.registry.push(conn)
                        }
                    };

                    match rejected {
                        Ok(()) => {
                            tracing::trace!(connection_id = id, "connection returned to idle set");
                            drop(reservation);
                            return;
                        }
                        Err(returned) => conn = returned,
                    }
                }
                Err(e) => {
                    conn.meta.failure_count += 1;
                    tracing::debug!(
                        connection_id = conn.meta.id,
                        error = %e,
                        "reset failed; discarding connection"
                    );
                }
            }
        } else {
            tracing::debug!(
                connection_id = conn.meta.id,
                poolable = conn.meta.poolable,
                broken,
                "closing connection on release"
            );
        }

        self.discard(conn).await;
        drop(reservation);
    }

    /// Close a connection the pool will not keep. Tracked connections count
    /// as stale evictions and trigger replenishment.
    async fn discard(self: &Arc<Self>, mut conn: Conn<L::Connection>) {
        if conn.meta.poolable && !self.is_closed() {
            let mut state = self.state.lock();
            state.registry.untrack();
            state.stats.stale_conns += 1;
            self.replenish(&mut state);
        }

        if conn.state != ConnectionState::Closed {
            conn.transition(ConnectionState::Closed);
        }
        self.lifecycle.close(conn.raw).await;
    }

    /// Bookkeeping for a connection dropped outside a runtime. The raw
    /// connection is dropped without a protocol-level close.
    fn forget(&self, conn: Conn<L::Connection>) {
        if conn.meta.poolable && !self.is_closed() {
            self.state.lock().registry.untrack();
        }
    }
}

impl<L: ConnectionLifecycle> Clone for Pool<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: ConnectionLifecycle> fmt::Debug for Pool<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = PoolBuilder::new()
///     .pool_size(20)
///     .min_idle_conns(2)
///     .build(lifecycle)
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    pool_config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the pool size.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_config.pool_size = size;
        self
    }

    /// Set the admission timeout.
    #[must_use]
    pub fn pool_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.pool_config.pool_timeout = timeout;
        self
    }

    /// Set the idle floor.
    #[must_use]
    pub fn min_idle_conns(mut self, count: usize) -> Self {
        self.pool_config.min_idle_conns = count;
        self
    }

    /// Set the idle ceiling.
    #[must_use]
    pub fn max_idle_conns(mut self, count: usize) -> Self {
        self.pool_config.max_idle_conns = count;
        self
    }

    /// Set the maximum idle time.
    #[must_use]
    pub fn conn_max_idle_time(mut self, idle: std::time::Duration) -> Self {
        self.pool_config.conn_max_idle_time = Some(idle);
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn conn_max_lifetime(mut self, lifetime: std::time::Duration) -> Self {
        self.pool_config.conn_max_lifetime = Some(lifetime);
        self
    }

    /// Build the pool.
    pub async fn build<L: ConnectionLifecycle>(self, lifecycle: L) -> Result<Pool<L>, PoolError> {
        Pool::new(lifecycle, self.pool_config).await
    }
}

/// Counters reported by [`Pool::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Checkouts served by a healthy idle connection.
    pub hits: u64,
    /// Checkouts that had to build a new connection.
    pub misses: u64,
    /// Admission waits that hit the pool timeout.
    pub timeouts: u64,
    /// Tracked connections (checked out or idle).
    pub total_conns: usize,
    /// Idle connections.
    pub idle_conns: usize,
    /// Connections closed by the pool: expired, idle too long, failed probe
    /// or reset, broken, or released above the idle ceiling.
    pub stale_conns: u64,
}

impl PoolStats {
    /// Fraction of checkouts served from the idle set (0.0 to 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: usize,
    /// Number of tracked connections currently checked out.
    pub in_use: usize,
    /// Total number of tracked connections.
    pub total: usize,
    /// Maximum allowed connections.
    pub max: usize,
    /// Admission slots currently held, including background builds.
    pub reserved: usize,
    /// Time since pool creation.
    pub uptime: std::time::Duration,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

struct Checkout<C> {
    conn: Conn<C>,
    reservation: Reservation,
}

/// A connection checked out of the pool.
///
/// Return it with [`release`](PooledConnection::release). If it is dropped
/// instead, the release runs on a spawned task.
pub struct PooledConnection<L: ConnectionLifecycle> {
    checkout: Option<Checkout<L::Connection>>,
    pool: Arc<PoolInner<L>>,
}

// `checkout` is only vacated by `release`, `detach` and `drop`, all of which
// consume the wrapper.
#[allow(clippy::expect_used)]
impl<L: ConnectionLifecycle> PooledConnection<L> {
    fn new(conn: Conn<L::Connection>, reservation: Reservation, pool: Arc<PoolInner<L>>) -> Self {
        Self {
            checkout: Some(Checkout { conn, reservation }),
            pool,
        }
    }

    fn conn(&self) -> &Conn<L::Connection> {
        &self
            .checkout
            .as_ref()
            .expect("pooled connection used after release")
            .conn
    }

    fn conn_mut(&mut self) -> &mut Conn<L::Connection> {
        &mut self
            .checkout
            .as_mut()
            .expect("pooled connection used after release")
            .conn
    }

    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.conn().meta
    }

    /// Return the connection to the pool.
    pub async fn release(mut self) {
        if let Some(Checkout { conn, reservation }) = self.checkout.take() {
            self.pool.release(conn, reservation).await;
        }
    }

    /// Detach the connection from the pool.
    ///
    /// The pool stops tracking it and frees its slot; the caller becomes
    /// responsible for closing it.
    pub fn detach(mut self) -> L::Connection {
        let Checkout { conn, reservation } = self
            .checkout
            .take()
            .expect("pooled connection used after release");

        if conn.meta.poolable && !self.pool.is_closed() {
            let mut state = self.pool.state.lock();
            state.registry.untrack();
            self.pool.replenish(&mut state);
        }
        drop(reservation);

        tracing::debug!(connection_id = conn.meta.id, "connection detached from pool");
        conn.raw
    }
}

impl<L: ConnectionLifecycle> Deref for PooledConnection<L> {
    type Target = L::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn().raw
    }
}

impl<L: ConnectionLifecycle> DerefMut for PooledConnection<L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn_mut().raw
    }
}

impl<L: ConnectionLifecycle> fmt::Debug for PooledConnection<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("metadata", &self.checkout.as_ref().map(|c| &c.conn.meta))
            .finish()
    }
}

impl<L: ConnectionLifecycle> Drop for PooledConnection<L> {
    fn drop(&mut self) {
        let Some(Checkout { conn, reservation }) = self.checkout.take() else {
            return;
        };

        tracing::trace!(
            connection_id = conn.meta.id,
            "returning dropped connection to pool"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(&self.pool);
                handle.spawn(async move {
                    pool.release(conn, reservation).await;
                });
            }
            Err(_) => {
                self.pool.forget(conn);
                drop(reservation);
            }
        }
    }
}
