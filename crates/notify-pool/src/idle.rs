//! Idle registry.
//!
//! Tracks the idle stack and the two counters the pool reasons about:
//! `total` (tracked connections, checked out or idle) and `idle`. Both
//! counters include slots reserved by in-flight background builds, which is
//! why `idle` can briefly exceed the number of connections on the stack.

use std::mem;

use crate::lifecycle::Conn;

pub(crate) struct IdleRegistry<C> {
    conns: Vec<Conn<C>>,
    total: usize,
    idle: usize,
    pool_size: usize,
    max_idle: usize,
}

impl<C> IdleRegistry<C> {
    pub(crate) fn new(pool_size: usize, max_idle: usize) -> Self {
        Self {
            conns: Vec::with_capacity(pool_size),
            total: 0,
            idle: 0,
            pool_size,
            max_idle,
        }
    }

    /// Pop the most recently idled connection.
    pub(crate) fn pop(&mut self) -> Option<Conn<C>> {
        let conn = self.conns.pop()?;
        self.idle = self.idle.saturating_sub(1);
        Some(conn)
    }

    /// Whether another connection may be idled.
    pub(crate) fn has_idle_capacity(&self) -> bool {
        self.max_idle == 0 || self.idle < self.max_idle
    }

    /// Idle a tracked connection, handing it back on overflow.
    pub(crate) fn push(&mut self, conn: Conn<C>) -> Result<(), Conn<C>> {
        if !self.has_idle_capacity() {
            return Err(conn);
        }
        self.conns.push(conn);
        self.idle += 1;
        Ok(())
    }

    /// Track a freshly built connection. Returns `false` when the pool is
    /// already at capacity, in which case the connection is not poolable.
    pub(crate) fn track(&mut self) -> bool {
        if self.total >= self.pool_size {
            return false;
        }
        self.total += 1;
        true
    }

    /// Stop tracking a closed connection.
    pub(crate) fn untrack(&mut self) {
        self.total = self.total.saturating_sub(1);
    }

    /// Whether background replenishment should add another connection.
    pub(crate) fn needs_replenish(&self, target: usize) -> bool {
        self.total < self.pool_size && self.idle < target
    }

    /// Count a background build as tracked and idle before it completes.
    pub(crate) fn reserve_slot(&mut self) {
        self.total += 1;
        self.idle += 1;
    }

    /// Place a background-built connection into its reserved slot.
    pub(crate) fn fill_slot(&mut self, conn: Conn<C>) {
        self.conns.push(conn);
    }

    /// Roll back a reserved slot after a failed background build.
    pub(crate) fn cancel_slot(&mut self) {
        self.total = self.total.saturating_sub(1);
        self.idle = self.idle.saturating_sub(1);
    }

    /// Remove every idle connection and zero the counters.
    pub(crate) fn drain(&mut self) -> Vec<Conn<C>> {
        self.total = 0;
        self.idle = 0;
        mem::take(&mut self.conns)
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn idle(&self) -> usize {
        self.idle
    }
}
