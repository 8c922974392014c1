//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for a [`Pool`](crate::Pool).
///
/// A zero `max_idle_conns` means idle connections are retained without limit.
/// A `None` lifetime or idle time means connections never expire on that axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum concurrently admitted acquisitions, which is also the maximum
    /// number of tracked connections.
    pub pool_size: usize,

    /// Maximum time a caller waits for admission.
    pub pool_timeout: Duration,

    /// Idle floor the pool replenishes toward in the background.
    pub min_idle_conns: usize,

    /// Idle ceiling; connections released above it are closed.
    pub max_idle_conns: usize,

    /// Idle connections unused for this long are evicted on checkout.
    pub conn_max_idle_time: Option<Duration>,

    /// Connections older than this are evicted on checkout.
    pub conn_max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_timeout: Duration::from_secs(30),
            min_idle_conns: 0,
            max_idle_conns: 0,
            conn_max_idle_time: None,
            conn_max_lifetime: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool size.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the admission timeout.
    #[must_use]
    pub fn pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = timeout;
        self
    }

    /// Set the idle floor.
    #[must_use]
    pub fn min_idle_conns(mut self, count: usize) -> Self {
        self.min_idle_conns = count;
        self
    }

    /// Set the idle ceiling (0 for unbounded).
    #[must_use]
    pub fn max_idle_conns(mut self, count: usize) -> Self {
        self.max_idle_conns = count;
        self
    }

    /// Set the maximum idle time before a connection is considered stale.
    #[must_use]
    pub fn conn_max_idle_time(mut self, idle: Duration) -> Self {
        self.conn_max_idle_time = Some(idle);
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = Some(lifetime);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.pool_size == 0 {
            return Err(PoolError::Config("pool_size must be greater than 0".into()));
        }

        if self.pool_timeout.is_zero() {
            return Err(PoolError::Config(
                "pool_timeout must be greater than 0".into(),
            ));
        }

        if self.min_idle_conns > self.pool_size {
            return Err(PoolError::Config(format!(
                "min_idle_conns ({}) cannot exceed pool_size ({})",
                self.min_idle_conns, self.pool_size
            )));
        }

        Ok(())
    }

    /// Whether the idle floor sits above a bounded idle ceiling.
    ///
    /// Replenished connections would be closed again on their next release.
    #[must_use]
    pub fn idle_floor_exceeds_ceiling(&self) -> bool {
        self.max_idle_conns > 0 && self.min_idle_conns > self.max_idle_conns
    }

    /// The idle count background replenishment aims for.
    ///
    /// Clamped to the idle ceiling when one is configured.
    #[must_use]
    pub fn replenish_target(&self) -> usize {
        if self.max_idle_conns > 0 {
            self.min_idle_conns.min(self.max_idle_conns)
        } else {
            self.min_idle_conns
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.max_idle_conns, 0);
        assert!(config.conn_max_lifetime.is_none());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let config = PoolConfig::new().pool_size(0);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = PoolConfig::new().pool_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_min_idle_above_pool_size_rejected() {
        let config = PoolConfig::new().pool_size(2).min_idle_conns(3);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_replenish_target_clamped_to_ceiling() {
        let config = PoolConfig::new()
            .pool_size(5)
            .min_idle_conns(5)
            .max_idle_conns(2);
        assert!(config.validate().is_ok());
        assert!(config.idle_floor_exceeds_ceiling());
        assert_eq!(config.replenish_target(), 2);

        let unbounded = PoolConfig::new().pool_size(5).min_idle_conns(3);
        assert!(!unbounded.idle_floor_exceeds_ceiling());
        assert_eq!(unbounded.replenish_target(), 3);
    }
}
