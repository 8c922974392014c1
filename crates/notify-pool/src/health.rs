//! Health policy for idle connections.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::lifecycle::{Conn, ConnectionLifecycle, ConnectionMetadata, HealthCheckResult};

/// Decides whether an idle connection may be handed to a caller.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HealthPolicy {
    max_lifetime: Option<Duration>,
    max_idle_time: Option<Duration>,
}

impl HealthPolicy {
    pub(crate) fn from_config(config: &PoolConfig) -> Self {
        Self {
            max_lifetime: config.conn_max_lifetime.filter(|d| !d.is_zero()),
            max_idle_time: config.conn_max_idle_time.filter(|d| !d.is_zero()),
        }
    }

    /// Age and idle-duration checks. No I/O.
    pub(crate) fn check(&self, meta: &ConnectionMetadata, now: Instant) -> HealthCheckResult {
        if let Some(lifetime) = self.max_lifetime {
            let age = meta.age(now);
            if age >= lifetime {
                return HealthCheckResult::Expired { age };
            }
        }

        if let Some(limit) = self.max_idle_time {
            let idle = meta.idle_for(now);
            if idle >= limit {
                return HealthCheckResult::IdleTimeout { idle };
            }
        }

        HealthCheckResult::Healthy
    }

    /// Full validation: timing checks first, then the liveness probe.
    pub(crate) async fn validate<L: ConnectionLifecycle>(
        &self,
        lifecycle: &L,
        conn: &mut Conn<L::Connection>,
    ) -> HealthCheckResult {
        let verdict = self.check(&conn.meta, Instant::now());
        if !verdict.is_healthy() {
            return verdict;
        }

        match lifecycle.health_check(&mut conn.raw).await {
            Ok(()) => HealthCheckResult::Healthy,
            Err(e) => {
                conn.meta.failure_count += 1;
                tracing::debug!(
                    connection_id = conn.meta.id,
                    error = %e,
                    "liveness probe failed"
                );
                HealthCheckResult::ProbeFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(lifetime: Option<u64>, idle: Option<u64>) -> HealthPolicy {
        let mut config = PoolConfig::new();
        config.conn_max_lifetime = lifetime.map(Duration::from_secs);
        config.conn_max_idle_time = idle.map(Duration::from_secs);
        HealthPolicy::from_config(&config)
    }

    #[test]
    fn test_unbounded_policy_accepts_old_connections() {
        let start = Instant::now();
        let meta = ConnectionMetadata::new(1, start);
        let far_future = start + Duration::from_secs(86_400);

        assert!(policy(None, None).check(&meta, far_future).is_healthy());
        assert!(policy(Some(0), Some(0)).check(&meta, far_future).is_healthy());
    }

    #[test]
    fn test_lifetime_boundary_is_inclusive() {
        let start = Instant::now();
        let meta = ConnectionMetadata::new(1, start);
        let p = policy(Some(60), None);

        assert!(p.check(&meta, start + Duration::from_secs(59)).is_healthy());
        assert_eq!(
            p.check(&meta, start + Duration::from_secs(60)),
            HealthCheckResult::Expired {
                age: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_idle_time_measured_from_last_use() {
        let start = Instant::now();
        let mut meta = ConnectionMetadata::new(1, start);
        let p = policy(None, Some(10));

        meta.touch(start + Duration::from_secs(30));
        assert!(p.check(&meta, start + Duration::from_secs(35)).is_healthy());
        assert!(matches!(
            p.check(&meta, start + Duration::from_secs(40)),
            HealthCheckResult::IdleTimeout { .. }
        ));
    }

    #[test]
    fn test_lifetime_checked_before_idle_time() {
        let start = Instant::now();
        let meta = ConnectionMetadata::new(1, start);
        let p = policy(Some(5), Some(5));

        assert!(matches!(
            p.check(&meta, start + Duration::from_secs(6)),
            HealthCheckResult::Expired { .. }
        ));
    }
}
