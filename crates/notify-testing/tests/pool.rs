//! Connection pool integration tests.
//!
//! Every test drives a real `Pool` over `MockLifecycle`. Tests that reason
//! about time run on a paused clock so timeouts and expiry are exact.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use notify_pool::{Pool, PoolBuilder, PoolConfig, PoolError};
use notify_testing::MockLifecycle;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Let spawned background work (replenishment, drop-release) run to completion.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn pool_with(lifecycle: &MockLifecycle, config: PoolConfig) -> Pool<MockLifecycle> {
    Pool::new(lifecycle.clone(), config).await.unwrap()
}

// =============================================================================
// Creation and replenishment
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cold_start_fills_idle_floor() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(3).min_idle_conns(2)).await;

    settle().await;

    let stats = pool.stats();
    assert_eq!(stats.idle_conns, 2);
    assert_eq!(stats.total_conns, 2);
    assert_eq!(lifecycle.opened(), 2);
    assert_eq!(pool.status().reserved, 0);
}

#[tokio::test(start_paused = true)]
async fn test_checkout_below_floor_triggers_replenish() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(3).min_idle_conns(2)).await;
    settle().await;

    let conn = pool.get().await.unwrap();
    assert_eq!(pool.stats().hits, 1);

    settle().await;
    let stats = pool.stats();
    assert_eq!(stats.idle_conns, 2);
    assert_eq!(stats.total_conns, 3);

    conn.release().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_floor_capped_by_ceiling() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(
        &lifecycle,
        PoolConfig::new()
            .pool_size(5)
            .min_idle_conns(4)
            .max_idle_conns(2),
    )
    .await;

    settle().await;

    assert_eq!(pool.stats().idle_conns, 2);
    assert_eq!(lifecycle.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_background_build_failure_rolls_back_counters() {
    let lifecycle = MockLifecycle::new();
    lifecycle.fail_connect(true);
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(4).min_idle_conns(2)).await;

    settle().await;

    let stats = pool.stats();
    assert_eq!(stats.total_conns, 0);
    assert_eq!(stats.idle_conns, 0);
    assert_eq!(pool.status().reserved, 0);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let result = Pool::new(MockLifecycle::new(), PoolConfig::new().pool_size(0)).await;
    assert!(matches!(result, Err(PoolError::Config(_))));
}

#[tokio::test]
async fn test_builder() {
    let lifecycle = MockLifecycle::new();
    let pool = PoolBuilder::new()
        .pool_size(4)
        .max_idle_conns(2)
        .conn_max_lifetime(Duration::from_secs(60))
        .build(lifecycle.clone())
        .await
        .unwrap();

    assert_eq!(pool.config().pool_size, 4);
    assert_eq!(pool.config().max_idle_conns, 2);
    assert_eq!(pool.config().conn_max_lifetime, Some(Duration::from_secs(60)));

    pool.ping().await.unwrap();
    assert_eq!(lifecycle.opened(), 1);
}

// =============================================================================
// Checkout and reuse
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reuse_hits_and_refreshes_last_used() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(2)).await;

    let conn = pool.get().await.unwrap();
    let first_id = conn.metadata().id;
    conn.release().await;
    let released_at = tokio::time::Instant::now();

    tokio::time::advance(Duration::from_secs(1)).await;

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.metadata().id, first_id);
    assert!(conn.metadata().last_used_at > released_at);
    conn.release().await;
    let released_again_at = tokio::time::Instant::now();

    tokio::time::advance(Duration::from_secs(1)).await;

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.metadata().id, first_id);
    assert!(conn.metadata().last_used_at > released_again_at);
    conn.release().await;

    let stats = pool.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(lifecycle.opened(), 1);
    assert_eq!(lifecycle.probes(), 2);
    assert_eq!(lifecycle.resets(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reuse_is_most_recently_idled_first() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(2)).await;

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    let b_id = b.id;

    a.release().await;
    b.release().await;

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id, b_id);
    conn.release().await;
}

#[tokio::test(start_paused = true)]
async fn test_ping_warms_pool() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(2)).await;

    pool.ping().await.unwrap();
    pool.ping().await.unwrap();

    let stats = pool.stats();
    assert_eq!(stats.idle_conns, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_is_returned() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(2)).await;

    let conn = pool.get().await.unwrap();
    drop(conn);
    settle().await;

    let stats = pool.stats();
    assert_eq!(stats.idle_conns, 1);
    assert_eq!(stats.total_conns, 1);
    assert_eq!(lifecycle.resets(), 1);
    assert_eq!(pool.status().reserved, 0);
}

#[tokio::test(start_paused = true)]
async fn test_detach_frees_slot() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(1)).await;

    let conn = pool.get().await.unwrap();
    let raw = conn.detach();
    assert_eq!(raw.id, 1);

    let stats = pool.stats();
    assert_eq!(stats.total_conns, 0);
    assert_eq!(pool.status().reserved, 0);
    assert_eq!(lifecycle.closed(), 0);

    // The single slot is free again.
    let conn = pool.get().await.unwrap();
    conn.release().await;
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_admission_timeout_is_deterministic() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(
        &lifecycle,
        PoolConfig::new()
            .pool_size(1)
            .pool_timeout(Duration::from_millis(100)),
    )
    .await;

    let held = pool.get().await.unwrap();

    let start = Instant::now();
    let err = pool.get().await.unwrap_err();
    let waited = start.elapsed();

    assert!(matches!(err, PoolError::Timeout { .. }));
    assert!(err.is_transient());
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_millis(110));
    assert_eq!(pool.stats().timeouts, 1);

    held.release().await;
    pool.get().await.unwrap().release().await;
}

#[tokio::test(start_paused = true)]
async fn test_waiter_admitted_on_release() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(1)).await;

    let held = pool.get().await.unwrap();
    let held_id = held.id;

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|conn| conn.id) })
    };
    settle().await;
    assert!(!waiter.is_finished());

    held.release().await;
    assert_eq!(waiter.await.unwrap().unwrap(), held_id);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(1)).await;
    let held = pool.get().await.unwrap();

    let token = CancellationToken::new();
    let waiter = {
        let pool = pool.clone();
        let token = token.clone();
        tokio::spawn(async move { pool.get_with_cancel(&token).await.map(|_| ()) })
    };
    settle().await;
    token.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, PoolError::Cancelled));
    assert_eq!(pool.stats().timeouts, 0);

    held.release().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_releases_reservation() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(1)).await;

    lifecycle.fail_connect(true);
    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, PoolError::Connect(_)));
    assert_eq!(pool.status().reserved, 0);
    assert_eq!(pool.stats().total_conns, 0);

    lifecycle.fail_connect(false);
    pool.get().await.unwrap().release().await;
    assert_eq!(pool.stats().misses, 2);
}

// =============================================================================
// Release and eviction
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_release_above_ceiling_closes_overflow() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(5).max_idle_conns(2)).await;

    let mut held = Vec::new();
    for _ in 0..5 {
        held.push(pool.get().await.unwrap());
    }
    for conn in held {
        conn.release().await;
    }

    let stats = pool.stats();
    assert_eq!(stats.idle_conns, 2);
    assert_eq!(stats.total_conns, 2);
    assert_eq!(stats.stale_conns, 3);
    assert_eq!(lifecycle.closed(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_expired_connection_evicted_on_checkout() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(
        &lifecycle,
        PoolConfig::new()
            .pool_size(2)
            .conn_max_lifetime(Duration::from_secs(60)),
    )
    .await;

    let conn = pool.get().await.unwrap();
    let first = conn.id;
    conn.release().await;

    tokio::time::advance(Duration::from_secs(61)).await;

    let conn = pool.get().await.unwrap();
    assert_ne!(conn.id, first);
    conn.release().await;

    let stats = pool.stats();
    assert_eq!(stats.stale_conns, 1);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    assert_eq!(lifecycle.closed_ids(), vec![first]);
    // Expired connections are not probed.
    assert_eq!(lifecycle.probes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_measured_from_last_use() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(
        &lifecycle,
        PoolConfig::new()
            .pool_size(2)
            .conn_max_idle_time(Duration::from_secs(10)),
    )
    .await;

    pool.ping().await.unwrap();
    tokio::time::advance(Duration::from_secs(5)).await;
    pool.ping().await.unwrap();
    assert_eq!(pool.stats().hits, 1);

    tokio::time::advance(Duration::from_secs(11)).await;
    pool.ping().await.unwrap();

    let stats = pool.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.stale_conns, 1);
    assert_eq!(lifecycle.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_evicts_and_builds_fresh() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(2)).await;

    pool.ping().await.unwrap();
    lifecycle.fail_probe(true);

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id, 2);
    conn.release().await;

    let stats = pool.stats();
    assert_eq!(stats.stale_conns, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.total_conns, 1);
    assert_eq!(lifecycle.probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reset_discards() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(2)).await;

    lifecycle.fail_reset(true);
    pool.ping().await.unwrap();

    let stats = pool.stats();
    assert_eq!(stats.idle_conns, 0);
    assert_eq!(stats.total_conns, 0);
    assert_eq!(stats.stale_conns, 1);
    assert_eq!(lifecycle.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_broken_connection_closed_on_release() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(2)).await;

    let mut conn = pool.get().await.unwrap();
    conn.broken = true;
    conn.release().await;

    let stats = pool.stats();
    assert_eq!(stats.idle_conns, 0);
    assert_eq!(stats.stale_conns, 1);
    assert_eq!(lifecycle.closed(), 1);
    // Broken connections are not reset.
    assert_eq!(lifecycle.resets(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_replenishes_floor() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(
        &lifecycle,
        PoolConfig::new()
            .pool_size(3)
            .min_idle_conns(1)
            .conn_max_lifetime(Duration::from_secs(30)),
    )
    .await;
    settle().await;
    assert_eq!(pool.stats().idle_conns, 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    pool.ping().await.unwrap();
    settle().await;

    let stats = pool.stats();
    assert_eq!(stats.stale_conns, 1);
    assert!(stats.idle_conns >= 1);
    assert!(stats.total_conns <= 3);
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_drains_idle_and_rejects_new_work() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(3).min_idle_conns(2)).await;
    settle().await;

    let held = pool.get().await.unwrap();
    settle().await;
    let before = lifecycle.closed();

    pool.close().await.unwrap();
    assert!(pool.is_closed());
    assert!(lifecycle.closed() > before);
    assert_eq!(pool.stats().idle_conns, 0);

    assert!(matches!(pool.close().await, Err(PoolError::Closed)));
    assert!(matches!(pool.get().await, Err(PoolError::Closed)));

    // Connections released after close are closed, not idled.
    held.release().await;
    assert_eq!(lifecycle.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_fails_waiters() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(1)).await;
    let held = pool.get().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|_| ()) })
    };
    settle().await;

    pool.close().await.unwrap();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, PoolError::Closed));

    held.release().await;
    assert_eq!(lifecycle.live(), 0);
}

// =============================================================================
// Accounting under load
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_counters_are_conserved() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(3).max_idle_conns(1)).await;

    for round in 0..20 {
        let a = pool.get().await.unwrap();
        let mut b = pool.get().await.unwrap();
        b.broken = round % 3 == 0;
        a.release().await;
        b.release().await;
    }

    let stats = pool.stats();
    assert_eq!(stats.hits + stats.misses, 40);
    assert_eq!(stats.total_conns, stats.idle_conns);
    assert_eq!(lifecycle.live(), stats.total_conns);
    assert_eq!(
        lifecycle.opened() - lifecycle.closed(),
        stats.total_conns
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturation_respects_pool_size() {
    const POOL_SIZE: usize = 10;
    const TASKS: usize = 1000;

    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(POOL_SIZE)).await;

    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();
    for _ in 0..TASKS {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        let peak = Arc::clone(&peak);
        tasks.spawn(async move {
            let conn = pool.get().await?;
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            in_use.fetch_sub(1, Ordering::SeqCst);
            conn.release().await;
            Ok::<_, PoolError>(())
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let stats = pool.stats();
    assert!(peak.load(Ordering::SeqCst) <= POOL_SIZE);
    assert!(lifecycle.max_live() <= POOL_SIZE);
    assert!(stats.total_conns <= POOL_SIZE);
    assert_eq!(stats.hits + stats.misses, TASKS as u64);
    assert_eq!(stats.timeouts, 0);
    assert_eq!(pool.status().reserved, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pings() {
    let lifecycle = MockLifecycle::new();
    let pool = pool_with(&lifecycle, PoolConfig::new().pool_size(10)).await;

    let mut tasks = JoinSet::new();
    for _ in 0..1000 {
        let pool = pool.clone();
        tasks.spawn(async move { pool.ping().await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let stats = pool.stats();
    assert!(stats.total_conns <= 10);
    assert!(stats.idle_conns <= 10);
    assert_eq!(lifecycle.opened() - lifecycle.closed(), stats.total_conns);
}
