//! # notify-pool
//!
//! Bounded, health-gated async connection pool for outbound notification
//! channels.
//!
//! The pool knows nothing about the protocol it pools. A
//! [`ConnectionLifecycle`] implementation supplies connect, probe, reset and
//! close; the pool supplies admission control, idle reuse and background
//! replenishment.
//!
//! ## Features
//!
//! - Admission bounded by `pool_size`, with a wait timeout and cancellation
//! - LIFO reuse of idle connections
//! - Lifetime, idle-time and liveness checks before every checkout
//! - Idle floor kept warm in the background, idle ceiling enforced on release
//! - Hit, miss, timeout and eviction counters
//!
//! ## Example
//!
//! ```rust,ignore
//! use notify_pool::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! let config = PoolConfig::new()
//!     .pool_size(20)
//!     .min_idle_conns(2)
//!     .max_idle_conns(5)
//!     .conn_max_idle_time(Duration::from_secs(300));
//!
//! let pool = Pool::new(lifecycle, config).await?;
//!
//! // Get a connection from the pool
//! let mut conn = pool.get().await?;
//! // Use connection...
//! conn.release().await;
//!
//! let stats = pool.stats();
//! println!("hit rate: {:.2}", stats.hit_rate());
//!
//! pool.close().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod admission;
pub mod config;
pub mod error;
mod health;
mod idle;
pub mod lifecycle;
pub mod pool;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{BoxError, PoolError};

// Pool types
pub use pool::{Pool, PoolBuilder, PoolStats, PoolStatus, PooledConnection};

// Lifecycle management
pub use lifecycle::{ConnectionLifecycle, ConnectionMetadata, ConnectionState, HealthCheckResult};
