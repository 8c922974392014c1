//! Admission control.
//!
//! A semaphore of `pool_size` permits bounds how many acquisitions (reuse or
//! build) can be in flight. One permit is held from the start of an acquire
//! until the connection is released.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::error::PoolError;

/// A held admission slot. Dropping it frees the slot.
#[derive(Debug)]
pub(crate) struct Reservation {
    _permit: OwnedSemaphorePermit,
}

pub(crate) struct Admission {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    timeout: Duration,
}

impl Admission {
    pub(crate) fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            timeout,
        }
    }

    /// Take a slot if one is free right now.
    pub(crate) fn try_reserve(&self) -> Option<Reservation> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| Reservation { _permit: permit })
    }

    /// Take a slot, waiting up to the pool timeout or until `cancel` fires.
    pub(crate) async fn reserve(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<Reservation, PoolError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => return Ok(Reservation { _permit: permit }),
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => {}
        }

        tracing::trace!(timeout = ?self.timeout, "waiting for a pool slot");

        let wait = tokio::time::timeout(
            self.timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        );

        let outcome = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(PoolError::Cancelled),
                    outcome = wait => outcome,
                }
            }
            None => wait.await,
        };

        match outcome {
            Ok(Ok(permit)) => Ok(Reservation { _permit: permit }),
            Ok(Err(_closed)) => Err(PoolError::Closed),
            Err(_elapsed) => Err(PoolError::Timeout {
                timeout: self.timeout,
            }),
        }
    }

    /// Fail all current and future waiters. Held reservations stay valid.
    pub(crate) fn close(&self) {
        self.semaphore.close();
    }

    /// Reservations currently held.
    pub(crate) fn outstanding(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }
}
