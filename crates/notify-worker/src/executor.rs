//! Bounded task executor.
//!
//! Two semaphores shape the load: `workers` permits bound how many tasks run
//! at once, and `workers + queue_capacity` permits bound how many are
//! accepted. `submit` waits once the queue is full, which pushes back on the
//! consumer instead of buffering without limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::handler::Handler;
use crate::task::Task;

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Counters reported by [`Executor::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Tasks accepted by `submit`.
    pub submitted: u64,
    /// Tasks whose handler returned `Ok`.
    pub completed: u64,
    /// Tasks whose handler returned an error.
    pub failed: u64,
    /// Tasks accepted and not yet finished, queued or running.
    pub in_flight: usize,
}

/// Runs handler tasks on the Tokio runtime with bounded concurrency.
pub struct Executor {
    workers: Arc<Semaphore>,
    queue: Arc<Semaphore>,
    capacity: usize,
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
    counters: Arc<Counters>,
    shutdown_timeout: Duration,
}

impl Executor {
    /// Create an executor from the worker configuration.
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.workers + config.queue_capacity;

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "task executor created"
        );

        Ok(Self {
            workers: Arc::new(Semaphore::new(config.workers)),
            queue: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Queue `task` for `handler`, waiting while the queue is full.
    ///
    /// Handler errors are logged and counted; they never reach the caller.
    pub async fn submit(&self, handler: Arc<dyn Handler>, task: Task) -> Result<()> {
        if self.is_closed() {
            return Err(WorkerError::ExecutorClosed);
        }

        let slot = Arc::clone(&self.queue)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::ExecutorClosed)?;

        let workers = Arc::clone(&self.workers);
        let counters = Arc::clone(&self.counters);

        let mut tasks = self.tasks.lock();
        // `shutdown` flips `closed` under this lock before taking the set.
        if self.is_closed() {
            return Err(WorkerError::ExecutorClosed);
        }

        // Reap finished tasks so the set only holds live ones.
        while let Some(result) = tasks.try_join_next() {
            log_join_error(result);
        }

        tasks.spawn(async move {
            let _slot = slot;
            let Ok(_worker) = workers.acquire_owned().await else {
                return;
            };

            let channel = handler.name();
            tracing::trace!(task_id = task.task_id, channel, "task started");

            match handler.execute(&task).await {
                Ok(()) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        task_id = task.task_id,
                        channel,
                        error = %e,
                        transient = e.is_transient(),
                        "task failed"
                    );
                }
            }
        });

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stop accepting tasks and wait for accepted ones to finish.
    ///
    /// Tasks still running when the shutdown timeout fires are aborted and
    /// reported in [`WorkerError::ShutdownTimeout`]. Calling this again is a
    /// no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let mut tasks = {
            let mut guard = self.tasks.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut *guard)
        };
        self.queue.close();

        tracing::info!(pending = tasks.len(), "shutting down task executor");

        let drain = async {
            while let Some(result) = tasks.join_next().await {
                log_join_error(result);
            }
        };
        let outcome = tokio::time::timeout(self.shutdown_timeout, drain).await;

        match outcome {
            Ok(()) => {
                tracing::info!(stats = ?self.stats(), "task executor stopped");
                Ok(())
            }
            Err(_elapsed) => {
                let pending = tasks.len();
                tasks.abort_all();
                tracing::error!(
                    pending,
                    timeout = ?self.shutdown_timeout,
                    "task executor shutdown timed out; aborting remaining tasks"
                );
                Err(WorkerError::ShutdownTimeout {
                    timeout: self.shutdown_timeout,
                    pending,
                })
            }
        }
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Snapshot of the executor counters.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            in_flight: self.capacity.saturating_sub(self.queue.available_permits()),
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn log_join_error(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "task panicked");
        }
    }
}
