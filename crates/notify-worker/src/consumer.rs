//! Broker consumer glue.
//!
//! The broker client itself lives outside this crate. It hands raw payloads
//! to [`Consumer::handle_message`], or feeds them through a channel into
//! [`Consumer::run`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, WorkerError};
use crate::executor::Executor;
use crate::handler::HandlerRegistry;
use crate::task::Task;

/// How often consumption progress is logged, in messages.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Decodes broker payloads and dispatches them to channel handlers.
#[derive(Debug)]
pub struct Consumer {
    registry: HandlerRegistry,
    executor: Arc<Executor>,
    consumed: AtomicU64,
    rejected: AtomicU64,
}

impl Consumer {
    /// Create a consumer dispatching through `registry` onto `executor`.
    #[must_use]
    pub fn new(registry: HandlerRegistry, executor: Arc<Executor>) -> Self {
        Self {
            registry,
            executor,
            consumed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Decode one payload, resolve its channel handler and submit it.
    ///
    /// Returns once the task is queued, not once it is delivered.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<()> {
        let task = Task::from_slice(payload).inspect_err(|e| {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, bytes = payload.len(), "discarding undecodable task");
        })?;

        let handler = self.registry.get(&task.send_channel).inspect_err(|_| {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                task_id = task.task_id,
                channel = %task.send_channel,
                "no handler for channel"
            );
        })?;

        tracing::debug!(
            task_id = task.task_id,
            channel = handler.name(),
            "dispatching task"
        );
        self.executor.submit(handler, task).await?;

        let consumed = self.consumed.fetch_add(1, Ordering::Relaxed) + 1;
        if consumed % PROGRESS_INTERVAL == 0 {
            tracing::info!(consumed, "consumer progress");
        }
        Ok(())
    }

    /// Consume payloads from `messages` until the sender side closes, `cancel`
    /// fires, or the executor shuts down.
    ///
    /// Undecodable payloads and unknown channels are logged and skipped, so
    /// one poison message does not stall the stream.
    pub async fn run(
        &self,
        mut messages: mpsc::Receiver<Vec<u8>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::info!(channels = ?self.registry.channels(), "consumer started");

        loop {
            let payload = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                payload = messages.recv() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            match self.handle_message(&payload).await {
                Ok(()) => {}
                Err(WorkerError::Decode(_) | WorkerError::UnknownChannel(_)) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "consumer stopping");
                    return Err(e);
                }
            }
        }

        tracing::info!(
            consumed = self.consumed(),
            rejected = self.rejected(),
            "consumer stopped"
        );
        Ok(())
    }

    /// Payloads successfully handed to the executor.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Payloads dropped as undecodable or unroutable.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// The executor tasks are submitted to.
    #[must_use]
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }
}
