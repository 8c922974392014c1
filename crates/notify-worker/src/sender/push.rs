use std::time::Duration;

use async_trait::async_trait;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::handler::Handler;
use crate::task::{Task, channel};

/// Push sender. Tasks routed here for another channel are ignored.
#[derive(Debug, Clone)]
pub struct PushHandler {
    latency: (Duration, Duration),
}

impl PushHandler {
    /// Create a push sender.
    #[must_use]
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            latency: config.simulated_latency,
        }
    }
}

#[async_trait]
impl Handler for PushHandler {
    fn name(&self) -> &'static str {
        channel::PUSH
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        if task.send_channel != channel::PUSH {
            tracing::debug!(task_id = task.task_id, channel = %task.send_channel, "skipping non-push task");
            return Ok(());
        }
        super::simulate_delivery(channel::PUSH, task, self.latency).await;
        Ok(())
    }
}
