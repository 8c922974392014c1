use std::time::Duration;

use async_trait::async_trait;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::handler::Handler;
use crate::task::{Task, channel};

/// SMS sender. Tasks routed here for another channel are ignored.
#[derive(Debug, Clone)]
pub struct SmsHandler {
    latency: (Duration, Duration),
}

impl SmsHandler {
    /// Create an SMS sender using the configured simulated latency.
    #[must_use]
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            latency: config.simulated_latency,
        }
    }
}

#[async_trait]
impl Handler for SmsHandler {
    fn name(&self) -> &'static str {
        channel::SMS
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        if task.send_channel != channel::SMS {
            tracing::debug!(task_id = task.task_id, channel = %task.send_channel, "skipping non-sms task");
            return Ok(());
        }
        super::simulate_delivery(channel::SMS, task, self.latency).await;
        Ok(())
    }
}
