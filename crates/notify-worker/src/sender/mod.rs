//! Channel senders.
//!
//! [`EmailHandler`] delivers through the pooled SMTP client. [`SmsHandler`]
//! and [`PushHandler`] stand in for provider integrations: they wait out a
//! simulated provider latency and log the delivery.

mod email;
mod push;
mod sms;

use std::time::Duration;

pub use email::{EmailHandler, TASK_ID_HEADER};
pub use push::PushHandler;
pub use sms::SmsHandler;

use crate::task::Task;

/// Latency for `task` within the inclusive `range`. Spread by task ID so
/// runs are reproducible.
fn simulated_latency(task: &Task, (min, max): (Duration, Duration)) -> Duration {
    let span = max.saturating_sub(min).as_millis() as u64;
    if span == 0 {
        return min;
    }
    min + Duration::from_millis(task.task_id.unsigned_abs() % (span + 1))
}

/// Wait out the simulated latency and log the delivery.
async fn simulate_delivery(channel: &'static str, task: &Task, range: (Duration, Duration)) {
    let cost = simulated_latency(task, range);
    if !cost.is_zero() {
        tokio::time::sleep(cost).await;
    }
    tracing::info!(
        channel,
        task_id = task.task_id,
        receiver = %task.msg_receiver,
        category = %task.msg_content.kind,
        cost_ms = cost.as_millis() as u64,
        "message delivered"
    );
}
