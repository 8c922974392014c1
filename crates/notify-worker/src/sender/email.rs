use async_trait::async_trait;
use notify_smtp::{Email, SmtpClient};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::handler::Handler;
use crate::task::{Receiver, Task, channel};

/// Header carrying the task ID on outgoing mail.
pub const TASK_ID_HEADER: &str = "X-Notify-Task-Id";

/// Email sender backed by a pooled [`SmtpClient`].
///
/// Each task is one mail transaction on a pooled session: the task content
/// becomes the plain-text body and the receiver the single `To` address.
#[derive(Debug, Clone)]
pub struct EmailHandler {
    client: SmtpClient,
    from: String,
    subject: String,
}

impl EmailHandler {
    /// Create a handler sending through `client` with the configured sender
    /// and subject.
    #[must_use]
    pub fn new(client: SmtpClient, config: &WorkerConfig) -> Self {
        Self {
            client,
            from: config.email_from.clone(),
            subject: config.email_subject.clone(),
        }
    }

    /// The client this handler sends through.
    #[must_use]
    pub fn client(&self) -> &SmtpClient {
        &self.client
    }

    /// Build the message for `task`.
    pub fn compose(&self, task: &Task) -> Result<Email> {
        let Receiver::Email(address) = &task.msg_receiver else {
            return Err(WorkerError::ReceiverMismatch {
                task_id: task.task_id,
                channel: channel::EMAIL,
                receiver: task.msg_receiver.kind(),
            });
        };

        let email = Email::builder()
            .from(self.from.as_str())
            .to(address.as_str())
            .subject(self.subject.as_str())
            .text(task.msg_content.content.as_str())
            .header(TASK_ID_HEADER, task.task_id.to_string())
            .build()?;
        Ok(email)
    }
}

#[async_trait]
impl Handler for EmailHandler {
    fn name(&self) -> &'static str {
        channel::EMAIL
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        let email = self.compose(task)?;
        let reply = self.client.send(&email).await?;

        tracing::info!(
            channel = channel::EMAIL,
            task_id = task.task_id,
            reply = %reply,
            "message delivered"
        );
        Ok(())
    }
}
