//! Task wire format.
//!
//! Tasks arrive from the broker as JSON:
//!
//! ```json
//! {
//!   "task_id": 42,
//!   "send_channel": "email",
//!   "msg_content": { "type": "notice", "content": "Your order shipped" },
//!   "msg_receiver": { "email": "alice@example.com" }
//! }
//! ```
//!
//! The receiver object carries exactly one of `email`, `phone` or `id`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Channel names used for routing.
pub mod channel {
    /// Email delivery.
    pub const EMAIL: &str = "email";
    /// SMS delivery.
    pub const SMS: &str = "sms";
    /// Mobile push delivery.
    pub const PUSH: &str = "push";
}

/// One delivery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Delivery record ID assigned upstream.
    pub task_id: i64,
    /// Routing key: one of the [`channel`] names.
    pub send_channel: String,
    /// What to send.
    pub msg_content: MsgContent,
    /// Who to send it to.
    pub msg_receiver: Receiver,
}

impl Task {
    /// Decode a broker payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode for the broker.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Message body and its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgContent {
    /// Category, e.g. `notice`, `marketing`, `verification`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Rendered text.
    pub content: String,
}

/// Delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Receiver {
    /// Email address.
    Email(String),
    /// Phone number.
    Phone(String),
    /// Application user or device ID.
    Id(String),
}

impl Receiver {
    /// Type code of an email receiver.
    pub const TYPE_EMAIL: u8 = 10;
    /// Type code of a phone receiver.
    pub const TYPE_PHONE: u8 = 11;
    /// Type code of an ID receiver.
    pub const TYPE_ID: u8 = 12;

    /// Numeric type code stored with delivery records.
    #[must_use]
    pub fn target_type(&self) -> u8 {
        match self {
            Self::Email(_) => Self::TYPE_EMAIL,
            Self::Phone(_) => Self::TYPE_PHONE,
            Self::Id(_) => Self::TYPE_ID,
        }
    }

    /// The address, number or ID.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Email(v) | Self::Phone(v) | Self::Id(v) => v,
        }
    }

    /// Kind name, as used in the wire format.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Phone(_) => "phone",
            Self::Id(_) => "id",
        }
    }
}

impl fmt::Display for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}
