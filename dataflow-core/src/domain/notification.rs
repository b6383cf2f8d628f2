use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fire-and-forget status message. Never retried, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Body for chat-style webhooks.
    pub fn webhook_payload(&self) -> serde_json::Value {
        serde_json::json!({ "text": self.message })
    }
}
