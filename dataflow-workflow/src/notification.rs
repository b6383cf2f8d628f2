use async_trait::async_trait;
use dataflow_core::{NotificationEvent, Notifier};
use dataflow_sources::HttpClient;
use tracing::{info, warn};

/// Posts `{"text": message}` to a chat webhook. Delivery failures are
/// logged and swallowed.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: HttpClient,
    url: String,
}

impl WebhookNotifier {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotificationEvent) {
        info!("{}", event.message);

        let result = self
            .http
            .post(&self.url)
            .json(&event.webhook_payload())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(
                "Webhook rejected notification with status {}",
                response.status()
            ),
            Err(e) => warn!("Failed to deliver notification: {}", e),
        }
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotificationEvent) {
        info!(target: "dataflow::notification", "{}", event.message);
    }
}
