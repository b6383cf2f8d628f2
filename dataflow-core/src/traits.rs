use async_trait::async_trait;

use crate::domain::{NotificationEvent, QueryRow, SourceKind, SourceSpec, TabularResult, TaskRow};
use crate::error::Result;

/// Produces a tabular result for one kind of source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, source: &SourceSpec) -> Result<TabularResult>;
}

/// Supplies bearer tokens to clients that talk to credentialed services.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Best-effort delivery of status messages. Implementations log their own
/// failures and never surface them to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}

/// Source of the task and saved-query definitions driving a batch.
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    async fn load_tasks(&self) -> Result<Vec<TaskRow>>;

    async fn load_queries(&self) -> Result<Vec<QueryRow>>;
}
