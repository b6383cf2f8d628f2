//! Batch orchestration
//!
//! A batch has two passes. The sources pass reads the task registry, keeps
//! the active and selected rows and, for each of them in registry order,
//! fetches the source and loads the result into the warehouse. The queries
//! pass does the same for saved warehouse queries.
//!
//! Tasks are isolated from one another: whatever goes wrong inside one task
//! is logged, notified and recorded in the [`BatchReport`], and the next
//! task runs regardless. Only a registry that cannot be read aborts a pass.

use dataflow_core::{EtlError, NotificationEvent, Notifier, QueryRow, Result, TaskRegistry, TaskRow};
use dataflow_sources::AdapterRegistry;
use dataflow_storage::{QueryRunner, WarehouseLoader};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::outcome::{BatchReport, Pass, TaskOutcome, TaskSelection};

/// Counts reported by a task that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Loaded {
    fetched: usize,
    written: u64,
}

pub struct TaskOrchestrator {
    registry: Arc<dyn TaskRegistry>,
    adapters: AdapterRegistry,
    loader: WarehouseLoader,
    runner: QueryRunner,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
}

impl TaskOrchestrator {
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        adapters: AdapterRegistry,
        loader: WarehouseLoader,
        runner: QueryRunner,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            adapters,
            loader,
            runner,
            notifier,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop dispatching, and abandon the task in flight, once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn notify(&self, message: String) {
        self.notifier.notify(NotificationEvent::new(message)).await;
    }

    // ===== Sources Pass =====

    /// Run every active, selected source task.
    pub async fn run_sources(&self, selection: &TaskSelection) -> Result<BatchReport> {
        let mut report = BatchReport::new(Pass::Sources);

        let rows = self.registry.load_tasks().await.map_err(|e| {
            error!("Could not load task registry: {}", e);
            e
        })?;

        let selected: Vec<&TaskRow> = rows
            .iter()
            .filter(|row| row.is_active() && selection.includes(&row.task_name))
            .collect();
        info!("Running {} of {} source tasks", selected.len(), rows.len());

        for (idx, row) in selected.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Batch cancelled, {} source tasks not started", selected.len() - idx);
                report.cancelled = true;
                break;
            }

            let outcome = self.run_task(row).await;
            report.push(outcome);
        }

        let report = report.finish();
        info!("Source tasks finished: {}", report.summary());
        Ok(report)
    }

    /// Run one task, turning any failure into a notified failure outcome.
    async fn run_task(&self, row: &TaskRow) -> TaskOutcome {
        let name = row.task_name.trim().to_string();
        let task_token = self.cancel.child_token();
        info!("Starting task {}", name);

        let result = tokio::select! {
            _ = task_token.cancelled() => {
                Err(EtlError::Cancelled(format!("task {}", name)))
            }
            result = self.execute_task(row) => result,
        };

        match result {
            Ok(loaded) => TaskOutcome::loaded(name, loaded.fetched, loaded.written),
            Err(e) => {
                error!("Task {} failed: {}", name, e);
                self.notify(format!("Failed processing task {}: {}", name, e))
                    .await;
                TaskOutcome::failure(name, e.to_string())
            }
        }
    }

    async fn execute_task(&self, row: &TaskRow) -> Result<Loaded> {
        let task = row.to_descriptor()?;

        self.loader
            .ensure_table(&task.dataset_id, &task.table_id, &task.schema)
            .await?;

        let result = self.adapters.fetch(&task.source).await?;
        let fetched = result.row_count();
        self.notify(format!(
            "Successfully fetched {} rows from {}",
            fetched,
            task.source.describe()
        ))
        .await;

        let written = self
            .loader
            .load_with_schema(
                &result,
                &task.dataset_id,
                &task.table_id,
                task.write_mode,
                &task.schema,
            )
            .await?;
        self.notify(format!(
            "Pushed {} rows to {}.{} (mode: {})",
            written, task.dataset_id, task.table_id, task.write_mode
        ))
        .await;

        Ok(Loaded { fetched, written })
    }

    // ===== Queries Pass =====

    /// Run every active, selected saved query.
    pub async fn run_queries(&self, selection: &TaskSelection) -> Result<BatchReport> {
        let mut report = BatchReport::new(Pass::Queries);

        let rows = self.registry.load_queries().await.map_err(|e| {
            error!("Could not load query registry: {}", e);
            e
        })?;

        let selected: Vec<&QueryRow> = rows
            .iter()
            .filter(|row| row.is_active() && selection.includes(row.name()))
            .collect();
        info!("Running {} of {} saved queries", selected.len(), rows.len());

        for (idx, row) in selected.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Batch cancelled, {} saved queries not started", selected.len() - idx);
                report.cancelled = true;
                break;
            }

            let outcome = self.run_query(row).await;
            report.push(outcome);
        }

        let report = report.finish();
        info!("Saved queries finished: {}", report.summary());
        Ok(report)
    }

    async fn run_query(&self, row: &QueryRow) -> TaskOutcome {
        let name = row.name().to_string();
        let task_token = self.cancel.child_token();

        let result = tokio::select! {
            _ = task_token.cancelled() => {
                Err(EtlError::Cancelled(format!("query {}", name)))
            }
            result = async {
                let query = row.to_descriptor()?;
                self.runner.run(&query.query_text).await
            } => result,
        };

        match result {
            Ok(()) => {
                self.notify(format!("Successfully ran query {}", name)).await;
                TaskOutcome::completed(name)
            }
            Err(e) => {
                error!("Query {} failed: {}", name, e);
                self.notify(format!("Failed running query {}: {}", name, e))
                    .await;
                TaskOutcome::failure(name, e.to_string())
            }
        }
    }
}
