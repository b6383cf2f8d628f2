//! # Dataflow Workflow
//!
//! Drives a batch: task and query registries, the [`TaskOrchestrator`] that
//! dispatches each task to its source and the warehouse, and notifiers that
//! report on it.

pub mod notification;
pub mod orchestrator;
pub mod outcome;
pub mod registry;

pub use notification::{LogNotifier, WebhookNotifier};
pub use orchestrator::TaskOrchestrator;
pub use outcome::{BatchReport, Pass, TaskOutcome, TaskSelection};
pub use registry::{CsvFileRegistry, SpreadsheetRegistry, DEFAULT_QUERIES_WORKSHEET, DEFAULT_TASKS_WORKSHEET};
