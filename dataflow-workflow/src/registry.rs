//! Task and saved-query registries
//!
//! Both registries are plain tables: one row per task (or query), one column
//! per field. They can live in two worksheets of a spreadsheet or in two
//! local CSV files.

use async_trait::async_trait;
use dataflow_core::{EtlError, QueryRow, Record, Result, TaskRegistry, TaskRow, TabularResult};
use dataflow_sources::{read_delimited_raw, SheetsClient};
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_TASKS_WORKSHEET: &str = "taskSources";
pub const DEFAULT_QUERIES_WORKSHEET: &str = "taskQueries";

fn rows_from<T>(
    result: TabularResult,
    parse: impl Fn(Record) -> Result<T>,
    origin: &str,
) -> Result<Vec<T>> {
    result
        .into_records()
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            parse(record).map_err(|e| {
                EtlError::Configuration(format!("{} row {} is malformed: {}", origin, idx + 2, e))
            })
        })
        .collect()
}

// ===== Spreadsheet Registry =====

/// Registry kept in two worksheets of one spreadsheet.
#[derive(Debug, Clone)]
pub struct SpreadsheetRegistry {
    client: SheetsClient,
    tasks_worksheet: String,
    queries_worksheet: String,
}

impl SpreadsheetRegistry {
    pub fn new(client: SheetsClient) -> Self {
        Self {
            client,
            tasks_worksheet: DEFAULT_TASKS_WORKSHEET.to_string(),
            queries_worksheet: DEFAULT_QUERIES_WORKSHEET.to_string(),
        }
    }

    pub fn with_worksheets(mut self, tasks: impl Into<String>, queries: impl Into<String>) -> Self {
        self.tasks_worksheet = tasks.into();
        self.queries_worksheet = queries.into();
        self
    }
}

#[async_trait]
impl TaskRegistry for SpreadsheetRegistry {
    async fn load_tasks(&self) -> Result<Vec<TaskRow>> {
        let result = self.client.read_records(&self.tasks_worksheet).await?;
        let rows = rows_from(result, TaskRow::from_record, &self.tasks_worksheet)?;
        info!("Loaded {} task definitions from {}", rows.len(), self.tasks_worksheet);
        Ok(rows)
    }

    async fn load_queries(&self) -> Result<Vec<QueryRow>> {
        let result = self.client.read_records(&self.queries_worksheet).await?;
        let rows = rows_from(result, QueryRow::from_record, &self.queries_worksheet)?;
        info!("Loaded {} query definitions from {}", rows.len(), self.queries_worksheet);
        Ok(rows)
    }
}

// ===== CSV Registry =====

/// Registry kept in two local CSV files with the worksheet columns. Cells
/// are read as text, exactly as written.
#[derive(Debug, Clone)]
pub struct CsvFileRegistry {
    tasks_path: PathBuf,
    queries_path: PathBuf,
    delimiter: u8,
}

impl CsvFileRegistry {
    pub fn new(tasks_path: impl Into<PathBuf>, queries_path: impl Into<PathBuf>) -> Self {
        Self {
            tasks_path: tasks_path.into(),
            queries_path: queries_path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    async fn read(&self, path: PathBuf) -> Result<TabularResult> {
        let delimiter = self.delimiter;
        tokio::task::spawn_blocking(move || read_delimited_raw(&path, delimiter))
            .await
            .map_err(|e| EtlError::Io(format!("Registry reader task failed: {}", e)))?
    }
}

#[async_trait]
impl TaskRegistry for CsvFileRegistry {
    async fn load_tasks(&self) -> Result<Vec<TaskRow>> {
        let origin = self.tasks_path.display().to_string();
        let result = self.read(self.tasks_path.clone()).await?;
        let rows = rows_from(result, TaskRow::from_record, &origin)?;
        info!("Loaded {} task definitions from {}", rows.len(), origin);
        Ok(rows)
    }

    async fn load_queries(&self) -> Result<Vec<QueryRow>> {
        let origin = self.queries_path.display().to_string();
        let result = self.read(self.queries_path.clone()).await?;
        let rows = rows_from(result, QueryRow::from_record, &origin)?;
        info!("Loaded {} query definitions from {}", rows.len(), origin);
        Ok(rows)
    }
}
