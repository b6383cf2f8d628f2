//! Delimited file source

use async_trait::async_trait;
use dataflow_core::{EtlError, Result, SourceAdapter, SourceKind, SourceSpec, TabularResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::FileSourceConfig;

/// Read a delimited file with a header row.
///
/// Empty cells become null, integral and decimal cells become numbers and
/// everything else is kept as text.
pub fn read_delimited(path: &Path, delimiter: u8) -> Result<TabularResult> {
    read_with(path, delimiter, parse_cell)
}

/// Read a delimited file with a header row, keeping every cell as the
/// exact text in the file.
pub fn read_delimited_raw(path: &Path, delimiter: u8) -> Result<TabularResult> {
    read_with(path, delimiter, |cell| Value::String(cell.to_string()))
}

fn read_with(path: &Path, delimiter: u8, cell: fn(&str) -> Value) -> Result<TabularResult> {
    if !path.is_file() {
        return Err(EtlError::NotFound(format!(
            "CSV file {} not found",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        rows.push(record.iter().map(cell).collect());
    }

    TabularResult::new(columns, rows)
}

fn parse_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }

    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }

    match cell.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(cell.to_string()),
    }
}

fn csv_error(path: &Path, err: csv::Error) -> EtlError {
    match err.kind() {
        csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            EtlError::NotFound(format!("CSV file {} not found", path.display()))
        }
        csv::ErrorKind::Io(_) => EtlError::Io(format!("{}: {}", path.display(), err)),
        _ => EtlError::InvalidData(format!("{}: {}", path.display(), err)),
    }
}

/// [`SourceAdapter`] for `file` tasks. Relative paths resolve against the
/// configured data root.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    config: FileSourceConfig,
}

impl FileAdapter {
    pub fn new(config: FileSourceConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.data_root.join(path)
        }
    }
}

#[async_trait]
impl SourceAdapter for FileAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    async fn fetch(&self, source: &SourceSpec) -> Result<TabularResult> {
        let file_path = match source {
            SourceSpec::File { file_path } => file_path,
            other => {
                return Err(EtlError::Configuration(format!(
                    "File adapter cannot fetch {} sources",
                    other.kind()
                )))
            }
        };

        let path = self.resolve(file_path);
        let delimiter = self.config.delimiter;
        let source_name = path.display().to_string();

        let result = tokio::task::spawn_blocking(move || read_delimited(&path, delimiter))
            .await
            .map_err(|e| EtlError::Io(format!("File reader task failed: {}", e)))??;

        info!("Read {} rows from {}", result.row_count(), source_name);
        Ok(result)
    }
}
