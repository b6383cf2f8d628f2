//! Warehouse backend seam
//!
//! [`Warehouse`] is the narrow set of operations the loader and the query
//! runner need from a columnar store. Datasets group tables; how a backend
//! maps them (ClickHouse uses databases) is its own business.

use async_trait::async_trait;
use dataflow_core::{FieldType, Result, SchemaField, TableSchema, TabularResult};
use serde_json::Value;

#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool>;

    async fn create_dataset(&self, dataset: &str) -> Result<()>;

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool>;

    /// Create a table with exactly the given columns.
    async fn create_table(&self, dataset: &str, table: &str, schema: &TableSchema) -> Result<()>;

    /// Replace every row of the table with `batch` in one step and return
    /// the number of rows written. On failure the previous rows are kept.
    async fn replace_rows(&self, dataset: &str, table: &str, batch: &LoadBatch) -> Result<u64>;

    /// Append a batch and return the number of rows written.
    async fn insert_rows(&self, dataset: &str, table: &str, batch: &LoadBatch) -> Result<u64>;

    async fn row_count(&self, dataset: &str, table: &str) -> Result<u64>;

    /// Run a statement to completion, discarding any result set.
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// Rows ready for insertion, each aligned with `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBatch {
    pub fields: Vec<SchemaField>,
    pub rows: Vec<Vec<Value>>,
}

impl LoadBatch {
    /// Type every column of `result` through `schema`. Empty strings bound
    /// for columns that are not `STRING` become null.
    pub fn from_result(result: &TabularResult, schema: &TableSchema) -> Self {
        let fields: Vec<SchemaField> = result
            .columns()
            .iter()
            .map(|name| {
                SchemaField::new(
                    name.clone(),
                    schema.field_type(name).unwrap_or(FieldType::String),
                )
            })
            .collect();

        let rows = result
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&fields)
                    .map(|(value, field)| match value {
                        Value::String(s) if s.is_empty() && field.field_type != FieldType::String => {
                            Value::Null
                        }
                        other => other.clone(),
                    })
                    .collect()
            })
            .collect();

        Self { fields, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}
