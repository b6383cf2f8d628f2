//! In-process warehouse used by tests and dry runs.

use async_trait::async_trait;
use dataflow_core::{EtlError, Record, Result, TableSchema};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::warehouse::{LoadBatch, Warehouse};

#[derive(Debug, Clone, Default)]
struct Table {
    schema: TableSchema,
    records: Vec<Record>,
}

#[derive(Debug, Default)]
struct State {
    datasets: BTreeSet<String>,
    tables: BTreeMap<(String, String), Table>,
    statements: Vec<String>,
}

/// [`Warehouse`] keeping tables in memory. Creation calls are counted so
/// callers can observe idempotence.
#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    state: Mutex<State>,
    dataset_creations: AtomicUsize,
    table_creations: AtomicUsize,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| EtlError::Load("In-memory warehouse lock poisoned".to_string()))
    }

    pub fn dataset_creations(&self) -> usize {
        self.dataset_creations.load(Ordering::SeqCst)
    }

    pub fn table_creations(&self) -> usize {
        self.table_creations.load(Ordering::SeqCst)
    }

    /// Schema the table was created with.
    pub fn schema(&self, dataset: &str, table: &str) -> Option<TableSchema> {
        let state = self.lock().ok()?;
        state
            .tables
            .get(&(dataset.to_string(), table.to_string()))
            .map(|t| t.schema.clone())
    }

    pub fn records(&self, dataset: &str, table: &str) -> Vec<Record> {
        self.lock()
            .ok()
            .and_then(|state| {
                state
                    .tables
                    .get(&(dataset.to_string(), table.to_string()))
                    .map(|t| t.records.clone())
            })
            .unwrap_or_default()
    }

    /// Statements passed to [`Warehouse::execute`], in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().map(|s| s.statements.clone()).unwrap_or_default()
    }
}

fn missing_table(dataset: &str, table: &str) -> EtlError {
    EtlError::Load(format!("Table {}.{} does not exist", dataset, table))
}

/// Check `batch` against the table's columns and shape it into records.
fn to_records(entry: &Table, batch: &LoadBatch, dataset: &str, table: &str) -> Result<Vec<Record>> {
    if let Some(unknown) = batch
        .column_names()
        .find(|name| entry.schema.field_type(name).is_none())
    {
        return Err(EtlError::Load(format!(
            "Column {} is not part of {}.{}",
            unknown, dataset, table
        )));
    }

    Ok(batch
        .rows
        .iter()
        .map(|row| {
            batch
                .column_names()
                .map(str::to_string)
                .zip(row.iter().cloned())
                .collect()
        })
        .collect())
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.lock()?.datasets.contains(dataset))
    }

    async fn create_dataset(&self, dataset: &str) -> Result<()> {
        self.lock()?.datasets.insert(dataset.to_string());
        self.dataset_creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .tables
            .contains_key(&(dataset.to_string(), table.to_string())))
    }

    async fn create_table(&self, dataset: &str, table: &str, schema: &TableSchema) -> Result<()> {
        let mut state = self.lock()?;
        if !state.datasets.contains(dataset) {
            return Err(EtlError::Load(format!("Dataset {} does not exist", dataset)));
        }

        state
            .tables
            .entry((dataset.to_string(), table.to_string()))
            .or_insert_with(|| Table {
                schema: schema.clone(),
                records: Vec::new(),
            });
        self.table_creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace_rows(&self, dataset: &str, table: &str, batch: &LoadBatch) -> Result<u64> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .get_mut(&(dataset.to_string(), table.to_string()))
            .ok_or_else(|| missing_table(dataset, table))?;

        entry.records = to_records(entry, batch, dataset, table)?;
        Ok(batch.len() as u64)
    }

    async fn insert_rows(&self, dataset: &str, table: &str, batch: &LoadBatch) -> Result<u64> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .get_mut(&(dataset.to_string(), table.to_string()))
            .ok_or_else(|| missing_table(dataset, table))?;

        let records = to_records(entry, batch, dataset, table)?;
        entry.records.extend(records);
        Ok(batch.len() as u64)
    }

    async fn row_count(&self, dataset: &str, table: &str) -> Result<u64> {
        let state = self.lock()?;
        state
            .tables
            .get(&(dataset.to_string(), table.to_string()))
            .map(|t| t.records.len() as u64)
            .ok_or_else(|| missing_table(dataset, table))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.lock()?.statements.push(sql.to_string());
        Ok(())
    }
}
