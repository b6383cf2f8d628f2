//! Warehouse loading
//!
//! [`WarehouseLoader`] makes sure a target table exists and writes a
//! [`TabularResult`] into it under a [`WriteMode`].
//!
//! `Upsert` is loaded exactly like `Append`: rows are added and existing
//! rows with the same key are kept. There is no merge step.

use dataflow_core::{EtlError, Result, TableSchema, TabularResult, WriteMode};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::warehouse::{LoadBatch, Warehouse};

#[derive(Clone)]
pub struct WarehouseLoader {
    warehouse: Arc<dyn Warehouse>,
}

impl WarehouseLoader {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    /// Create the dataset and then the table if either is missing. An
    /// existing table is left untouched whatever its schema.
    ///
    /// A table without declared columns cannot be created yet; it is created
    /// by [`WarehouseLoader::load`] from the columns of the loaded result.
    pub async fn ensure_table(&self, dataset_id: &str, table_id: &str, schema: &TableSchema) -> Result<()> {
        if !self.warehouse.dataset_exists(dataset_id).await? {
            info!("Dataset {} not found, creating it", dataset_id);
            self.warehouse.create_dataset(dataset_id).await?;
        }

        if self.warehouse.table_exists(dataset_id, table_id).await? {
            debug!("Table {}.{} already exists", dataset_id, table_id);
            return Ok(());
        }

        if schema.is_empty() {
            debug!(
                "No columns declared for {}.{}, deferring creation to the first load",
                dataset_id, table_id
            );
            return Ok(());
        }

        info!("Table {}.{} not found, creating it", dataset_id, table_id);
        self.warehouse.create_table(dataset_id, table_id, schema).await
    }

    /// Load `result` into the table and return the number of rows written.
    /// Every column type is inferred from the values.
    pub async fn load(
        &self,
        result: &TabularResult,
        dataset_id: &str,
        table_id: &str,
        write_mode: WriteMode,
    ) -> Result<u64> {
        self.load_with_schema(result, dataset_id, table_id, write_mode, &TableSchema::default())
            .await
    }

    /// Like [`WarehouseLoader::load`], typing declared columns from
    /// `declared`. The table is confirmed with the declared schema extended
    /// by the result's undeclared columns.
    pub async fn load_with_schema(
        &self,
        result: &TabularResult,
        dataset_id: &str,
        table_id: &str,
        write_mode: WriteMode,
        declared: &TableSchema,
    ) -> Result<u64> {
        let schema = declared.merged_with(result);
        self.ensure_table(dataset_id, table_id, &schema)
            .await
            .map_err(into_load_error)?;

        if !self
            .warehouse
            .table_exists(dataset_id, table_id)
            .await
            .map_err(into_load_error)?
        {
            if result.row_count() == 0 {
                warn!(
                    "Nothing to load into {}.{} and no columns to create it from",
                    dataset_id, table_id
                );
                return Ok(0);
            }
            return Err(EtlError::Load(format!(
                "Table {}.{} could not be confirmed before loading",
                dataset_id, table_id
            )));
        }

        let batch = LoadBatch::from_result(result, &schema);
        let written = if write_mode.truncates() {
            debug!("Replacing the rows of {}.{}", dataset_id, table_id);
            self.warehouse.replace_rows(dataset_id, table_id, &batch).await
        } else {
            self.warehouse.insert_rows(dataset_id, table_id, &batch).await
        }
        .map_err(into_load_error)?;

        info!(
            "Loaded {} rows into {}.{} (mode: {})",
            written, dataset_id, table_id, write_mode
        );
        Ok(written)
    }
}

fn into_load_error(err: EtlError) -> EtlError {
    match err {
        EtlError::Load(_) => err,
        other => EtlError::Load(other.to_string()),
    }
}
