use dataflow_core::{EtlError, Result};
use std::sync::Arc;
use tracing::info;

use crate::warehouse::Warehouse;

/// Runs saved statements against the warehouse for their side effects.
#[derive(Clone)]
pub struct QueryRunner {
    warehouse: Arc<dyn Warehouse>,
}

impl QueryRunner {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Execute `query_text` and wait for it to finish. Failures are not
    /// retried.
    pub async fn run(&self, query_text: &str) -> Result<()> {
        let query_text = query_text.trim();
        if query_text.is_empty() {
            return Err(EtlError::Configuration("Query text is empty".to_string()));
        }

        self.warehouse
            .execute(query_text)
            .await
            .map_err(|e| match e {
                EtlError::QueryExecution(_) => e,
                other => EtlError::QueryExecution(other.to_string()),
            })?;

        info!("Query finished ({} chars)", query_text.len());
        Ok(())
    }
}
