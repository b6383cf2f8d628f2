use async_trait::async_trait;
use dataflow_core::{EtlError, FieldType, Result, SchemaField, TableSchema, TabularResult, WriteMode};
use dataflow_storage::{InMemoryWarehouse, LoadBatch, QueryRunner, Warehouse, WarehouseLoader};
use mockall::{mock, Sequence};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Value};
use std::sync::Arc;

mock! {
    pub Backend {}

    #[async_trait]
    impl Warehouse for Backend {
        async fn dataset_exists(&self, dataset: &str) -> Result<bool>;
        async fn create_dataset(&self, dataset: &str) -> Result<()>;
        async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool>;
        async fn create_table(&self, dataset: &str, table: &str, schema: &TableSchema) -> Result<()>;
        async fn replace_rows(&self, dataset: &str, table: &str, batch: &LoadBatch) -> Result<u64>;
        async fn insert_rows(&self, dataset: &str, table: &str, batch: &LoadBatch) -> Result<u64>;
        async fn row_count(&self, dataset: &str, table: &str) -> Result<u64>;
        async fn execute(&self, sql: &str) -> Result<()>;
    }
}

fn rows(ids: &[i64]) -> TabularResult {
    TabularResult::new(
        vec!["id".to_string(), "region".to_string()],
        ids.iter().map(|id| vec![json!(id), json!("eu")]).collect(),
    )
    .unwrap()
}

fn declared() -> TableSchema {
    TableSchema::new(vec![
        SchemaField::new("id", FieldType::Integer),
        SchemaField::new("region", FieldType::String),
    ])
}

// ===== Write Modes =====

#[rstest]
#[case::append(WriteMode::Append, 5)]
#[case::replace(WriteMode::Replace, 3)]
#[case::upsert_keeps_duplicates(WriteMode::Upsert, 5)]
#[tokio::test]
async fn test_write_mode_row_counts(#[case] mode: WriteMode, #[case] expected: u64) {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let loader = WarehouseLoader::new(warehouse.clone());

    loader.ensure_table("sales", "orders", &declared()).await.unwrap();
    loader
        .load_with_schema(&rows(&[1, 2]), "sales", "orders", WriteMode::Append, &declared())
        .await
        .unwrap();

    let written = loader
        .load_with_schema(&rows(&[1, 2, 3]), "sales", "orders", mode, &declared())
        .await
        .unwrap();

    assert_eq!(written, 3);
    assert_eq!(warehouse.row_count("sales", "orders").await.unwrap(), expected);
}

#[tokio::test]
async fn test_placeholder_row_is_loaded_with_nulls_for_typed_columns() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let loader = WarehouseLoader::new(warehouse.clone());
    let empty = TabularResult::empty_with_columns(vec!["id".to_string(), "region".to_string()]);

    let written = loader
        .load_with_schema(&empty, "sales", "orders", WriteMode::Replace, &declared())
        .await
        .unwrap();

    assert_eq!(written, 1);
    let records = warehouse.records("sales", "orders");
    assert_eq!(records[0]["id"], Value::Null);
    assert_eq!(records[0]["region"], json!(""));
}

#[tokio::test]
async fn test_load_infers_undeclared_column_types() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let loader = WarehouseLoader::new(warehouse.clone());
    let result = TabularResult::new(
        vec!["n".to_string(), "ratio".to_string(), "ok".to_string(), "label".to_string()],
        vec![vec![json!(1), json!(0.5), json!(true), json!("x")]],
    )
    .unwrap();

    loader
        .load(&result, "metrics", "daily", WriteMode::Append)
        .await
        .unwrap();

    let schema = warehouse.schema("metrics", "daily").unwrap();
    assert_eq!(schema.field_type("n"), Some(FieldType::Integer));
    assert_eq!(schema.field_type("ratio"), Some(FieldType::Float));
    assert_eq!(schema.field_type("ok"), Some(FieldType::Boolean));
    assert_eq!(schema.field_type("label"), Some(FieldType::String));
}

#[tokio::test]
async fn test_failed_replace_keeps_prior_rows() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let loader = WarehouseLoader::new(warehouse.clone());

    loader
        .load_with_schema(&rows(&[1, 2, 3]), "sales", "orders", WriteMode::Append, &declared())
        .await
        .unwrap();

    let widened = TabularResult::new(
        vec!["id".to_string(), "region".to_string(), "extra".to_string()],
        vec![vec![json!(9), json!("us"), json!("x")]],
    )
    .unwrap();
    let err = loader
        .load_with_schema(&widened, "sales", "orders", WriteMode::Replace, &declared())
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::Load(_)));
    assert!(err.to_string().contains("extra"));
    assert_eq!(warehouse.row_count("sales", "orders").await.unwrap(), 3);
}

#[tokio::test]
async fn test_empty_api_result_without_table_loads_nothing() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let loader = WarehouseLoader::new(warehouse.clone());

    let written = loader
        .load(&TabularResult::default(), "raw", "events", WriteMode::Replace)
        .await
        .unwrap();

    assert_eq!(written, 0);
    assert_eq!(warehouse.table_creations(), 0);
}

// ===== Backend Interaction =====

#[tokio::test]
async fn test_existing_table_is_never_recreated() {
    let mut backend = MockBackend::new();
    backend.expect_dataset_exists().returning(|_| Ok(true));
    backend.expect_table_exists().returning(|_, _| Ok(true));
    backend.expect_create_dataset().times(0);
    backend.expect_create_table().times(0);

    let loader = WarehouseLoader::new(Arc::new(backend));
    loader.ensure_table("sales", "orders", &declared()).await.unwrap();
    loader.ensure_table("sales", "orders", &declared()).await.unwrap();
}

#[tokio::test]
async fn test_missing_dataset_is_created_before_table() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();

    backend
        .expect_dataset_exists()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(false));
    backend
        .expect_create_dataset()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    backend
        .expect_table_exists()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(false));
    backend
        .expect_create_table()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, schema| {
            assert_eq!(schema.len(), 2);
            Ok(())
        });

    let loader = WarehouseLoader::new(Arc::new(backend));
    loader.ensure_table("sales", "orders", &declared()).await.unwrap();
}

#[tokio::test]
async fn test_replace_swaps_rows_in_one_call() {
    let mut backend = MockBackend::new();

    backend.expect_dataset_exists().returning(|_| Ok(true));
    backend.expect_table_exists().returning(|_, _| Ok(true));
    backend.expect_insert_rows().times(0);
    backend
        .expect_replace_rows()
        .times(1)
        .returning(|_, _, batch| Ok(batch.len() as u64));

    let loader = WarehouseLoader::new(Arc::new(backend));
    let written = loader
        .load(&rows(&[1, 2]), "sales", "orders", WriteMode::Replace)
        .await
        .unwrap();

    assert_eq!(written, 2);
}

#[tokio::test]
async fn test_upsert_never_replaces() {
    let mut backend = MockBackend::new();

    backend.expect_dataset_exists().returning(|_| Ok(true));
    backend.expect_table_exists().returning(|_, _| Ok(true));
    backend.expect_replace_rows().times(0);
    backend
        .expect_insert_rows()
        .times(1)
        .returning(|_, _, batch| Ok(batch.len() as u64));

    let loader = WarehouseLoader::new(Arc::new(backend));
    loader
        .load(&rows(&[1]), "sales", "orders", WriteMode::Upsert)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_backend_failure_is_load_error() {
    let mut backend = MockBackend::new();

    backend.expect_dataset_exists().returning(|_| Ok(true));
    backend.expect_table_exists().returning(|_, _| Ok(true));
    backend
        .expect_insert_rows()
        .returning(|_, _, _| Err(EtlError::SourceUnavailable("connection reset".to_string())));

    let loader = WarehouseLoader::new(Arc::new(backend));
    let err = loader
        .load(&rows(&[1]), "sales", "orders", WriteMode::Append)
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::Load(_)));
    assert!(err.to_string().contains("connection reset"));
}

// ===== Query Runner =====

#[tokio::test]
async fn test_query_failure_is_query_execution_error() {
    let mut backend = MockBackend::new();
    backend
        .expect_execute()
        .times(1)
        .returning(|_| Err(EtlError::Load("Code: 60. Table x does not exist".to_string())));

    let runner = QueryRunner::new(Arc::new(backend));
    let err = runner.run("INSERT INTO x SELECT 1").await.unwrap_err();

    assert!(matches!(err, EtlError::QueryExecution(_)));
}
