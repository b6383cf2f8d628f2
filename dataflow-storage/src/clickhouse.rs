use async_trait::async_trait;
use clickhouse::sql::Identifier;
use clickhouse::Client;
use dataflow_core::{EtlError, FieldType, Result, TableSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::warehouse::{LoadBatch, Warehouse};

/// Rows per INSERT statement.
const INSERT_CHUNK_ROWS: usize = 1000;

/// ClickHouse configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "default".to_string(),
            username: None,
            password: None,
        }
    }
}

/// Create a ClickHouse client with the given configuration
pub fn create_client(config: &ClickHouseConfig) -> Client {
    let mut client = Client::default()
        .with_url(&config.url)
        .with_database(&config.database);

    if let Some(username) = &config.username {
        client = client.with_user(username);
    }

    if let Some(password) = &config.password {
        client = client.with_password(password);
    }

    tracing::info!("ClickHouse client created for {}", config.url);
    client
}

/// Check if ClickHouse is healthy and accessible
pub async fn health_check(client: &Client) -> Result<bool> {
    match client.query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            tracing::info!("ClickHouse health check passed");
            Ok(true)
        }
        Err(e) => {
            tracing::error!("ClickHouse health check failed: {}", e);
            Err(EtlError::SourceUnavailable(format!("ClickHouse: {}", e)))
        }
    }
}

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String | FieldType::Json => "Nullable(String)",
        FieldType::Integer => "Nullable(Int64)",
        FieldType::Float => "Nullable(Float64)",
        FieldType::Boolean => "Nullable(Bool)",
        FieldType::Timestamp => "Nullable(DateTime64(3))",
        FieldType::Date => "Nullable(Date)",
    }
}

/// A value coerced to the shape its column expects before binding.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    fn coerce(value: &Value, field_type: FieldType) -> Cell {
        match (field_type, value) {
            (_, Value::Null) => Cell::Null,
            (FieldType::Integer, Value::Number(n)) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => Cell::Float(n.as_f64().unwrap_or_default()),
            },
            (FieldType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Cell::Int(i),
                Err(_) => Cell::Text(s.clone()),
            },
            (FieldType::Float, Value::Number(n)) => Cell::Float(n.as_f64().unwrap_or_default()),
            (FieldType::Float, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Cell::Float(f),
                Err(_) => Cell::Text(s.clone()),
            },
            (FieldType::Boolean, Value::Bool(b)) => Cell::Bool(*b),
            (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "y" | "yes" => Cell::Bool(true),
                "false" | "0" | "n" | "no" => Cell::Bool(false),
                _ => Cell::Text(s.clone()),
            },
            (_, Value::String(s)) => Cell::Text(s.clone()),
            (_, Value::Bool(b)) => Cell::Text(b.to_string()),
            (_, other) => Cell::Text(other.to_string()),
        }
    }
}

fn load_error(context: &str, err: clickhouse::error::Error) -> EtlError {
    EtlError::Load(format!("{}: {}", context, err))
}

/// Table that receives a replacement batch before it is swapped in.
fn staging_table(table: &str) -> String {
    format!("{}__replace", table)
}

/// [`Warehouse`] backed by ClickHouse. Datasets are databases; every column
/// is nullable and tables use a plain MergeTree engine.
///
/// Saved statements are posted verbatim to the HTTP interface, since the
/// client treats every `?` in a query as a bind placeholder.
#[derive(Clone)]
pub struct ClickHouseWarehouse {
    client: Client,
    http: reqwest::Client,
    config: ClickHouseConfig,
}

impl ClickHouseWarehouse {
    pub fn new(config: &ClickHouseConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build().map_err(|e| {
            EtlError::Configuration(format!("Failed to build ClickHouse HTTP client: {}", e))
        })?;

        Ok(Self {
            client: create_client(config),
            http,
            config: config.clone(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn exists(&self, sql: &str, names: &[&str]) -> Result<bool> {
        let mut query = self.client.query(sql);
        for name in names {
            query = query.bind(Identifier(name));
        }

        let flag = query
            .fetch_one::<u8>()
            .await
            .map_err(|e| load_error("Existence check failed", e))?;
        Ok(flag == 1)
    }

    /// Run a statement whose only placeholders are identifiers.
    async fn ddl(&self, sql: &str, names: &[&str], context: &str) -> Result<()> {
        let mut query = self.client.query(sql);
        for name in names {
            query = query.bind(Identifier(name));
        }
        query.execute().await.map_err(|e| load_error(context, e))
    }

    async fn drop_table(&self, dataset: &str, table: &str) -> Result<()> {
        self.ddl(
            "DROP TABLE IF EXISTS ?.?",
            &[dataset, table],
            "Dropping table failed",
        )
        .await
    }

    fn insert_sql(columns: usize, rows: usize) -> String {
        let placeholders = vec!["?"; columns].join(", ");
        let tuple = format!("({})", placeholders);
        format!(
            "INSERT INTO ?.? ({}) VALUES {}",
            placeholders,
            vec![tuple.as_str(); rows].join(", ")
        )
    }
}

#[async_trait]
impl Warehouse for ClickHouseWarehouse {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool> {
        self.exists("EXISTS DATABASE ?", &[dataset]).await
    }

    async fn create_dataset(&self, dataset: &str) -> Result<()> {
        self.ddl(
            "CREATE DATABASE IF NOT EXISTS ?",
            &[dataset],
            "Creating database failed",
        )
        .await?;

        tracing::info!("Created database {}", dataset);
        Ok(())
    }

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool> {
        self.exists("EXISTS TABLE ?.?", &[dataset, table]).await
    }

    async fn create_table(&self, dataset: &str, table: &str, schema: &TableSchema) -> Result<()> {
        if schema.is_empty() {
            return Err(EtlError::Load(format!(
                "Cannot create {}.{} without columns",
                dataset, table
            )));
        }

        let columns = schema
            .fields()
            .iter()
            .map(|f| format!("? {}", column_type(f.field_type)))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS ?.? ({}) ENGINE = MergeTree ORDER BY tuple()",
            columns
        );

        let mut query = self
            .client
            .query(&sql)
            .bind(Identifier(dataset))
            .bind(Identifier(table));
        for field in schema.fields() {
            query = query.bind(Identifier(&field.name));
        }

        query
            .execute()
            .await
            .map_err(|e| load_error("Creating table failed", e))?;

        tracing::info!("Created table {}.{} with {} columns", dataset, table, schema.len());
        Ok(())
    }

    async fn replace_rows(&self, dataset: &str, table: &str, batch: &LoadBatch) -> Result<u64> {
        let staging = staging_table(table);

        self.drop_table(dataset, &staging).await?;
        self.ddl(
            "CREATE TABLE ?.? AS ?.?",
            &[dataset, &staging, dataset, table],
            "Creating staging table failed",
        )
        .await?;

        let written = match self.insert_rows(dataset, &staging, batch).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = self.drop_table(dataset, &staging).await {
                    tracing::warn!("Could not drop {}.{}: {}", dataset, staging, cleanup);
                }
                return Err(e);
            }
        };

        self.ddl(
            "EXCHANGE TABLES ?.? AND ?.?",
            &[dataset, table, dataset, &staging],
            "Swapping in replacement rows failed",
        )
        .await?;

        // The staging table now holds the previous rows.
        if let Err(e) = self.drop_table(dataset, &staging).await {
            tracing::warn!("Could not drop {}.{}: {}", dataset, staging, e);
        }

        tracing::debug!("Replaced {}.{} with {} rows", dataset, table, written);
        Ok(written)
    }

    async fn insert_rows(&self, dataset: &str, table: &str, batch: &LoadBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut written = 0u64;
        for chunk in batch.rows.chunks(INSERT_CHUNK_ROWS) {
            let sql = Self::insert_sql(batch.fields.len(), chunk.len());

            let mut query = self
                .client
                .query(&sql)
                .bind(Identifier(dataset))
                .bind(Identifier(table));
            for name in batch.column_names() {
                query = query.bind(Identifier(name));
            }

            for row in chunk {
                for (value, field) in row.iter().zip(&batch.fields) {
                    query = match Cell::coerce(value, field.field_type) {
                        Cell::Null => query.bind(Option::<u8>::None),
                        Cell::Bool(b) => query.bind(b),
                        Cell::Int(i) => query.bind(i),
                        Cell::Float(f) => query.bind(f),
                        Cell::Text(s) => query.bind(s),
                    };
                }
            }

            query
                .execute()
                .await
                .map_err(|e| load_error("Insert failed", e))?;
            written += chunk.len() as u64;
        }

        tracing::debug!("Inserted {} rows into {}.{}", written, dataset, table);
        Ok(written)
    }

    async fn row_count(&self, dataset: &str, table: &str) -> Result<u64> {
        self.client
            .query("SELECT count() FROM ?.?")
            .bind(Identifier(dataset))
            .bind(Identifier(table))
            .fetch_one::<u64>()
            .await
            .map_err(|e| load_error("Counting rows failed", e))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let mut request = self
            .http
            .post(&self.config.url)
            .query(&[("database", self.config.database.as_str())])
            .body(sql.to_string());

        if let Some(username) = &self.config.username {
            request = request.header("X-ClickHouse-User", username);
        }
        if let Some(password) = &self.config.password {
            request = request.header("X-ClickHouse-Key", password);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EtlError::QueryExecution(format!("ClickHouse request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(EtlError::QueryExecution(format!(
            "ClickHouse returned {}: {}",
            status,
            body.trim()
        )))
    }
}
