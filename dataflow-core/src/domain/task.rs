use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{EtlError, Result};
use super::schema::TableSchema;

// ===== Source Kind =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    QueryService,
    Spreadsheet,
    File,
    Api,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::QueryService => "query_service",
            SourceKind::Spreadsheet => "spreadsheet",
            SourceKind::File => "file",
            SourceKind::Api => "api",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = EtlError;

    /// Registry tags, including the legacy spellings still found in registries
    /// (`redash`, `gsheet`, `csv`).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redash" | "query-service" | "query_service" => Ok(SourceKind::QueryService),
            "gsheet" | "spreadsheet" => Ok(SourceKind::Spreadsheet),
            "csv" | "file" => Ok(SourceKind::File),
            "api" => Ok(SourceKind::Api),
            _ => Err(EtlError::Configuration(format!("Unknown source type: {}", s))),
        }
    }
}

// ===== Source Spec =====

/// Source-specific inputs for one task, closed over the supported kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    QueryService {
        query_id: String,
        api_key: String,
        parameters: Map<String, Value>,
    },
    Spreadsheet {
        worksheet_name: String,
    },
    File {
        file_path: String,
    },
    Api {
        url: String,
        headers: BTreeMap<String, String>,
        query_params: BTreeMap<String, String>,
    },
}

impl SourceSpec {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceSpec::QueryService { .. } => SourceKind::QueryService,
            SourceSpec::Spreadsheet { .. } => SourceKind::Spreadsheet,
            SourceSpec::File { .. } => SourceKind::File,
            SourceSpec::Api { .. } => SourceKind::Api,
        }
    }

    /// Human-readable origin used in notifications.
    pub fn describe(&self) -> String {
        match self {
            SourceSpec::QueryService { query_id, .. } => format!("query service query {}", query_id),
            SourceSpec::Spreadsheet { worksheet_name } => format!("spreadsheet {}", worksheet_name),
            SourceSpec::File { file_path } => format!("file {}", file_path),
            SourceSpec::Api { url, .. } => format!("API {}", url),
        }
    }
}

// ===== Write Mode =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Append,
    Replace,
    /// Loaded as an append. Duplicate keys are not merged.
    Upsert,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Replace => "replace",
            WriteMode::Upsert => "upsert",
        }
    }

    pub fn truncates(&self) -> bool {
        matches!(self, WriteMode::Replace)
    }
}

impl Default for WriteMode {
    fn default() -> Self {
        WriteMode::Append
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "append" => Ok(WriteMode::Append),
            "replace" => Ok(WriteMode::Replace),
            "upsert" => Ok(WriteMode::Upsert),
            other => Err(EtlError::Configuration(format!("Unknown write mode: {}", other))),
        }
    }
}

// ===== Task Descriptor =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDescriptor {
    pub task_name: String,
    pub source: SourceSpec,
    pub dataset_id: String,
    pub table_id: String,
    pub write_mode: WriteMode,
    pub schema: TableSchema,
    pub active: bool,
}

// ===== Registry Row =====

/// One row of the task registry exactly as read, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRow {
    #[serde(default, deserialize_with = "cell")]
    pub task_name: String,
    #[serde(default, deserialize_with = "cell")]
    pub source_type: String,
    #[serde(default, deserialize_with = "cell")]
    pub dataset: String,
    #[serde(default, deserialize_with = "cell")]
    pub table_name: String,
    #[serde(default, deserialize_with = "cell")]
    pub write_mode: String,
    #[serde(default, deserialize_with = "cell")]
    pub schema: String,
    #[serde(default, deserialize_with = "cell")]
    pub active_flag: String,
    #[serde(default, deserialize_with = "cell")]
    pub query_id: String,
    #[serde(default, deserialize_with = "cell")]
    pub api_key: String,
    #[serde(default, deserialize_with = "cell")]
    pub params: String,
    #[serde(default, deserialize_with = "cell")]
    pub worksheet_name: String,
    #[serde(default, deserialize_with = "cell")]
    pub file_path: String,
    #[serde(default, deserialize_with = "cell")]
    pub api_url: String,
    #[serde(default, deserialize_with = "cell")]
    pub headers: String,
}

impl TaskRow {
    pub fn from_record(record: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    pub fn is_active(&self) -> bool {
        is_affirmative(&self.active_flag)
    }

    /// Validate the row into a descriptor. Every failure here is a
    /// configuration error and happens before any I/O.
    pub fn to_descriptor(&self) -> Result<TaskDescriptor> {
        let kind: SourceKind = self.source_type.parse()?;

        let source = match kind {
            SourceKind::QueryService => SourceSpec::QueryService {
                query_id: required("query_id", &self.query_id)?,
                api_key: self.api_key.trim().to_string(),
                parameters: parse_loose_object(&self.params)?,
            },
            SourceKind::Spreadsheet => SourceSpec::Spreadsheet {
                worksheet_name: required("worksheet_name", &self.worksheet_name)?,
            },
            SourceKind::File => SourceSpec::File {
                file_path: required("file_path", &self.file_path)?,
            },
            SourceKind::Api => SourceSpec::Api {
                url: required("api_url", &self.api_url)?,
                headers: parse_string_map("headers", &self.headers)?,
                query_params: parse_string_map("params", &self.params)?,
            },
        };

        Ok(TaskDescriptor {
            task_name: self.task_name.clone(),
            source,
            dataset_id: required("dataset", &self.dataset)?,
            table_id: required("table_name", &self.table_name)?,
            write_mode: self.write_mode.parse()?,
            schema: TableSchema::from_json(&self.schema)?,
            active: self.is_active(),
        })
    }
}

// ===== Cell Helpers =====

/// Registry cells arrive as strings from sheets but as numbers or booleans
/// from typed sources; every cell is read back as text.
pub(crate) fn cell<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

pub fn is_affirmative(flag: &str) -> bool {
    matches!(
        flag.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "true" | "1"
    )
}

fn required(column: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EtlError::Configuration(format!(
            "Missing required column: {}",
            column
        )));
    }
    Ok(value.to_string())
}

/// Query parameters are often typed by hand with single quotes.
fn parse_loose_object(raw: &str) -> Result<Map<String, Value>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str::<Value>(&raw.replace('\'', "\"")) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(EtlError::Configuration(
            "Query parameters must be a JSON object".to_string(),
        )),
        Err(e) => Err(EtlError::Configuration(format!(
            "Malformed query parameters: {}",
            e
        ))),
    }
}

fn parse_string_map(column: &str, raw: &str) -> Result<BTreeMap<String, String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(BTreeMap::new());
    }

    let map = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(EtlError::Configuration(format!(
                "Column {} must be a JSON object",
                column
            )))
        }
        Err(e) => {
            return Err(EtlError::Configuration(format!(
                "Malformed {}: {}",
                column, e
            )))
        }
    };

    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}
