use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EtlError, Result};
use super::tabular::TabularResult;

// ===== Field Type =====

/// Column type as written in the task registry's schema cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
    Json,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Date => "DATE",
            FieldType::Json => "JSON",
        }
    }

    /// Best-effort type detection for a single cell. Nulls and empty strings
    /// carry no type information.
    pub fn infer(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(_) => Some(FieldType::Boolean),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(FieldType::Integer),
            serde_json::Value::Number(_) => Some(FieldType::Float),
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(_) => Some(FieldType::String),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Some(FieldType::Json),
        }
    }

    /// Widen two observed types into one that holds both.
    fn unify(self, other: FieldType) -> FieldType {
        match (self, other) {
            (a, b) if a == b => a,
            (FieldType::Integer, FieldType::Float) | (FieldType::Float, FieldType::Integer) => {
                FieldType::Float
            }
            _ => FieldType::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(FieldType::String),
            "INTEGER" | "INT64" | "INT" => Ok(FieldType::Integer),
            "FLOAT" | "FLOAT64" | "NUMERIC" | "DECIMAL" | "BIGNUMERIC" => Ok(FieldType::Float),
            "BOOLEAN" | "BOOL" => Ok(FieldType::Boolean),
            "TIMESTAMP" | "DATETIME" => Ok(FieldType::Timestamp),
            "DATE" => Ok(FieldType::Date),
            "JSON" => Ok(FieldType::Json),
            other => Err(EtlError::Configuration(format!(
                "Unknown field type: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

// ===== Schema =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered column declarations for a warehouse table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TableSchema {
    fields: Vec<SchemaField>,
}

impl TableSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    /// Parse the registry's JSON-encoded `[{name, type}, ...]` cell. A blank
    /// cell is an empty schema.
    pub fn from_json(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(raw)
            .map_err(|e| EtlError::Configuration(format!("Malformed schema: {}", e)))
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.field_type)
    }

    /// Declared fields first, then every result column the declaration does
    /// not cover, typed from the values it holds.
    pub fn merged_with(&self, result: &TabularResult) -> TableSchema {
        let mut fields = self.fields.clone();

        for (idx, column) in result.columns().iter().enumerate() {
            if self.field_type(column).is_some() {
                continue;
            }

            let inferred = result
                .rows()
                .iter()
                .filter_map(|row| row.get(idx).and_then(FieldType::infer))
                .reduce(FieldType::unify)
                .unwrap_or(FieldType::String);

            fields.push(SchemaField::new(column.clone(), inferred));
        }

        TableSchema { fields }
    }
}
