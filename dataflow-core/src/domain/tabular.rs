use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EtlError, Result};

/// One record, keyed by column name.
pub type Record = Map<String, Value>;

/// Column-named, row-aligned result of a source fetch.
///
/// A fetch that produced no rows but knows its columns is represented as a
/// single row of empty strings, so that downstream schema handling always
/// sees the declared column set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TabularResult {
    /// Build a result from positional rows. Short rows are padded with nulls;
    /// rows wider than the column list are rejected.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = columns.len();
        let mut aligned = Vec::with_capacity(rows.len());

        for (idx, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(EtlError::InvalidData(format!(
                    "Row {} has {} values but only {} columns are declared",
                    idx,
                    row.len(),
                    width
                )));
            }
            row.resize(width, Value::Null);
            aligned.push(row);
        }

        Ok(Self {
            columns,
            rows: aligned,
        })
    }

    /// The "no data" convention: exactly one row of empty values.
    pub fn empty_with_columns(columns: Vec<String>) -> Self {
        let placeholder = vec![Value::String(String::new()); columns.len()];
        Self {
            columns,
            rows: vec![placeholder],
        }
    }

    /// Build a result from row objects. Column order follows first appearance
    /// across records; keys missing from a record become null.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Like [`TabularResult::from_records`], falling back to the placeholder
    /// row when there are no records.
    pub fn from_records_or_empty(columns: Vec<String>, records: Vec<Record>) -> Self {
        if records.is_empty() {
            Self::empty_with_columns(columns)
        } else {
            Self::from_records(records)
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// True when this is the single empty-row placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.rows.len() == 1
            && self.rows[0]
                .iter()
                .all(|v| matches!(v, Value::String(s) if s.is_empty()))
    }

    pub fn into_records(self) -> Vec<Record> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }
}
