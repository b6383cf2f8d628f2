use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EtlError, Result};
use super::task::is_affirmative;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub query_name: String,
    pub query_text: String,
    pub active: bool,
}

/// One row of the saved-query registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRow {
    #[serde(default, deserialize_with = "crate::domain::task::cell")]
    pub task_name: String,
    #[serde(default, deserialize_with = "crate::domain::task::cell")]
    pub query_name: String,
    #[serde(default, deserialize_with = "crate::domain::task::cell")]
    pub query_text: String,
    #[serde(default, deserialize_with = "crate::domain::task::cell")]
    pub active_flag: String,
}

impl QueryRow {
    pub fn from_record(record: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    /// Rows are keyed by `task_name`; sheets that carry a `query_name`
    /// column instead are still accepted.
    pub fn name(&self) -> &str {
        if self.task_name.trim().is_empty() {
            self.query_name.trim()
        } else {
            self.task_name.trim()
        }
    }

    pub fn is_active(&self) -> bool {
        is_affirmative(&self.active_flag)
    }

    pub fn to_descriptor(&self) -> Result<QueryDescriptor> {
        if self.query_text.trim().is_empty() {
            return Err(EtlError::Configuration(format!(
                "Query {} has no query text",
                self.name()
            )));
        }

        Ok(QueryDescriptor {
            query_name: self.name().to_string(),
            query_text: self.query_text.clone(),
            active: self.is_active(),
        })
    }
}
