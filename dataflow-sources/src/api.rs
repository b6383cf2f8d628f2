//! Generic HTTP API source

use async_trait::async_trait;
use dataflow_core::{
    EtlError, Record, Result, SourceAdapter, SourceKind, SourceSpec, TabularResult,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use crate::client::HttpClient;
use crate::error::{ensure_success, network_error};

/// [`SourceAdapter`] for `api` tasks: a single GET whose body is a JSON
/// array of row objects.
#[derive(Debug, Clone)]
pub struct ApiAdapter {
    http: HttpClient,
}

impl ApiAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn get_rows(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        query_params: &BTreeMap<String, String>,
    ) -> Result<TabularResult> {
        let mut request = self.http.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !query_params.is_empty() {
            request = request.query(query_params);
        }

        let response = request.send().await.map_err(|e| network_error("API", e))?;
        let response = ensure_success("API", response).await?;
        let body: Value = response.json().await.map_err(|e| network_error("API", e))?;

        let result = rows_from_body(url, body)?;
        info!("Fetched {} rows from {}", result.row_count(), url);
        Ok(result)
    }
}

fn rows_from_body(url: &str, body: Value) -> Result<TabularResult> {
    let items = match body {
        Value::Array(items) => items,
        other => {
            return Err(EtlError::SourceUnavailable(format!(
                "API {} returned {} instead of an array of rows",
                url,
                shape_of(&other)
            )))
        }
    };

    let records = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(EtlError::SourceUnavailable(format!(
                "API {} row {} is {} instead of an object",
                url,
                idx,
                shape_of(&other)
            ))),
        })
        .collect::<Result<Vec<Record>>>()?;

    Ok(TabularResult::from_records(records))
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl SourceAdapter for ApiAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn fetch(&self, source: &SourceSpec) -> Result<TabularResult> {
        match source {
            SourceSpec::Api {
                url,
                headers,
                query_params,
            } => self.get_rows(url, headers, query_params).await,
            other => Err(EtlError::Configuration(format!(
                "API adapter cannot fetch {} sources",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_from_array_body() {
        let result = rows_from_body(
            "http://api",
            json!([{"id": 1, "name": "a"}, {"id": 2, "extra": true}]),
        )
        .unwrap();

        assert_eq!(result.columns(), ["id", "name", "extra"]);
        assert_eq!(result.rows()[1], vec![json!(2), Value::Null, json!(true)]);
    }

    #[test]
    fn test_empty_array_has_no_rows() {
        let result = rows_from_body("http://api", json!([])).unwrap();
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.column_count(), 0);
    }

    #[test]
    fn test_object_body_is_rejected() {
        let err = rows_from_body("http://api", json!({"data": []})).unwrap_err();
        assert!(matches!(err, EtlError::SourceUnavailable(_)));
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn test_scalar_rows_are_rejected() {
        let err = rows_from_body("http://api", json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("row 0"));
    }
}
