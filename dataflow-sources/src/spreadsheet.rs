//! Spreadsheet source
//!
//! Reads whole worksheets through the spreadsheet values API. The first row
//! of a worksheet is its header; every following row is one record.

use async_trait::async_trait;
use dataflow_core::{
    CredentialProvider, EtlError, Record, Result, SourceAdapter, SourceKind, SourceSpec,
    TabularResult,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::client::HttpClient;
use crate::config::SpreadsheetConfig;
use crate::error::{from_status, network_error};

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Client for one spreadsheet document.
#[derive(Clone)]
pub struct SheetsClient {
    http: HttpClient,
    config: SpreadsheetConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsClient")
            .field("config", &self.config)
            .finish()
    }
}

impl SheetsClient {
    pub fn new(
        http: HttpClient,
        config: SpreadsheetConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    fn values_url(&self, worksheet: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| EtlError::Configuration(format!("Invalid spreadsheet URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| EtlError::Configuration("Spreadsheet URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.config.sheet_id.as_str(), "values", worksheet]);

        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
            .append_pair("majorDimension", "ROWS");

        Ok(url)
    }

    /// Read every record of a worksheet.
    pub async fn read_records(&self, worksheet: &str) -> Result<TabularResult> {
        let url = self.values_url(worksheet)?;
        let token = self.credentials.access_token().await?;

        let response = self
            .http
            .get(url.as_str())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network_error("Spreadsheet", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.classify_failure(worksheet, status, &body));
        }

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| network_error("Spreadsheet", e))?;

        let result = records_from_values(range.values);
        info!(
            "Read {} records from worksheet {}",
            result.row_count(),
            worksheet
        );
        Ok(result)
    }

    /// A missing document answers 404; a missing worksheet makes the range
    /// unparseable, which the API reports as 400.
    fn classify_failure(&self, worksheet: &str, status: StatusCode, body: &str) -> EtlError {
        if status == StatusCode::NOT_FOUND {
            return EtlError::NotFound(format!(
                "Spreadsheet {} not found",
                self.config.sheet_id
            ));
        }

        if status == StatusCode::BAD_REQUEST && body.contains("Unable to parse range") {
            return EtlError::NotFound(format!(
                "Worksheet {} not found in spreadsheet {}",
                worksheet, self.config.sheet_id
            ));
        }

        from_status("Spreadsheet", status, body)
    }
}

/// Shape raw worksheet rows into records keyed by the header row. Short
/// rows are padded with empty strings and blank rows are dropped.
pub fn records_from_values(values: Vec<Vec<Value>>) -> TabularResult {
    let mut rows = values.into_iter();

    let headers: Vec<String> = match rows.next() {
        Some(header) => header
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        None => return TabularResult::default(),
    };

    let records: Vec<Record> = rows
        .filter(|row| row.iter().any(|v| !is_blank(v)))
        .map(|mut row| {
            row.resize(headers.len(), Value::String(String::new()));
            headers.iter().cloned().zip(row).collect()
        })
        .collect();

    if records.is_empty() {
        // Header-only worksheet: known columns, no records.
        return TabularResult::new(headers, Vec::new()).unwrap_or_default();
    }

    TabularResult::from_records(records)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// [`SourceAdapter`] for `spreadsheet` tasks.
#[derive(Debug, Clone)]
pub struct SpreadsheetAdapter {
    client: SheetsClient,
}

impl SpreadsheetAdapter {
    pub fn new(client: SheetsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for SpreadsheetAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Spreadsheet
    }

    async fn fetch(&self, source: &SourceSpec) -> Result<TabularResult> {
        match source {
            SourceSpec::Spreadsheet { worksheet_name } => {
                self.client.read_records(worksheet_name).await
            }
            other => Err(EtlError::Configuration(format!(
                "Spreadsheet adapter cannot fetch {} sources",
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
    fn test_records_from_values() {
        let result = records_from_values(vec![
            vec![json!("name"), json!("age"), json!("city")],
            vec![json!("ada"), json!(36)],
            vec![json!(""), json!("")],
            vec![json!("alan"), json!(41), json!("London")],
        ]);

        assert_eq!(result.columns(), ["name", "age", "city"]);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.rows()[0], vec![json!("ada"), json!(36), json!("")]);
    }

    #[test]
    fn test_header_only_worksheet() {
        let result = records_from_values(vec![vec![json!("a"), json!("b")]]);
        assert_eq!(result.columns(), ["a", "b"]);
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_empty_worksheet() {
        let result = records_from_values(vec![]);
        assert_eq!(result.column_count(), 0);
        assert_eq!(result.row_count(), 0);
    }
}
