//! Source configuration
//!
//! Connection settings for the HTTP-backed sources and the polling bounds
//! of the query service protocol.

use dataflow_core::{EtlError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by every HTTP client the sources build.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Enable request/response logging
    pub enable_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("dataflow/{}", env!("CARGO_PKG_VERSION")),
            enable_logging: false,
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(EtlError::Configuration(
                "Timeout cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Query service endpoint and job polling policy.
#[derive(Debug, Clone)]
pub struct QueryServiceConfig {
    /// Base URL of the query service, e.g. `https://redash.example.com`
    pub base_url: String,

    /// Delay between job status polls
    pub poll_interval: Duration,

    /// Upper bound on the total time spent polling one job
    pub max_wait: Duration,

    /// Total submission attempts, including the first
    pub submit_attempts: u32,

    /// Fixed delay between submission attempts
    pub submit_backoff: Duration,
}

impl Default for QueryServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(30 * 60),
            submit_attempts: 5,
            submit_backoff: Duration::from_secs(1),
        }
    }
}

impl QueryServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_submit_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.submit_attempts = attempts;
        self.submit_backoff = backoff;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_base_url(&self.base_url)?;

        if self.submit_attempts == 0 {
            return Err(EtlError::Configuration(
                "Submit attempts must be at least 1".to_string(),
            ));
        }

        if self.max_wait.is_zero() {
            return Err(EtlError::Configuration(
                "Maximum poll wait cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Spreadsheet document holding worksheets and registries.
#[derive(Debug, Clone)]
pub struct SpreadsheetConfig {
    /// Base URL of the values API
    pub base_url: String,

    /// Document key
    pub sheet_id: String,
}

impl SpreadsheetConfig {
    pub fn new(sheet_id: impl Into<String>) -> Self {
        Self {
            base_url: "https://sheets.googleapis.com".to_string(),
            sheet_id: sheet_id.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_base_url(&self.base_url)?;

        if self.sheet_id.trim().is_empty() {
            return Err(EtlError::Configuration(
                "Sheet id cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Local delimited files.
#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    /// Directory file paths are resolved against
    pub data_root: PathBuf,

    /// Field delimiter
    pub delimiter: u8,
}

impl FileSourceConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn validate_base_url(base_url: &str) -> Result<()> {
    if base_url.is_empty() {
        return Err(EtlError::Configuration(
            "Base URL cannot be empty".to_string(),
        ));
    }

    url::Url::parse(base_url)
        .map_err(|e| EtlError::Configuration(format!("Invalid URL {}: {}", base_url, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_service_config() {
        let config = QueryServiceConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.submit_attempts, 5);
        assert_eq!(config.submit_backoff, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(QueryServiceConfig::new("").validate().is_err());
        assert!(QueryServiceConfig::new("not a url").validate().is_err());
        assert!(QueryServiceConfig::new("https://redash.example.com")
            .with_submit_retry(0, Duration::from_secs(1))
            .validate()
            .is_err());
        assert!(SpreadsheetConfig::new("  ").validate().is_err());
    }
}
