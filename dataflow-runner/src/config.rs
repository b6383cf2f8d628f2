use anyhow::{bail, Context as _, Result};
use config::{Config as ConfigLoader, Environment, File};
use dataflow_storage::ClickHouseConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "DATAFLOW";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory relative file sources resolve against
    pub data_path: PathBuf,

    /// Directory receiving one log file per run
    pub log_path: PathBuf,

    /// Default tracing directive when `RUST_LOG` is unset
    pub log_level: String,

    /// Chat webhook for notifications; notifications are only logged when unset
    pub webhook_url: Option<String>,

    pub http: HttpSettings,
    pub query_service: QueryServiceSettings,
    pub spreadsheet: SpreadsheetSettings,
    pub registry: RegistrySettings,
    pub clickhouse: ClickHouseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            log_path: PathBuf::from("logs"),
            log_level: "info".to_string(),
            webhook_url: None,
            http: HttpSettings::default(),
            query_service: QueryServiceSettings::default(),
            spreadsheet: SpreadsheetSettings::default(),
            registry: RegistrySettings::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryServiceSettings {
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    pub submit_attempts: u32,
    pub submit_backoff_secs: u64,
}

impl Default for QueryServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            poll_interval_secs: 1,
            max_wait_secs: 30 * 60,
            submit_attempts: 5,
            submit_backoff_secs: 1,
        }
    }
}

impl QueryServiceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn submit_backoff(&self) -> Duration {
        Duration::from_secs(self.submit_backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpreadsheetSettings {
    pub base_url: String,
    pub sheet_id: Option<String>,
    pub tasks_worksheet: String,
    pub queries_worksheet: String,
    pub service_account_path: Option<PathBuf>,
    /// Pre-issued bearer token, used when no service account is configured
    pub access_token: Option<String>,
    pub scopes: Vec<String>,
}

impl Default for SpreadsheetSettings {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com".to_string(),
            sheet_id: None,
            tasks_worksheet: dataflow_workflow::DEFAULT_TASKS_WORKSHEET.to_string(),
            queries_worksheet: dataflow_workflow::DEFAULT_QUERIES_WORKSHEET.to_string(),
            service_account_path: None,
            access_token: None,
            scopes: vec![
                "https://www.googleapis.com/auth/spreadsheets.readonly".to_string(),
            ],
        }
    }
}

/// Local CSV registry. Takes precedence over the spreadsheet registry when
/// both files are set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub tasks_csv: Option<PathBuf>,
    pub queries_csv: Option<PathBuf>,
}

impl RegistrySettings {
    pub fn csv_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tasks_csv, &self.queries_csv) {
            (Some(tasks), Some(queries)) => Some((tasks.as_path(), queries.as_path())),
            _ => None,
        }
    }
}

impl Config {
    /// Layer `config/default`, `config/local`, an optional explicit file and
    /// `DATAFLOW_*` environment variables, in that order. Nested keys use a
    /// double underscore, e.g. `DATAFLOW_QUERY_SERVICE__BASE_URL`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_url("query_service.base_url", &self.query_service.base_url)?;
        check_url("spreadsheet.base_url", &self.spreadsheet.base_url)?;
        check_url("clickhouse.url", &self.clickhouse.url)?;
        if let Some(webhook) = &self.webhook_url {
            check_url("webhook_url", webhook)?;
        }

        if self.query_service.submit_attempts == 0 {
            bail!("query_service.submit_attempts must be at least 1");
        }
        if self.query_service.max_wait_secs == 0 {
            bail!("query_service.max_wait_secs must be positive");
        }
        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be positive");
        }

        Ok(())
    }
}

fn check_url(key: &str, value: &str) -> Result<()> {
    url::Url::parse(value).with_context(|| format!("{} is not a valid URL: {}", key, value))?;
    Ok(())
}
