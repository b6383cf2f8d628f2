//! # Dataflow Sources
//!
//! Source adapters producing [`TabularResult`](dataflow_core::TabularResult)s
//! for the ETL orchestrator:
//!
//! - [`QueryServiceAdapter`]: saved queries on a Redash-style query service,
//!   executed through the submit / poll / fetch job protocol of
//!   [`ResultFetcher`]
//! - [`SpreadsheetAdapter`]: whole worksheets read through [`SheetsClient`]
//! - [`FileAdapter`]: delimited files under a data root
//! - [`ApiAdapter`]: JSON arrays returned by a plain GET
//!
//! ## Example
//!
//! ```no_run
//! use dataflow_sources::{ClientConfig, HttpClient, QueryServiceConfig, ResultFetcher};
//! use serde_json::Map;
//!
//! # async fn run() -> dataflow_core::Result<()> {
//! let http = HttpClient::new(ClientConfig::default())?;
//! let fetcher = ResultFetcher::new(http, QueryServiceConfig::new("https://redash.example.com"))?;
//!
//! let result = fetcher.execute("42", "api-key", &Map::new()).await?;
//! println!("{} rows", result.row_count());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod credentials;
mod error;
pub mod file;
pub mod query_service;
pub mod registry;
pub mod spreadsheet;

pub use api::ApiAdapter;
pub use client::HttpClient;
pub use config::{ClientConfig, FileSourceConfig, QueryServiceConfig, SpreadsheetConfig};
pub use credentials::{ServiceAccountCredentials, ServiceAccountKey, StaticToken};
pub use file::{read_delimited, read_delimited_raw, FileAdapter};
pub use query_service::{FixedRetry, QueryServiceAdapter, ResultFetcher};
pub use registry::AdapterRegistry;
pub use spreadsheet::{records_from_values, SheetsClient, SpreadsheetAdapter};
