//! Wires configuration into a ready-to-run [`TaskOrchestrator`].

use anyhow::{bail, Context as _, Result};
use dataflow_core::{CredentialProvider, Notifier, TaskRegistry};
use dataflow_sources::{
    AdapterRegistry, ApiAdapter, ClientConfig, FileAdapter, FileSourceConfig, HttpClient,
    QueryServiceAdapter, QueryServiceConfig, ResultFetcher, ServiceAccountCredentials,
    SheetsClient, SpreadsheetAdapter, SpreadsheetConfig, StaticToken,
};
use dataflow_storage::{
    health_check, ClickHouseWarehouse, InMemoryWarehouse, QueryRunner, Warehouse,
    WarehouseLoader,
};
use dataflow_workflow::{
    CsvFileRegistry, LogNotifier, SpreadsheetRegistry, TaskOrchestrator, WebhookNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Load into an in-memory warehouse and only log notifications.
    pub dry_run: bool,
}

fn http_client(config: &Config) -> Result<HttpClient> {
    let client_config = ClientConfig::default()
        .with_timeout(Duration::from_secs(config.http.timeout_secs))
        .with_connect_timeout(Duration::from_secs(config.http.connect_timeout_secs));
    Ok(HttpClient::new(client_config)?)
}

fn sheets_client(config: &Config, http: &HttpClient) -> Result<Option<SheetsClient>> {
    let settings = &config.spreadsheet;
    let Some(sheet_id) = settings.sheet_id.as_deref() else {
        return Ok(None);
    };

    let credentials: Arc<dyn CredentialProvider> =
        match (&settings.service_account_path, &settings.access_token) {
            (Some(path), _) => Arc::new(
                ServiceAccountCredentials::from_file(path, settings.scopes.clone(), http.clone())
                    .with_context(|| {
                        format!("Failed to load service account from {}", path.display())
                    })?,
            ),
            (None, Some(token)) => Arc::new(StaticToken::new(token.clone())),
            (None, None) => bail!(
                "spreadsheet.sheet_id is set but neither service_account_path nor access_token is"
            ),
        };

    let sheets_config = SpreadsheetConfig::new(sheet_id).with_base_url(settings.base_url.clone());
    Ok(Some(SheetsClient::new(http.clone(), sheets_config, credentials)?))
}

fn adapters(
    config: &Config,
    http: &HttpClient,
    sheets: Option<&SheetsClient>,
    cancel: &CancellationToken,
) -> Result<AdapterRegistry> {
    let settings = &config.query_service;
    let fetcher = ResultFetcher::new(
        http.clone(),
        QueryServiceConfig::new(settings.base_url.clone())
            .with_poll_interval(settings.poll_interval())
            .with_max_wait(settings.max_wait())
            .with_submit_retry(settings.submit_attempts, settings.submit_backoff()),
    )?;

    let mut registry = AdapterRegistry::new()
        .with_adapter(Arc::new(
            QueryServiceAdapter::new(fetcher).with_cancellation(cancel.clone()),
        ))
        .with_adapter(Arc::new(FileAdapter::new(FileSourceConfig::new(
            config.data_path.clone(),
        ))))
        .with_adapter(Arc::new(ApiAdapter::new(http.clone())));

    if let Some(sheets) = sheets {
        registry.register(Arc::new(SpreadsheetAdapter::new(sheets.clone())));
    }

    Ok(registry)
}

fn task_registry(config: &Config, sheets: Option<&SheetsClient>) -> Result<Arc<dyn TaskRegistry>> {
    if let Some((tasks, queries)) = config.registry.csv_paths() {
        tracing::info!("Using CSV task registry {}", tasks.display());
        return Ok(Arc::new(CsvFileRegistry::new(tasks, queries)));
    }

    match sheets {
        Some(sheets) => {
            tracing::info!("Using spreadsheet task registry");
            Ok(Arc::new(SpreadsheetRegistry::new(sheets.clone()).with_worksheets(
                config.spreadsheet.tasks_worksheet.clone(),
                config.spreadsheet.queries_worksheet.clone(),
            )))
        }
        None => bail!(
            "No task registry configured: set spreadsheet.sheet_id or both registry.tasks_csv and registry.queries_csv"
        ),
    }
}

async fn warehouse(config: &Config, options: BuildOptions) -> Result<Arc<dyn Warehouse>> {
    if options.dry_run {
        tracing::warn!("Dry run: loading into an in-memory warehouse");
        return Ok(Arc::new(InMemoryWarehouse::new()));
    }

    let warehouse = ClickHouseWarehouse::new(&config.clickhouse)?;
    health_check(warehouse.client())
        .await
        .context("Warehouse is not reachable")?;
    Ok(Arc::new(warehouse))
}

fn notifier(config: &Config, http: &HttpClient, options: BuildOptions) -> Arc<dyn Notifier> {
    match (&config.webhook_url, options.dry_run) {
        (Some(url), false) => Arc::new(WebhookNotifier::new(http.clone(), url.clone())),
        _ => Arc::new(LogNotifier),
    }
}

pub async fn build(
    config: &Config,
    options: BuildOptions,
    cancel: CancellationToken,
) -> Result<TaskOrchestrator> {
    let http = http_client(config)?;
    let sheets = sheets_client(config, &http)?;

    let adapters = adapters(config, &http, sheets.as_ref(), &cancel)?;
    let registry = task_registry(config, sheets.as_ref())?;
    let warehouse = warehouse(config, options).await?;

    Ok(TaskOrchestrator::new(
        registry,
        adapters,
        WarehouseLoader::new(warehouse.clone()),
        QueryRunner::new(warehouse),
        notifier(config, &http, options),
    )
    .with_cancellation(cancel))
}
