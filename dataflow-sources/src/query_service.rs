//! Query service client
//!
//! Executes a saved query on the query service and returns its result set.
//! The service runs queries as asynchronous jobs: a submission returns a job
//! id, the job is polled until it reaches a terminal status, and a
//! successful job points at the result set to download.
//!
//! Only the submission is retried. Polling is bounded by
//! [`QueryServiceConfig::max_wait`] and can be cancelled through a
//! [`CancellationToken`].

use async_trait::async_trait;
use backoff::backoff::Backoff;
use dataflow_core::{
    EtlError, JobHandle, JobStatus, Record, Result, SourceAdapter, SourceKind, SourceSpec,
    TabularResult,
};
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{join_url, HttpClient};
use crate::config::QueryServiceConfig;
use crate::error::{ensure_success, network_error};

// ===== Wire Types =====

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    apply_auto_limit: bool,
    id: Value,
    max_age: u64,
    parameters: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct JobEnvelope {
    job: JobPayload,
}

#[derive(Debug, Default, Deserialize)]
struct JobPayload {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    query_result_id: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

impl JobPayload {
    fn job_id(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The service reports "no error" as an empty string.
    fn error_text(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResultEnvelope {
    query_result: QueryResultPayload,
}

#[derive(Debug, Deserialize)]
struct QueryResultPayload {
    data: QueryResultData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResultData {
    #[serde(default)]
    rows: Vec<Record>,
    #[serde(default)]
    columns: Vec<ColumnPayload>,
}

#[derive(Debug, Deserialize)]
struct ColumnPayload {
    name: String,
}

impl QueryResultData {
    fn into_tabular(self) -> Result<TabularResult> {
        let columns: Vec<String> = self.columns.into_iter().map(|c| c.name).collect();

        if self.rows.is_empty() {
            return Ok(TabularResult::empty_with_columns(columns));
        }

        if columns.is_empty() {
            return Ok(TabularResult::from_records(self.rows));
        }

        let rows = self
            .rows
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|c| row.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        TabularResult::new(columns, rows)
    }
}

// ===== Retry Policy =====

/// Constant-interval policy that gives up after a fixed number of attempts.
#[derive(Debug, Clone)]
pub struct FixedRetry {
    interval: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl FixedRetry {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            interval,
            max_attempts,
            attempts: 0,
        }
    }
}

impl Backoff for FixedRetry {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            None
        } else {
            Some(self.interval)
        }
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

// ===== Result Fetcher =====

/// Runs saved queries on the query service and downloads their results.
#[derive(Debug, Clone)]
pub struct ResultFetcher {
    http: HttpClient,
    config: QueryServiceConfig,
}

impl ResultFetcher {
    pub fn new(http: HttpClient, config: QueryServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &QueryServiceConfig {
        &self.config
    }

    /// Execute a query and wait for its result, without external
    /// cancellation.
    pub async fn execute(
        &self,
        query_id: &str,
        api_key: &str,
        parameters: &Map<String, Value>,
    ) -> Result<TabularResult> {
        self.execute_with_cancel(query_id, api_key, parameters, &CancellationToken::new())
            .await
    }

    /// Execute a query, polling until the job finishes, `max_wait` elapses
    /// or `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        query_id: &str,
        api_key: &str,
        parameters: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<TabularResult> {
        let job = self.submit(query_id, api_key, parameters).await?;
        info!("Query {} submitted as job {}", query_id, job.job_id);

        let query_result_id = self.wait_for_job(job, api_key, cancel).await?;
        self.fetch_result(query_result_id, api_key).await
    }

    /// Submit the query for fresh execution, retrying transient failures
    /// with a fixed backoff.
    pub async fn submit(
        &self,
        query_id: &str,
        api_key: &str,
        parameters: &Map<String, Value>,
    ) -> Result<JobHandle> {
        let policy = FixedRetry::new(self.config.submit_attempts, self.config.submit_backoff);

        backoff::future::retry_notify(
            policy,
            move || async move {
                self.submit_once(query_id, api_key, parameters)
                    .await
                    .map_err(|e| {
                        if e.is_transient() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
            },
            |err: EtlError, wait: Duration| {
                warn!("Submitting query {} failed ({}), retrying in {:?}", query_id, err, wait);
            },
        )
        .await
    }

    async fn submit_once(
        &self,
        query_id: &str,
        api_key: &str,
        parameters: &Map<String, Value>,
    ) -> Result<JobHandle> {
        let url = join_url(
            &self.config.base_url,
            &format!("/api/queries/{}/results", query_id),
        );

        let id = query_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(query_id.to_string()));

        let body = SubmitRequest {
            apply_auto_limit: false,
            id,
            max_age: 0,
            parameters,
        };

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, format!("Key {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("Query service", e))?;

        let response = ensure_success("Query service", response).await?;
        let envelope: JobEnvelope = response
            .json()
            .await
            .map_err(|e| network_error("Query service", e))?;

        match (envelope.job.job_id(), envelope.job.error_text()) {
            (Some(job_id), _) => Ok(JobHandle::new(job_id)),
            (None, Some(error)) => Err(EtlError::QuerySubmission(error)),
            (None, None) => Err(EtlError::QuerySubmission(format!(
                "Query service returned neither a job id nor an error for query {}",
                query_id
            ))),
        }
    }

    /// Poll the job until it reaches a terminal status and return its result
    /// id. A failed or cancelled job is authoritative and is not retried.
    pub async fn wait_for_job(
        &self,
        mut job: JobHandle,
        api_key: &str,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let started = Instant::now();
        let url = join_url(&self.config.base_url, &format!("/api/jobs/{}", job.job_id));

        loop {
            if cancel.is_cancelled() {
                return Err(EtlError::Cancelled(format!("job {}", job.job_id)));
            }

            let payload = self.poll_once(&url, api_key).await?;
            let error = payload.error_text();
            let status = JobStatus::from_code(payload.status.unwrap_or_default());
            job.observe(status, payload.query_result_id, error);

            debug!("Job {} status {:?}", job.job_id, job.status);

            match job.status {
                JobStatus::Succeeded => {
                    return job.query_result_id.ok_or_else(|| {
                        EtlError::QueryExecution(format!(
                            "Job {} succeeded without a query result id",
                            job.job_id
                        ))
                    });
                }
                JobStatus::Failed | JobStatus::Cancelled => {
                    let message = job.error.clone().unwrap_or_else(|| {
                        format!("Job {} ended with status {:?}", job.job_id, job.status)
                    });
                    return Err(EtlError::QueryExecution(message));
                }
                JobStatus::Pending | JobStatus::Running => {}
            }

            if started.elapsed() >= self.config.max_wait {
                warn!(
                    "Job {} still {:?} after {:?}, giving up",
                    job.job_id, job.status, self.config.max_wait
                );
                return Err(EtlError::PollTimeout(self.config.max_wait));
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(EtlError::Cancelled(format!("job {}", job.job_id)));
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn poll_once(&self, url: &str, api_key: &str) -> Result<JobPayload> {
        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, format!("Key {}", api_key))
            .send()
            .await
            .map_err(|e| network_error("Query service job status", e))?;

        let response = ensure_success("Query service job status", response).await?;
        let envelope: JobEnvelope = response
            .json()
            .await
            .map_err(|e| network_error("Query service job status", e))?;

        Ok(envelope.job)
    }

    /// Download a finished result set.
    pub async fn fetch_result(&self, query_result_id: i64, api_key: &str) -> Result<TabularResult> {
        let url = join_url(
            &self.config.base_url,
            &format!("/api/query_results/{}", query_result_id),
        );

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, format!("Key {}", api_key))
            .send()
            .await
            .map_err(|e| network_error("Query service result", e))?;

        let response = ensure_success("Query service result", response).await?;
        let envelope: QueryResultEnvelope = response
            .json()
            .await
            .map_err(|e| network_error("Query service result", e))?;

        envelope.query_result.data.into_tabular()
    }
}

// ===== Adapter =====

/// [`SourceAdapter`] for `query_service` tasks.
#[derive(Debug, Clone)]
pub struct QueryServiceAdapter {
    fetcher: ResultFetcher,
    cancel: CancellationToken,
}

impl QueryServiceAdapter {
    pub fn new(fetcher: ResultFetcher) -> Self {
        Self {
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop in-flight polls when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl SourceAdapter for QueryServiceAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::QueryService
    }

    async fn fetch(&self, source: &SourceSpec) -> Result<TabularResult> {
        match source {
            SourceSpec::QueryService {
                query_id,
                api_key,
                parameters,
            } => {
                self.fetcher
                    .execute_with_cancel(query_id, api_key, parameters, &self.cancel)
                    .await
            }
            other => Err(EtlError::Configuration(format!(
                "Query service adapter cannot fetch {} sources",
                other.kind()
            ))),
        }
    }
}
