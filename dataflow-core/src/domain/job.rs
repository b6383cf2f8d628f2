use serde::{Deserialize, Serialize};

// ===== Job Status =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Map the query service's numeric status. Codes other than the known
    /// terminal ones are treated as still in progress.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => JobStatus::Pending,
            3 => JobStatus::Succeeded,
            4 => JobStatus::Failed,
            5 => JobStatus::Cancelled,
            _ => JobStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

// ===== Job Handle =====

/// A submitted query-service job, advanced only by the polling loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub status: JobStatus,
    pub query_result_id: Option<i64>,
    pub error: Option<String>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            query_result_id: None,
            error: None,
        }
    }

    pub fn observe(&mut self, status: JobStatus, query_result_id: Option<i64>, error: Option<String>) {
        self.status = status;
        if query_result_id.is_some() {
            self.query_result_id = query_result_id;
        }
        if error.is_some() {
            self.error = error;
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
