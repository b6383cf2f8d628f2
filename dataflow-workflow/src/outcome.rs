use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which registry rows a pass should consider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TaskSelection {
    #[default]
    All,
    Named(BTreeSet<String>),
}

impl TaskSelection {
    /// Build a selection from a list of names. `None` or a list without any
    /// non-blank name selects everything.
    pub fn from_names<I, S>(names: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: BTreeSet<String> = names
            .into_iter()
            .flatten()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        if names.is_empty() {
            TaskSelection::All
        } else {
            TaskSelection::Named(names)
        }
    }

    pub fn includes(&self, name: &str) -> bool {
        match self {
            TaskSelection::All => true,
            TaskSelection::Named(names) => names.contains(name.trim()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Sources,
    Queries,
}

/// Result of one task or saved query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOutcome {
    pub name: String,
    pub success: bool,
    pub rows_fetched: Option<usize>,
    pub rows_loaded: Option<u64>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn loaded(name: impl Into<String>, rows_fetched: usize, rows_loaded: u64) -> Self {
        Self {
            name: name.into(),
            success: true,
            rows_fetched: Some(rows_fetched),
            rows_loaded: Some(rows_loaded),
            error: None,
        }
    }

    pub fn completed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            rows_fetched: None,
            rows_loaded: None,
            error: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: String) -> Self {
        Self {
            name: name.into(),
            success: false,
            rows_fetched: None,
            rows_loaded: None,
            error: Some(error),
        }
    }
}

/// Per-task outcomes of one pass. A pass succeeds task by task; one
/// failure never hides the others.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub pass: Pass,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<TaskOutcome>,
    /// Set when the pass stopped dispatching early.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn new(pass: Pass) -> Self {
        let now = Utc::now();
        Self {
            pass,
            started_at: now,
            finished_at: now,
            outcomes: Vec::new(),
            cancelled: false,
        }
    }

    pub fn push(&mut self, outcome: TaskOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn all_succeeded(&self) -> bool {
        !self.cancelled && self.outcomes.iter().all(|o| o.success)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} succeeded, {} failed",
            self.succeeded().count(),
            self.outcomes.len(),
            self.failed().count()
        )
    }
}
