use super::state::TransformState;
use crate::summary::GraphSummary;
use crate::validate::IssueLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterRole {
    Source,
    Sink,
}

/// A problem reported by one adapter during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterFailure {
    pub adapter: String,
    pub role: AdapterRole,
    pub message: String,
    /// False for record-level problems and for tolerated source failures
    pub fatal: bool,
}

impl AdapterFailure {
    pub fn source(adapter: impl Into<String>, message: impl std::fmt::Display, fatal: bool) -> Self {
        Self {
            adapter: adapter.into(),
            role: AdapterRole::Source,
            message: message.to_string(),
            fatal,
        }
    }

    pub fn sink(adapter: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            adapter: adapter.into(),
            role: AdapterRole::Sink,
            message: message.to_string(),
            fatal: true,
        }
    }
}

/// Everything a finished run has to say about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformReport {
    /// Terminal state of the run
    pub state: TransformState,
    /// Why the run failed, when it did
    pub error: Option<String>,
    pub summary: GraphSummary,
    pub issues: IssueLog,
    pub failures: Vec<AdapterFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TransformReport {
    pub fn is_success(&self) -> bool {
        self.state == TransformState::Done
    }

    pub fn fatal_failures(&self) -> impl Iterator<Item = &AdapterFailure> {
        self.failures.iter().filter(|f| f.fatal)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
