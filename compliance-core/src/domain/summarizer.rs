//! Compliance summarizer domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownStatus;

/// Aggregation job turning per-control results into a benchmark summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceSummarizer {
    pub id: Uuid,
    pub benchmark_id: String,

    /// `None` for summarizers triggered ad hoc
    pub parent_job_id: Option<Uuid>,

    pub status: SummarizerStatus,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComplianceSummarizer {
    pub fn new(benchmark_id: impl Into<String>, parent_job_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            benchmark_id: benchmark_id.into(),
            parent_job_id,
            status: SummarizerStatus::Created,
            retry_count: 0,
            started_at: None,
            failure_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummarizerStatus {
    Created,
    InProgress,
    Succeeded,
    Failed,
}

impl SummarizerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummarizerStatus::Created => "Created",
            SummarizerStatus::InProgress => "InProgress",
            SummarizerStatus::Succeeded => "Succeeded",
            SummarizerStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SummarizerStatus::Succeeded | SummarizerStatus::Failed)
    }
}

impl std::fmt::Display for SummarizerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SummarizerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(SummarizerStatus::Created),
            "InProgress" => Ok(SummarizerStatus::InProgress),
            "Succeeded" => Ok(SummarizerStatus::Succeeded),
            "Failed" => Ok(SummarizerStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
