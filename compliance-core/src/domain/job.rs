//! Compliance job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownStatus;

/// One evaluation run of a benchmark
///
/// Owns the runners built for the run and the summarizer that aggregates
/// their results. Only the scheduler mutates the status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceJob {
    pub id: Uuid,
    pub benchmark_id: String,
    pub status: ComplianceJobStatus,
    pub is_stack: bool,
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComplianceJob {
    /// Creates a job record in the `Created` state
    pub fn new(benchmark_id: impl Into<String>, is_stack: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            benchmark_id: benchmark_id.into(),
            status: ComplianceJobStatus::Created,
            is_stack,
            failure_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Compliance job status
///
/// Transitions only move forward: `Created` -> `SummarizerInProgress` ->
/// `Succeeded | Failed`. A job may also fail directly from `Created` when its
/// results never converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceJobStatus {
    Created,
    SummarizerInProgress,
    Succeeded,
    Failed,
}

impl ComplianceJobStatus {
    pub const ALL: [ComplianceJobStatus; 4] = [
        ComplianceJobStatus::Created,
        ComplianceJobStatus::SummarizerInProgress,
        ComplianceJobStatus::Succeeded,
        ComplianceJobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceJobStatus::Created => "Created",
            ComplianceJobStatus::SummarizerInProgress => "SummarizerInProgress",
            ComplianceJobStatus::Succeeded => "Succeeded",
            ComplianceJobStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ComplianceJobStatus::Succeeded | ComplianceJobStatus::Failed
        )
    }

    /// Whether moving from `self` to `next` respects the monotonic lifecycle
    pub fn can_transition_to(&self, next: ComplianceJobStatus) -> bool {
        use ComplianceJobStatus::*;
        matches!(
            (self, next),
            (Created, SummarizerInProgress)
                | (Created, Failed)
                | (SummarizerInProgress, Succeeded)
                | (SummarizerInProgress, Failed)
        )
    }
}

impl std::fmt::Display for ComplianceJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComplianceJobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(ComplianceJobStatus::Created),
            "SummarizerInProgress" => Ok(ComplianceJobStatus::SummarizerInProgress),
            "Succeeded" => Ok(ComplianceJobStatus::Succeeded),
            "Failed" => Ok(ComplianceJobStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
