//! Compliance runner domain model
//!
//! A runner is one physical execution of a query against a single connection
//! or resource collection. Several controls across a benchmark tree may share
//! the same query; each of them is recorded as a [`Caller`] of the runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownStatus;
use super::benchmark::Severity;

/// A scheduled query execution belonging to a compliance job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRunner {
    pub id: Uuid,

    /// Compliance job that owns this runner
    pub parent_job_id: Uuid,

    /// Root benchmark the job was created for
    pub benchmark_id: String,

    pub query_id: String,
    pub connection_id: Option<String>,
    pub resource_collection_id: Option<String>,

    pub status: RunnerStatus,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub failure_message: Option<String>,

    /// Number of findings the worker reported for this execution
    pub total_findings_count: Option<i64>,

    /// Every (benchmark path, control) pair this execution answers for
    pub callers: Vec<Caller>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComplianceRunner {
    /// Creates a runner in the `Created` state with no callers yet
    pub fn new(
        parent_job_id: Uuid,
        benchmark_id: impl Into<String>,
        query_id: impl Into<String>,
        connection_id: Option<String>,
        resource_collection_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_job_id,
            benchmark_id: benchmark_id.into(),
            query_id: query_id.into(),
            connection_id,
            resource_collection_id,
            status: RunnerStatus::Created,
            retry_count: 0,
            started_at: None,
            failure_message: None,
            total_findings_count: None,
            callers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Key identifying the execution target; unique within a job
    pub fn target_key(&self) -> (&str, Option<&str>, Option<&str>) {
        (
            self.query_id.as_str(),
            self.connection_id.as_deref(),
            self.resource_collection_id.as_deref(),
        )
    }

    /// Adds callers that are not yet attributed to this runner
    pub fn merge_callers(&mut self, callers: impl IntoIterator<Item = Caller>) {
        for caller in callers {
            if !self.callers.contains(&caller) {
                self.callers.push(caller);
            }
        }
    }
}

/// Attribution of a runner's result to a logical control
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub root_benchmark: String,

    /// Benchmarks between the root and the control, root first
    pub parent_benchmark_ids: Vec<String>,

    pub control_id: String,
    pub control_severity: Severity,
}

/// Status of a compliance runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerStatus {
    /// Persisted but not yet handed to the queue
    Created,

    /// Produced to the runner topic
    Queued,

    /// A worker picked it up
    InProgress,

    Succeeded,
    Failed,

    /// No worker report arrived within the runner timeout
    TimedOut,
}

impl RunnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerStatus::Created => "Created",
            RunnerStatus::Queued => "Queued",
            RunnerStatus::InProgress => "InProgress",
            RunnerStatus::Succeeded => "Succeeded",
            RunnerStatus::Failed => "Failed",
            RunnerStatus::TimedOut => "TimedOut",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunnerStatus::Succeeded | RunnerStatus::Failed | RunnerStatus::TimedOut
        )
    }

    /// Terminal states that count against the owning job
    pub fn is_failure(&self) -> bool {
        matches!(self, RunnerStatus::Failed | RunnerStatus::TimedOut)
    }
}

impl std::fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunnerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(RunnerStatus::Created),
            "Queued" => Ok(RunnerStatus::Queued),
            "InProgress" => Ok(RunnerStatus::InProgress),
            "Succeeded" => Ok(RunnerStatus::Succeeded),
            "Failed" => Ok(RunnerStatus::Failed),
            "TimedOut" => Ok(RunnerStatus::TimedOut),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(control: &str) -> Caller {
        Caller {
            root_benchmark: "root".to_string(),
            parent_benchmark_ids: vec!["root".to_string()],
            control_id: control.to_string(),
            control_severity: Severity::High,
        }
    }

    #[test]
    fn test_merge_callers_skips_duplicates() {
        let mut runner = ComplianceRunner::new(Uuid::new_v4(), "root", "q1", None, None);
        runner.merge_callers(vec![caller("c1")]);
        runner.merge_callers(vec![caller("c1"), caller("c2")]);

        assert_eq!(runner.callers, vec![caller("c1"), caller("c2")]);
    }

    #[test]
    fn test_timed_out_counts_as_failure() {
        assert!(RunnerStatus::TimedOut.is_terminal());
        assert!(RunnerStatus::TimedOut.is_failure());
        assert!(!RunnerStatus::Succeeded.is_failure());
        assert!(!RunnerStatus::Queued.is_terminal());
    }

    #[test]
    fn test_callers_serialize_as_tagged_records() {
        let json = serde_json::to_value(vec![caller("c1")]).unwrap();
        assert_eq!(json[0]["control_id"], "c1");
        assert_eq!(json[0]["control_severity"], "high");
    }
}
