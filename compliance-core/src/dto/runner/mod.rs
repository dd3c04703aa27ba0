//! Runner DTOs
//!
//! The task message produced for runner workers and the result they report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::runner::{Caller, ComplianceRunner, RunnerStatus};

/// Task message produced to the runner topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerJob {
    pub id: Uuid,
    pub retry_count: i32,
    pub parent_job_id: Uuid,
    pub benchmark_id: String,
    pub query_id: String,
    pub connection_id: Option<String>,
    pub resource_collection_id: Option<String>,
    pub callers: Vec<Caller>,
    pub created_at: DateTime<Utc>,
}

impl RunnerJob {
    pub fn idempotency_key(&self) -> String {
        super::idempotency_key(self.id, self.retry_count)
    }
}

impl From<&ComplianceRunner> for RunnerJob {
    fn from(runner: &ComplianceRunner) -> Self {
        Self {
            id: runner.id,
            retry_count: runner.retry_count,
            parent_job_id: runner.parent_job_id,
            benchmark_id: runner.benchmark_id.clone(),
            query_id: runner.query_id.clone(),
            connection_id: runner.connection_id.clone(),
            resource_collection_id: runner.resource_collection_id.clone(),
            callers: runner.callers.clone(),
            created_at: runner.created_at,
        }
    }
}

/// Status report sent by a runner worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResult {
    pub status: RunnerStatus,
    pub failure_message: Option<String>,
    pub total_findings_count: Option<i64>,
}
