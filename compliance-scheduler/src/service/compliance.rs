//! Compliance Job Service
//!
//! Creates compliance jobs: resolves where a benchmark runs, builds its
//! runners and persists the job with its runners in one transaction. Also
//! decides which benchmarks are due on a scheduling tick.

use chrono::{DateTime, Utc};
use compliance_client::ClientError;
use compliance_core::domain::benchmark::BenchmarkAssignment;
use compliance_core::domain::job::ComplianceJob;
use compliance_core::dto::compliance::JobOverview;
use uuid::Uuid;

use super::ServiceContext;
use super::runner_builder::{self, BuildError};
use crate::config::Config;
use crate::store::StoreError;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    #[error("compliance job not found: {0}")]
    NotFound(Uuid),

    #[error("benchmark {0} has no connection or resource collection to run on")]
    NoTargets(String),

    #[error("failed to resolve assignments: {0}")]
    Assignments(#[from] ClientError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ComplianceError>;

/// Outcome of one scheduling pass
#[derive(Debug, Default)]
pub struct ScheduleOutcome {
    pub created: Vec<Uuid>,
    pub failures: u64,
}

/// Create a compliance job for `benchmark_id`
///
/// With `connection_ids` the run targets exactly those connections (ad hoc
/// trigger); otherwise the benchmark's assignment is used. Runners of
/// `last_job` are removed once that job has finished. Nothing is persisted
/// when building any runner fails.
pub async fn create_compliance_report_job(
    ctx: &ServiceContext,
    benchmark_id: &str,
    last_job: Option<&ComplianceJob>,
    connection_ids: Option<Vec<String>>,
) -> Result<Uuid> {
    let assignment = match connection_ids {
        Some(connection_ids) => BenchmarkAssignment {
            benchmark_id: benchmark_id.to_string(),
            connection_ids,
            resource_collection_ids: Vec::new(),
        },
        None => ctx.assignments.get_assignment(benchmark_id).await?,
    };

    if assignment.is_empty() {
        return Err(ComplianceError::NoTargets(benchmark_id.to_string()));
    }

    let job = ComplianceJob::new(benchmark_id, false);

    let targets = assignment
        .connection_ids
        .iter()
        .map(|id| (Some(id.as_str()), None))
        .chain(
            assignment
                .resource_collection_ids
                .iter()
                .map(|id| (None, Some(id.as_str()))),
        );

    let mut runners = Vec::new();
    for (connection_id, resource_collection_id) in targets {
        let built = runner_builder::build_runners(
            ctx.benchmarks.as_ref(),
            job.id,
            connection_id,
            resource_collection_id,
            benchmark_id,
            &[],
            benchmark_id,
        )
        .await?;
        runners.extend(built);
    }

    // Only the latest run's runners are kept for inspection
    if let Some(last) = last_job.filter(|j| j.status.is_terminal()) {
        let deleted = ctx.store.delete_runners_of_job(last.id).await?;
        if deleted > 0 {
            tracing::debug!(job_id = %last.id, deleted, "Deleted runners of previous job");
        }
    }

    ctx.store.create_job_with_runners(&job, &runners).await?;

    tracing::info!(
        job_id = %job.id,
        benchmark_id,
        runners = runners.len(),
        "Created compliance job"
    );

    Ok(job.id)
}

/// Whether a benchmark should get a new scheduled job
pub fn should_run_benchmark(
    config: &Config,
    last_job: Option<&ComplianceJob>,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_job else {
        return true;
    };

    let interval =
        chrono::Duration::from_std(config.benchmark_interval).unwrap_or(chrono::Duration::MAX);
    now.signed_duration_since(last.created_at) > interval
}

/// Create jobs for every assigned benchmark that is due
///
/// A failing benchmark is logged and counted; the others are still scheduled.
pub async fn schedule_due_benchmarks(ctx: &ServiceContext) -> Result<ScheduleOutcome> {
    let assignments = ctx.assignments.list_assignments().await?;
    let now = Utc::now();
    let mut outcome = ScheduleOutcome::default();

    for assignment in assignments {
        if assignment.is_empty() {
            continue;
        }

        let benchmark_id = assignment.benchmark_id.as_str();
        let result = schedule_benchmark(ctx, benchmark_id, now).await;

        match result {
            Ok(Some(job_id)) => outcome.created.push(job_id),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(benchmark_id, error = %e, "Failed to schedule benchmark");
                outcome.failures += 1;
            }
        }
    }

    Ok(outcome)
}

async fn schedule_benchmark(
    ctx: &ServiceContext,
    benchmark_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Uuid>> {
    let last_job = ctx.store.get_last_job(benchmark_id).await?;
    if !should_run_benchmark(&ctx.config, last_job.as_ref(), now) {
        tracing::debug!(benchmark_id, "Benchmark not due yet");
        return Ok(None);
    }

    let job_id = create_compliance_report_job(ctx, benchmark_id, last_job.as_ref(), None).await?;
    Ok(Some(job_id))
}

/// A job with its runner progress and summarizers
pub async fn get_job_overview(ctx: &ServiceContext, job_id: Uuid) -> Result<JobOverview> {
    let job = ctx
        .store
        .get_job(job_id)
        .await?
        .ok_or(ComplianceError::NotFound(job_id))?;
    let runners = ctx.store.list_runners_of_job(job_id).await?;
    let summarizers = ctx.store.list_summarizers_of_job(job_id).await?;

    Ok(JobOverview::new(job, &runners, summarizers))
}
