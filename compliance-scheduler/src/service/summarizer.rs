//! Summarizer Service
//!
//! Lifecycle of the aggregation job that turns per-control results into a
//! benchmark summary, and the final verdict on the owning compliance job.

use chrono::Utc;
use compliance_core::domain::job::{ComplianceJob, ComplianceJobStatus};
use compliance_core::domain::summarizer::{ComplianceSummarizer, SummarizerStatus};
use compliance_core::dto::summarizer::{SummarizerJob, SummarizerResult};
use uuid::Uuid;

use super::{PassOutcome, ServiceContext};
use crate::gateway::QueueError;
use crate::store::StoreError;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("summarizer not found: {0}")]
    NotFound(Uuid),

    #[error("compliance job {0} is not waiting for a summarizer")]
    JobNotReady(Uuid),

    #[error("summarizer {id} cannot report status {status}")]
    InvalidReport { id: Uuid, status: SummarizerStatus },

    #[error("failed to dispatch summarizer: {0}")]
    Queue(#[from] QueueError),

    #[error("failed to serialize summarizer job: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SummarizerError>;

/// Create a summarizer and hand its job over to the summarization stage
///
/// With `job_id` the summarizer is stored together with the job's move to
/// `SummarizerInProgress`; a job that already moved on gets no second
/// summarizer. Without `job_id` the summarizer runs ad hoc and no job is
/// touched.
pub async fn create_summarizer(
    ctx: &ServiceContext,
    benchmark_id: &str,
    job_id: Option<Uuid>,
) -> Result<ComplianceSummarizer> {
    let summarizer = ComplianceSummarizer::new(benchmark_id, job_id);

    match job_id {
        Some(job_id) => {
            if !ctx.store.start_job_summarizer(job_id, &summarizer).await? {
                return Err(SummarizerError::JobNotReady(job_id));
            }
        }
        None => ctx.store.create_summarizer(&summarizer).await?,
    }

    tracing::info!(
        summarizer_id = %summarizer.id,
        benchmark_id,
        job_id = ?job_id,
        "Created summarizer"
    );

    Ok(summarizer)
}

/// Produce the summarizer task to the queue
///
/// A failed produce marks the summarizer `Failed`; the retry pass picks it
/// up with a new retry count and therefore a new idempotency key.
pub async fn trigger_summarizer(ctx: &ServiceContext, summarizer: &ComplianceSummarizer) -> Result<()> {
    let job = SummarizerJob::from(summarizer);
    let key = job.idempotency_key();
    let payload = serde_json::to_value(&job)?;

    match ctx
        .queue
        .produce(&ctx.config.summarizer_topic, payload, &key)
        .await
    {
        Ok(outcome) => {
            ctx.store
                .update_summarizer_status(summarizer.id, SummarizerStatus::InProgress, None)
                .await?;
            tracing::info!(summarizer_id = %summarizer.id, key = %key, ?outcome, "Summarizer dispatched");
            Ok(())
        }
        Err(e) => {
            let message = e.to_string();
            ctx.store
                .update_summarizer_status(summarizer.id, SummarizerStatus::Failed, Some(&message))
                .await?;
            tracing::warn!(summarizer_id = %summarizer.id, error = %message, "Summarizer dispatch failed");
            Err(e.into())
        }
    }
}

/// Dispatch every summarizer waiting in `Created`
pub async fn trigger_pending_summarizers(ctx: &ServiceContext) -> Result<PassOutcome> {
    let pending = ctx
        .store
        .list_summarizers_by_status(SummarizerStatus::Created)
        .await?;

    let mut outcome = PassOutcome::default();
    for summarizer in &pending {
        match trigger_summarizer(ctx, summarizer).await {
            Ok(()) => outcome.processed += 1,
            Err(e) => {
                tracing::error!(summarizer_id = %summarizer.id, error = %e, "Failed to trigger summarizer");
                outcome.failures += 1;
            }
        }
    }

    Ok(outcome)
}

pub async fn retry_failed_summarizers(ctx: &ServiceContext) -> Result<u64> {
    let count = ctx
        .store
        .retry_failed_summarizers(ctx.config.max_summarizer_retries)
        .await?;

    if count > 0 {
        tracing::info!("Scheduled {} failed summarizer(s) for retry", count);
    }

    Ok(count)
}

/// Fail summarizers that made no progress within the configured timeout
pub async fn timeout_summarizers(ctx: &ServiceContext) -> Result<u64> {
    let timeout = chrono::Duration::from_std(ctx.config.summarizer_timeout)
        .unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now() - timeout;
    let count = ctx.store.timeout_summarizers(cutoff).await?;

    if count > 0 {
        tracing::warn!("Timed out {} summarizer(s)", count);
    }

    Ok(count)
}

/// Apply a status report from a summarizer worker
///
/// Reports for summarizers that already finished are ignored, since the
/// queue may deliver a task more than once.
pub async fn handle_summarizer_result(
    ctx: &ServiceContext,
    id: Uuid,
    result: SummarizerResult,
) -> Result<ComplianceSummarizer> {
    let summarizer = ctx
        .store
        .get_summarizer(id)
        .await?
        .ok_or(SummarizerError::NotFound(id))?;

    if summarizer.status.is_terminal() {
        tracing::debug!(summarizer_id = %id, status = %summarizer.status, "Ignoring late summarizer report");
        return Ok(summarizer);
    }

    if result.status == SummarizerStatus::Created {
        return Err(SummarizerError::InvalidReport {
            id,
            status: result.status,
        });
    }

    ctx.store
        .update_summarizer_status(id, result.status, result.failure_message.as_deref())
        .await?;

    ctx.store
        .get_summarizer(id)
        .await?
        .ok_or(SummarizerError::NotFound(id))
}

/// Decide the final status of a job from its runners and summarizers
///
/// The job fails when any runner or summarizer under it failed; a timed out
/// runner counts as failed.
pub async fn finish_compliance_job(
    ctx: &ServiceContext,
    job: &ComplianceJob,
) -> Result<ComplianceJobStatus> {
    let runners = ctx.store.list_runners_of_job(job.id).await?;
    let summarizers = ctx.store.list_summarizers_of_job(job.id).await?;

    let failed_runners = runners.iter().filter(|r| r.status.is_failure()).count();
    let failed_summarizers = summarizers
        .iter()
        .filter(|s| s.status == SummarizerStatus::Failed)
        .count();

    let message = failure_message(failed_runners, failed_summarizers);
    let status = if message.is_some() {
        ComplianceJobStatus::Failed
    } else {
        ComplianceJobStatus::Succeeded
    };

    let updated = ctx
        .store
        .update_job_status(job.id, status, message.as_deref())
        .await?;

    if updated {
        tracing::info!(job_id = %job.id, %status, message = ?message, "Compliance job finished");
    } else {
        tracing::warn!(job_id = %job.id, current = %job.status, "Compliance job could not be finished");
    }

    Ok(status)
}

fn failure_message(failed_runners: usize, failed_summarizers: usize) -> Option<String> {
    match (failed_runners, failed_summarizers) {
        (0, 0) => None,
        (r, 0) => Some(format!("{} runners failed", r)),
        (0, s) => Some(format!("{} summarizers failed", s)),
        (r, s) => Some(format!("{} runners failed, {} summarizers failed", r, s)),
    }
}

/// Finish jobs whose summarizers are all settled
///
/// A failed summarizer that will still be retried keeps its job open.
pub async fn finish_compliance_jobs(ctx: &ServiceContext) -> Result<PassOutcome> {
    let jobs = ctx
        .store
        .list_jobs_by_status(ComplianceJobStatus::SummarizerInProgress)
        .await?;
    let max_retries = ctx.config.max_summarizer_retries;

    let mut outcome = PassOutcome::default();
    for job in &jobs {
        let summarizers = ctx.store.list_summarizers_of_job(job.id).await?;
        let settled = summarizers.iter().all(|s| match s.status {
            SummarizerStatus::Succeeded => true,
            SummarizerStatus::Failed => s.retry_count >= max_retries,
            SummarizerStatus::Created | SummarizerStatus::InProgress => false,
        });
        if !settled {
            continue;
        }

        match finish_compliance_job(ctx, job).await {
            Ok(_) => outcome.processed += 1,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to finish compliance job");
                outcome.failures += 1;
            }
        }
    }

    Ok(outcome)
}
