//! Runner Service
//!
//! Business logic for runner dispatch and worker reports.

use chrono::Utc;
use compliance_core::domain::runner::{ComplianceRunner, RunnerStatus};
use compliance_core::dto::runner::{RunnerJob, RunnerResult};
use uuid::Uuid;

use super::{PassOutcome, ServiceContext};
use crate::store::StoreError;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("runner not found: {0}")]
    NotFound(Uuid),

    #[error("runner {id} cannot report status {status}")]
    InvalidReport { id: Uuid, status: RunnerStatus },

    #[error("failed to serialize runner job: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Produce a batch of `Created` runners to the runner topic
///
/// Each runner is keyed `job-<id>-<retry>`. A produce failure marks that
/// runner `Failed`; the retry pass resets it later.
pub async fn enqueue_runners(ctx: &ServiceContext) -> Result<PassOutcome> {
    let runners = ctx
        .store
        .list_runners_by_status(RunnerStatus::Created, ctx.config.runner_dispatch_batch)
        .await?;

    let mut outcome = PassOutcome::default();
    for runner in &runners {
        let job = RunnerJob::from(runner);
        let key = job.idempotency_key();
        let payload = serde_json::to_value(&job)?;

        match ctx.queue.produce(&ctx.config.runner_topic, payload, &key).await {
            Ok(_) => {
                ctx.store
                    .update_runner_status(runner.id, RunnerStatus::Queued, None)
                    .await?;
                outcome.processed += 1;
            }
            Err(e) => {
                tracing::warn!(runner_id = %runner.id, error = %e, "Failed to enqueue runner");
                ctx.store
                    .update_runner_status(runner.id, RunnerStatus::Failed, Some(&e.to_string()))
                    .await?;
                outcome.failures += 1;
            }
        }
    }

    if !runners.is_empty() {
        tracing::info!(
            queued = outcome.processed,
            failed = outcome.failures,
            "Enqueued runners"
        );
    }

    Ok(outcome)
}

/// Apply a status report from a runner worker
///
/// Reports for runners that already finished are ignored, since the queue
/// may deliver a runner more than once. Workers may only report progress
/// or a final status.
pub async fn handle_runner_result(
    ctx: &ServiceContext,
    id: Uuid,
    result: RunnerResult,
) -> Result<ComplianceRunner> {
    let runner = ctx
        .store
        .get_runner(id)
        .await?
        .ok_or(RunnerError::NotFound(id))?;

    if runner.status.is_terminal() {
        tracing::debug!(runner_id = %id, status = %runner.status, "Ignoring late runner report");
        return Ok(runner);
    }

    if matches!(result.status, RunnerStatus::Created | RunnerStatus::Queued) {
        return Err(RunnerError::InvalidReport {
            id,
            status: result.status,
        });
    }

    ctx.store
        .update_runner_result(
            id,
            result.status,
            result.failure_message.as_deref(),
            result.total_findings_count,
        )
        .await?;

    tracing::debug!(runner_id = %id, status = %result.status, "Runner reported");

    ctx.store
        .get_runner(id)
        .await?
        .ok_or(RunnerError::NotFound(id))
}

/// Time out runners that made no progress within the configured timeout
pub async fn timeout_runners(ctx: &ServiceContext) -> Result<u64> {
    let timeout =
        chrono::Duration::from_std(ctx.config.runner_timeout).unwrap_or(chrono::Duration::MAX);
    let count = ctx.store.timeout_runners(Utc::now() - timeout).await?;

    if count > 0 {
        tracing::warn!("Timed out {} runner(s)", count);
    }

    Ok(count)
}

pub async fn retry_failed_runners(ctx: &ServiceContext) -> Result<u64> {
    let count = ctx
        .store
        .retry_failed_runners(ctx.config.max_runner_retries)
        .await?;

    if count > 0 {
        tracing::info!("Scheduled {} failed runner(s) for retry", count);
    }

    Ok(count)
}
