//! Convergence Watcher
//!
//! Runner results reach the search index asynchronously. For every job whose
//! runners have all settled, compare how many result documents have sunk
//! with how many findings the runners reported, and decide whether to
//! summarize now, keep waiting, or give up on the job.

use std::time::Duration;

use chrono::Utc;
use compliance_client::ClientError;
use compliance_core::domain::job::{ComplianceJob, ComplianceJobStatus};

use super::summarizer::{self, SummarizerError};
use super::{PassOutcome, ServiceContext};
use crate::config::ConvergencePolicy;
use crate::store::StoreError;

/// Watcher error type
#[derive(Debug, thiserror::Error)]
pub enum ConvergenceError {
    #[error("failed to count sunk documents: {0}")]
    Search(#[from] ClientError),

    #[error(transparent)]
    Summarizer(#[from] SummarizerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ConvergenceError>;

/// What to do with a job whose runners have all settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Enough documents are visible; create the summarizer
    Proceed,
    /// Still indexing; check again on the next poll
    Wait,
    /// Documents never sank; fail the job
    GiveUp,
}

/// Decide from the sunk and expected document counts and the time since the
/// job's runners last changed
///
/// A partially sunk job past the give-up window fails even when most of its
/// documents arrived.
pub fn evaluate(policy: &ConvergencePolicy, sunk: i64, total: i64, age: Duration) -> Convergence {
    if sunk >= total {
        return Convergence::Proceed;
    }

    if age > policy.give_up_after {
        return Convergence::GiveUp;
    }

    let ratio = sunk as f64 / total as f64;
    if ratio >= policy.sink_ratio && age > policy.settle_after {
        return Convergence::Proceed;
    }

    Convergence::Wait
}

pub fn give_up_message(sunk: i64, total: i64) -> String {
    format!(
        "give up waiting for documents to sink, sankDocCount: {}, totalDocCount: {}",
        sunk, total
    )
}

/// Evaluate every job whose runners are complete
///
/// Search or store failures for one job are counted and retried on the
/// next poll; they do not affect the other jobs.
pub async fn check_jobs_converged(ctx: &ServiceContext) -> Result<PassOutcome> {
    let jobs = ctx
        .store
        .list_jobs_with_runners_completed(ctx.config.max_runner_retries)
        .await?;

    let mut outcome = PassOutcome::default();
    for job in &jobs {
        match check_job(ctx, job).await {
            Ok(Convergence::Wait) => {}
            Ok(_) => outcome.processed += 1,
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Convergence check failed");
                outcome.failures += 1;
            }
        }
    }

    Ok(outcome)
}

async fn check_job(ctx: &ServiceContext, job: &ComplianceJob) -> Result<Convergence> {
    let sunk = ctx
        .sinks
        .count_sunk_documents(&job.benchmark_id, job.id)
        .await?;
    let stats = ctx.store.runner_stats(job.id).await?;
    let total = stats.total_findings;

    let last_update = stats.last_updated_at.unwrap_or(job.updated_at);
    let age = Utc::now()
        .signed_duration_since(last_update)
        .to_std()
        .unwrap_or(Duration::ZERO);

    let decision = evaluate(&ctx.config.convergence, sunk, total, age);
    match decision {
        Convergence::Proceed => {
            tracing::info!(job_id = %job.id, sunk, total, "Results sunk, creating summarizer");
            summarizer::create_summarizer(ctx, &job.benchmark_id, Some(job.id)).await?;
        }
        Convergence::GiveUp => {
            let message = give_up_message(sunk, total);
            tracing::warn!(job_id = %job.id, sunk, total, "Giving up on compliance job");
            ctx.store
                .update_job_status(job.id, ComplianceJobStatus::Failed, Some(&message))
                .await?;
        }
        Convergence::Wait => {
            tracing::debug!(
                job_id = %job.id,
                sunk,
                total,
                age_secs = age.as_secs(),
                "Waiting for documents to sink"
            );
        }
    }

    Ok(decision)
}
