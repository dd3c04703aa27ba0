//! Store Module
//!
//! Persistence seam used by the services. [`PgStore`] delegates to the
//! repositories and owns the multi-statement transactions: creating a
//! compliance job together with its runners, and handing a job over to its
//! summarizer.

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compliance_core::domain::job::{ComplianceJob, ComplianceJobStatus};
use compliance_core::domain::runner::{ComplianceRunner, RunnerStatus};
use compliance_core::domain::sequencer::JobSequencer;
use compliance_core::domain::summarizer::{ComplianceSummarizer, SummarizerStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{
    job_repository, runner_repository, sequencer_repository, summarizer_repository,
};

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job {job_id} has more than one runner for the same query and target")]
    DuplicateRunner { job_id: Uuid },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Unique violations on the runner target index mean the batch repeats a target
fn runner_insert_error(job_id: Uuid, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::DuplicateRunner { job_id }
        }
        err => StoreError::Database(err),
    }
}

/// Aggregates of a job's runners used by the convergence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerStats {
    /// Sum of the findings reported by the runners
    pub total_findings: i64,
    /// Most recent update across the runners, if the job has any
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ComplianceStore: Send + Sync {
    // Compliance jobs

    /// Persist a job and all of its runners atomically
    async fn create_job_with_runners(
        &self,
        job: &ComplianceJob,
        runners: &[ComplianceRunner],
    ) -> Result<()>;
    async fn get_job(&self, id: Uuid) -> Result<Option<ComplianceJob>>;
    async fn get_last_job(&self, benchmark_id: &str) -> Result<Option<ComplianceJob>>;
    async fn list_jobs_by_status(&self, status: ComplianceJobStatus) -> Result<Vec<ComplianceJob>>;
    async fn list_jobs_with_runners_completed(&self, max_runner_retries: i32)
    -> Result<Vec<ComplianceJob>>;
    /// Returns false when the transition is not allowed from the current status
    async fn update_job_status(
        &self,
        id: Uuid,
        status: ComplianceJobStatus,
        failure_message: Option<&str>,
    ) -> Result<bool>;

    // Compliance runners

    async fn delete_runners_of_job(&self, job_id: Uuid) -> Result<u64>;
    async fn get_runner(&self, id: Uuid) -> Result<Option<ComplianceRunner>>;
    async fn list_runners_by_status(
        &self,
        status: RunnerStatus,
        limit: i64,
    ) -> Result<Vec<ComplianceRunner>>;
    async fn list_runners_of_job(&self, job_id: Uuid) -> Result<Vec<ComplianceRunner>>;
    async fn update_runner_status(
        &self,
        id: Uuid,
        status: RunnerStatus,
        failure_message: Option<&str>,
    ) -> Result<bool>;
    async fn update_runner_result(
        &self,
        id: Uuid,
        status: RunnerStatus,
        failure_message: Option<&str>,
        total_findings_count: Option<i64>,
    ) -> Result<bool>;
    async fn timeout_runners(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn retry_failed_runners(&self, max_retries: i32) -> Result<u64>;
    async fn runner_stats(&self, job_id: Uuid) -> Result<RunnerStats>;

    // Compliance summarizers

    async fn create_summarizer(&self, summarizer: &ComplianceSummarizer) -> Result<()>;
    /// Insert a job's summarizer and move the job to `SummarizerInProgress`
    /// together
    ///
    /// Returns false, persisting nothing, when the job is not in `Created`.
    async fn start_job_summarizer(
        &self,
        job_id: Uuid,
        summarizer: &ComplianceSummarizer,
    ) -> Result<bool>;
    async fn get_summarizer(&self, id: Uuid) -> Result<Option<ComplianceSummarizer>>;
    async fn list_summarizers_by_status(
        &self,
        status: SummarizerStatus,
    ) -> Result<Vec<ComplianceSummarizer>>;
    async fn list_summarizers_of_job(&self, job_id: Uuid) -> Result<Vec<ComplianceSummarizer>>;
    async fn update_summarizer_status(
        &self,
        id: Uuid,
        status: SummarizerStatus,
        failure_message: Option<&str>,
    ) -> Result<bool>;
    async fn timeout_summarizers(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn retry_failed_summarizers(&self, max_retries: i32) -> Result<u64>;

    // Job sequencers

    async fn create_sequencer(&self, sequencer: &JobSequencer) -> Result<()>;
    async fn list_waiting_sequencers(&self) -> Result<Vec<JobSequencer>>;
    async fn update_sequencer_failed(&self, id: Uuid) -> Result<bool>;
    async fn update_sequencer_finished(&self, id: Uuid, next_job_ids: &[Uuid]) -> Result<bool>;
    async fn list_undispatched_sequencers(&self) -> Result<Vec<JobSequencer>>;
    async fn mark_sequencer_dispatched(&self, id: Uuid) -> Result<bool>;
}

/// Postgres-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComplianceStore for PgStore {
    async fn create_job_with_runners(
        &self,
        job: &ComplianceJob,
        runners: &[ComplianceRunner],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        job_repository::insert(&mut tx, job).await?;
        runner_repository::insert_many(&mut tx, runners)
            .await
            .map_err(|e| runner_insert_error(job.id, e))?;

        // Dropping the transaction on an early return rolls it back
        tx.commit().await?;

        tracing::debug!(job_id = %job.id, runners = runners.len(), "Committed compliance job");
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ComplianceJob>> {
        Ok(job_repository::find_by_id(&self.pool, id).await?)
    }

    async fn get_last_job(&self, benchmark_id: &str) -> Result<Option<ComplianceJob>> {
        Ok(job_repository::find_latest_by_benchmark(&self.pool, benchmark_id).await?)
    }

    async fn list_jobs_by_status(&self, status: ComplianceJobStatus) -> Result<Vec<ComplianceJob>> {
        Ok(job_repository::find_by_status(&self.pool, status).await?)
    }

    async fn list_jobs_with_runners_completed(
        &self,
        max_runner_retries: i32,
    ) -> Result<Vec<ComplianceJob>> {
        Ok(job_repository::find_with_runners_completed(&self.pool, max_runner_retries).await?)
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        status: ComplianceJobStatus,
        failure_message: Option<&str>,
    ) -> Result<bool> {
        Ok(job_repository::update_status(&self.pool, id, status, failure_message).await?)
    }

    async fn delete_runners_of_job(&self, job_id: Uuid) -> Result<u64> {
        Ok(runner_repository::delete_by_job(&self.pool, job_id).await?)
    }

    async fn get_runner(&self, id: Uuid) -> Result<Option<ComplianceRunner>> {
        Ok(runner_repository::find_by_id(&self.pool, id).await?)
    }

    async fn list_runners_by_status(
        &self,
        status: RunnerStatus,
        limit: i64,
    ) -> Result<Vec<ComplianceRunner>> {
        Ok(runner_repository::find_by_status(&self.pool, status, limit).await?)
    }

    async fn list_runners_of_job(&self, job_id: Uuid) -> Result<Vec<ComplianceRunner>> {
        Ok(runner_repository::find_by_job(&self.pool, job_id).await?)
    }

    async fn update_runner_status(
        &self,
        id: Uuid,
        status: RunnerStatus,
        failure_message: Option<&str>,
    ) -> Result<bool> {
        Ok(runner_repository::update_status(&self.pool, id, status, failure_message).await?)
    }

    async fn update_runner_result(
        &self,
        id: Uuid,
        status: RunnerStatus,
        failure_message: Option<&str>,
        total_findings_count: Option<i64>,
    ) -> Result<bool> {
        Ok(runner_repository::update_result(
            &self.pool,
            id,
            status,
            failure_message,
            total_findings_count,
        )
        .await?)
    }

    async fn timeout_runners(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(runner_repository::mark_timed_out(&self.pool, cutoff).await?)
    }

    async fn retry_failed_runners(&self, max_retries: i32) -> Result<u64> {
        Ok(runner_repository::reset_failed_for_retry(&self.pool, max_retries).await?)
    }

    async fn runner_stats(&self, job_id: Uuid) -> Result<RunnerStats> {
        let (total_findings, last_updated_at) =
            runner_repository::job_stats(&self.pool, job_id).await?;
        Ok(RunnerStats {
            total_findings,
            last_updated_at,
        })
    }

    async fn create_summarizer(&self, summarizer: &ComplianceSummarizer) -> Result<()> {
        Ok(summarizer_repository::insert(&self.pool, summarizer).await?)
    }

    async fn start_job_summarizer(
        &self,
        job_id: Uuid,
        summarizer: &ComplianceSummarizer,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let moved = job_repository::update_status(
            &mut *tx,
            job_id,
            ComplianceJobStatus::SummarizerInProgress,
            None,
        )
        .await?;
        if !moved {
            return Ok(false);
        }

        summarizer_repository::insert(&mut *tx, summarizer).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn get_summarizer(&self, id: Uuid) -> Result<Option<ComplianceSummarizer>> {
        Ok(summarizer_repository::find_by_id(&self.pool, id).await?)
    }

    async fn list_summarizers_by_status(
        &self,
        status: SummarizerStatus,
    ) -> Result<Vec<ComplianceSummarizer>> {
        Ok(summarizer_repository::find_by_status(&self.pool, status).await?)
    }

    async fn list_summarizers_of_job(&self, job_id: Uuid) -> Result<Vec<ComplianceSummarizer>> {
        Ok(summarizer_repository::find_by_job(&self.pool, job_id).await?)
    }

    async fn update_summarizer_status(
        &self,
        id: Uuid,
        status: SummarizerStatus,
        failure_message: Option<&str>,
    ) -> Result<bool> {
        Ok(summarizer_repository::update_status(&self.pool, id, status, failure_message).await?)
    }

    async fn timeout_summarizers(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(summarizer_repository::mark_timed_out(&self.pool, cutoff).await?)
    }

    async fn retry_failed_summarizers(&self, max_retries: i32) -> Result<u64> {
        Ok(summarizer_repository::reset_failed_for_retry(&self.pool, max_retries).await?)
    }

    async fn create_sequencer(&self, sequencer: &JobSequencer) -> Result<()> {
        Ok(sequencer_repository::insert(&self.pool, sequencer).await?)
    }

    async fn list_waiting_sequencers(&self) -> Result<Vec<JobSequencer>> {
        Ok(sequencer_repository::find_waiting(&self.pool).await?)
    }

    async fn update_sequencer_failed(&self, id: Uuid) -> Result<bool> {
        Ok(sequencer_repository::update_failed(&self.pool, id).await?)
    }

    async fn update_sequencer_finished(&self, id: Uuid, next_job_ids: &[Uuid]) -> Result<bool> {
        Ok(sequencer_repository::update_finished(&self.pool, id, next_job_ids).await?)
    }

    async fn list_undispatched_sequencers(&self) -> Result<Vec<JobSequencer>> {
        Ok(sequencer_repository::find_undispatched(&self.pool).await?)
    }

    async fn mark_sequencer_dispatched(&self, id: Uuid) -> Result<bool> {
        Ok(sequencer_repository::mark_dispatched(&self.pool, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_insert_errors_stay_database_errors() {
        let err = runner_insert_error(Uuid::nil(), sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Database(sqlx::Error::PoolClosed)));
    }
}
