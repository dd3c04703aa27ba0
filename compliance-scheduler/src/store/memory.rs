//! In-memory store for testing
//!
//! Mirrors the Postgres schema's guarantees that the services rely on: the
//! job + runners insert is all-or-nothing, runner targets are unique per
//! job, and job status updates respect the lifecycle.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compliance_core::domain::job::{ComplianceJob, ComplianceJobStatus};
use compliance_core::domain::runner::{ComplianceRunner, RunnerStatus};
use compliance_core::domain::sequencer::{JobSequencer, SequencerStatus};
use compliance_core::domain::summarizer::{ComplianceSummarizer, SummarizerStatus};
use uuid::Uuid;

use super::{ComplianceStore, Result, RunnerStats, StoreError};

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<Uuid, ComplianceJob>,
    runners: HashMap<Uuid, ComplianceRunner>,
    summarizers: HashMap<Uuid, ComplianceSummarizer>,
    sequencers: HashMap<Uuid, JobSequencer>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_runner_insert: Mutex<bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make job creations fail once the job and its runners were staged
    pub fn fail_runner_insert(&self, fail: bool) {
        *self.fail_runner_insert.lock().unwrap() = fail;
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn jobs(&self) -> Vec<ComplianceJob> {
        self.state().jobs.values().cloned().collect()
    }

    pub fn runners(&self) -> Vec<ComplianceRunner> {
        self.state().runners.values().cloned().collect()
    }

    pub fn summarizers(&self) -> Vec<ComplianceSummarizer> {
        self.state().summarizers.values().cloned().collect()
    }

    /// Insert a job without runners, bypassing the transactional path
    pub fn put_job(&self, job: ComplianceJob) {
        self.state().jobs.insert(job.id, job);
    }

    pub fn put_runner(&self, runner: ComplianceRunner) {
        self.state().runners.insert(runner.id, runner);
    }

    pub fn put_summarizer(&self, summarizer: ComplianceSummarizer) {
        self.state().summarizers.insert(summarizer.id, summarizer);
    }

    pub fn sequencer(&self, id: Uuid) -> Option<JobSequencer> {
        self.state().sequencers.get(&id).cloned()
    }
}

#[async_trait]
impl ComplianceStore for InMemoryStore {
    async fn create_job_with_runners(
        &self,
        job: &ComplianceJob,
        runners: &[ComplianceRunner],
    ) -> Result<()> {
        let fail_after_staging = *self.fail_runner_insert.lock().unwrap();
        let mut state = self.state();

        state.jobs.insert(job.id, job.clone());
        let mut staged = Vec::with_capacity(runners.len());
        let mut failure = None;

        for runner in runners {
            let duplicate = state.runners.values().any(|existing| {
                existing.parent_job_id == runner.parent_job_id
                    && existing.target_key() == runner.target_key()
            });
            if duplicate {
                failure = Some(StoreError::DuplicateRunner { job_id: job.id });
                break;
            }
            state.runners.insert(runner.id, runner.clone());
            staged.push(runner.id);
        }

        if failure.is_none() && fail_after_staging {
            failure = Some(StoreError::Database(sqlx::Error::PoolClosed));
        }

        // Roll back everything staged by this call
        if let Some(err) = failure {
            for id in staged {
                state.runners.remove(&id);
            }
            state.jobs.remove(&job.id);
            return Err(err);
        }

        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ComplianceJob>> {
        Ok(self.state().jobs.get(&id).cloned())
    }

    async fn get_last_job(&self, benchmark_id: &str) -> Result<Option<ComplianceJob>> {
        Ok(self
            .state()
            .jobs
            .values()
            .filter(|job| job.benchmark_id == benchmark_id)
            .max_by_key(|job| job.created_at)
            .cloned())
    }

    async fn list_jobs_by_status(&self, status: ComplianceJobStatus) -> Result<Vec<ComplianceJob>> {
        Ok(self
            .state()
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    async fn list_jobs_with_runners_completed(
        &self,
        max_runner_retries: i32,
    ) -> Result<Vec<ComplianceJob>> {
        let state = self.state();
        Ok(state
            .jobs
            .values()
            .filter(|job| job.status == ComplianceJobStatus::Created)
            .filter(|job| {
                state
                    .runners
                    .values()
                    .filter(|r| r.parent_job_id == job.id)
                    .all(|r| {
                        r.status.is_terminal()
                            && !(r.status.is_failure() && r.retry_count < max_runner_retries)
                    })
            })
            .cloned()
            .collect())
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        status: ComplianceJobStatus,
        failure_message: Option<&str>,
    ) -> Result<bool> {
        let mut state = self.state();
        match state.jobs.get_mut(&id) {
            Some(job) if job.status.can_transition_to(status) => {
                job.status = status;
                if let Some(message) = failure_message {
                    job.failure_message = Some(message.to_string());
                }
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_runners_of_job(&self, job_id: Uuid) -> Result<u64> {
        let mut state = self.state();
        let before = state.runners.len();
        state.runners.retain(|_, r| r.parent_job_id != job_id);
        Ok((before - state.runners.len()) as u64)
    }

    async fn get_runner(&self, id: Uuid) -> Result<Option<ComplianceRunner>> {
        Ok(self.state().runners.get(&id).cloned())
    }

    async fn list_runners_by_status(
        &self,
        status: RunnerStatus,
        limit: i64,
    ) -> Result<Vec<ComplianceRunner>> {
        let mut runners: Vec<_> = self
            .state()
            .runners
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        runners.sort_by_key(|r| r.created_at);
        runners.truncate(limit.max(0) as usize);
        Ok(runners)
    }

    async fn list_runners_of_job(&self, job_id: Uuid) -> Result<Vec<ComplianceRunner>> {
        Ok(self
            .state()
            .runners
            .values()
            .filter(|r| r.parent_job_id == job_id)
            .cloned()
            .collect())
    }

    async fn update_runner_status(
        &self,
        id: Uuid,
        status: RunnerStatus,
        failure_message: Option<&str>,
    ) -> Result<bool> {
        let mut state = self.state();
        let Some(runner) = state.runners.get_mut(&id) else {
            return Ok(false);
        };
        runner.status = status;
        runner.failure_message = failure_message.map(str::to_string);
        runner.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_runner_result(
        &self,
        id: Uuid,
        status: RunnerStatus,
        failure_message: Option<&str>,
        total_findings_count: Option<i64>,
    ) -> Result<bool> {
        let mut state = self.state();
        let Some(runner) = state.runners.get_mut(&id) else {
            return Ok(false);
        };
        let now = Utc::now();
        runner.status = status;
        runner.failure_message = failure_message.map(str::to_string);
        if total_findings_count.is_some() {
            runner.total_findings_count = total_findings_count;
        }
        runner.started_at.get_or_insert(now);
        runner.updated_at = now;
        Ok(true)
    }

    async fn timeout_runners(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut count = 0;
        for runner in self.state().runners.values_mut() {
            if matches!(runner.status, RunnerStatus::Queued | RunnerStatus::InProgress)
                && runner.updated_at < cutoff
            {
                runner.status = RunnerStatus::TimedOut;
                runner.failure_message = Some("runner timed out".to_string());
                runner.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn retry_failed_runners(&self, max_retries: i32) -> Result<u64> {
        let mut state = self.state();
        let open_jobs: HashSet<Uuid> = state
            .jobs
            .values()
            .filter(|job| job.status == ComplianceJobStatus::Created)
            .map(|job| job.id)
            .collect();

        let mut count = 0;
        for runner in state.runners.values_mut() {
            if runner.status.is_failure()
                && runner.retry_count < max_retries
                && open_jobs.contains(&runner.parent_job_id)
            {
                runner.status = RunnerStatus::Created;
                runner.retry_count += 1;
                runner.failure_message = None;
                runner.started_at = None;
                runner.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn runner_stats(&self, job_id: Uuid) -> Result<RunnerStats> {
        let state = self.state();
        let runners = state.runners.values().filter(|r| r.parent_job_id == job_id);

        let mut stats = RunnerStats {
            total_findings: 0,
            last_updated_at: None,
        };
        for runner in runners {
            stats.total_findings += runner.total_findings_count.unwrap_or(0);
            stats.last_updated_at = stats.last_updated_at.max(Some(runner.updated_at));
        }
        Ok(stats)
    }

    async fn create_summarizer(&self, summarizer: &ComplianceSummarizer) -> Result<()> {
        self.put_summarizer(summarizer.clone());
        Ok(())
    }

    async fn start_job_summarizer(
        &self,
        job_id: Uuid,
        summarizer: &ComplianceSummarizer,
    ) -> Result<bool> {
        let mut state = self.state();
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status.can_transition_to(ComplianceJobStatus::SummarizerInProgress) => {
                job.status = ComplianceJobStatus::SummarizerInProgress;
                job.updated_at = Utc::now();
            }
            _ => return Ok(false),
        }
        state.summarizers.insert(summarizer.id, summarizer.clone());
        Ok(true)
    }

    async fn get_summarizer(&self, id: Uuid) -> Result<Option<ComplianceSummarizer>> {
        Ok(self.state().summarizers.get(&id).cloned())
    }

    async fn list_summarizers_by_status(
        &self,
        status: SummarizerStatus,
    ) -> Result<Vec<ComplianceSummarizer>> {
        Ok(self
            .state()
            .summarizers
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    async fn list_summarizers_of_job(&self, job_id: Uuid) -> Result<Vec<ComplianceSummarizer>> {
        Ok(self
            .state()
            .summarizers
            .values()
            .filter(|s| s.parent_job_id == Some(job_id))
            .cloned()
            .collect())
    }

    async fn update_summarizer_status(
        &self,
        id: Uuid,
        status: SummarizerStatus,
        failure_message: Option<&str>,
    ) -> Result<bool> {
        let mut state = self.state();
        let Some(summarizer) = state.summarizers.get_mut(&id) else {
            return Ok(false);
        };
        let now = Utc::now();
        summarizer.status = status;
        summarizer.failure_message = failure_message.map(str::to_string);
        if status == SummarizerStatus::InProgress {
            summarizer.started_at = Some(now);
        }
        summarizer.updated_at = now;
        Ok(true)
    }

    async fn timeout_summarizers(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut count = 0;
        for summarizer in self.state().summarizers.values_mut() {
            if summarizer.status == SummarizerStatus::InProgress && summarizer.updated_at < cutoff {
                summarizer.status = SummarizerStatus::Failed;
                summarizer.failure_message = Some("summarizer timed out".to_string());
                summarizer.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn retry_failed_summarizers(&self, max_retries: i32) -> Result<u64> {
        let mut count = 0;
        for summarizer in self.state().summarizers.values_mut() {
            if summarizer.status == SummarizerStatus::Failed && summarizer.retry_count < max_retries
            {
                summarizer.status = SummarizerStatus::Created;
                summarizer.retry_count += 1;
                summarizer.failure_message = None;
                summarizer.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn create_sequencer(&self, sequencer: &JobSequencer) -> Result<()> {
        self.state().sequencers.insert(sequencer.id, sequencer.clone());
        Ok(())
    }

    async fn list_waiting_sequencers(&self) -> Result<Vec<JobSequencer>> {
        Ok(self
            .state()
            .sequencers
            .values()
            .filter(|s| s.status == SequencerStatus::WaitingForDependencies)
            .cloned()
            .collect())
    }

    async fn update_sequencer_failed(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state();
        match state.sequencers.get_mut(&id) {
            Some(seq) if seq.status == SequencerStatus::WaitingForDependencies => {
                seq.status = SequencerStatus::Failed;
                seq.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_sequencer_finished(&self, id: Uuid, next_job_ids: &[Uuid]) -> Result<bool> {
        let mut state = self.state();
        match state.sequencers.get_mut(&id) {
            Some(seq) if seq.status == SequencerStatus::WaitingForDependencies => {
                seq.status = SequencerStatus::Finished;
                seq.next_job_ids = next_job_ids.to_vec();
                seq.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_undispatched_sequencers(&self) -> Result<Vec<JobSequencer>> {
        Ok(self
            .state()
            .sequencers
            .values()
            .filter(|s| s.status == SequencerStatus::Finished && s.dispatched_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_sequencer_dispatched(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state();
        match state.sequencers.get_mut(&id) {
            Some(seq) if seq.status == SequencerStatus::Finished && seq.dispatched_at.is_none() => {
                let now = Utc::now();
                seq.dispatched_at = Some(now);
                seq.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(job: &ComplianceJob, query_id: &str) -> ComplianceRunner {
        ComplianceRunner::new(job.id, "cis", query_id, Some("conn-1".into()), None)
    }

    #[tokio::test]
    async fn test_duplicate_target_rolls_back_staged_job() {
        let store = InMemoryStore::new();
        let earlier = ComplianceJob::new("cis", false);
        store
            .create_job_with_runners(&earlier, &[runner(&earlier, "Q1")])
            .await
            .unwrap();

        let job = ComplianceJob::new("cis", false);
        let batch = [runner(&job, "Q1"), runner(&job, "Q2"), runner(&job, "Q1")];
        let err = store.create_job_with_runners(&job, &batch).await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateRunner { job_id } if job_id == job.id));
        assert!(store.get_job(job.id).await.unwrap().is_none());
        assert!(store.list_runners_of_job(job.id).await.unwrap().is_empty());
        assert_eq!(store.jobs().len(), 1);
        assert_eq!(store.runners().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_staging_leaves_nothing_behind() {
        let store = InMemoryStore::new();
        store.fail_runner_insert(true);

        let job = ComplianceJob::new("cis", false);
        let err = store
            .create_job_with_runners(&job, &[runner(&job, "Q1"), runner(&job, "Q2")])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Database(_)));
        assert!(store.jobs().is_empty());
        assert!(store.runners().is_empty());

        store.fail_runner_insert(false);
        store
            .create_job_with_runners(&job, &[runner(&job, "Q1"), runner(&job, "Q2")])
            .await
            .unwrap();
        assert_eq!(store.runners().len(), 2);
    }
}
