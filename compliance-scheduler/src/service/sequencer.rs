//! Job Sequencer Service
//!
//! Bookkeeping for "start these jobs once those jobs finish", shared by every
//! job kind. Whether the dependencies of a sequencer finished is asked of a
//! [`DependencyProbe`] for the dependency kind; once the sequencer is
//! `Finished` its successors are handed to the [`SuccessorDispatcher`] of
//! the successor kind.

use std::sync::Arc;

use async_trait::async_trait;
use compliance_core::domain::job::ComplianceJobStatus;
use compliance_core::domain::sequencer::{JobKind, JobSequencer, SequencerStatus};
use compliance_core::dto::sequencer::SuccessorReady;
use uuid::Uuid;

use super::PassOutcome;
use crate::gateway::{JobQueue, QueueError};
use crate::store::{ComplianceStore, StoreError};

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("job sequencer {0} is not waiting for dependencies")]
    NotWaiting(Uuid),

    #[error("a new job sequencer must start in WaitingForDependencies, got {0}")]
    InvalidInitialStatus(SequencerStatus),

    #[error("job sequencer has no dependencies")]
    NoDependencies,

    #[error("failed to dispatch successor: {0}")]
    Queue(#[from] QueueError),

    #[error("failed to serialize successor: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SequencerError>;

/// Aggregate state of a sequencer's dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    Pending,
    Succeeded,
    Failed,
}

/// Reports how the upstream jobs of one kind are doing
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    fn kind(&self) -> JobKind;
    async fn state(&self, dependency_ids: &[Uuid]) -> Result<DependencyState>;
}

/// Starts held-back jobs of one kind
#[async_trait]
pub trait SuccessorDispatcher: Send + Sync {
    fn kind(&self) -> JobKind;
    async fn dispatch(&self, sequencer: &JobSequencer) -> Result<()>;
}

/// Probes and dispatchers known to this process
#[derive(Clone, Default)]
pub struct SequencerHooks {
    probes: Vec<Arc<dyn DependencyProbe>>,
    dispatchers: Vec<Arc<dyn SuccessorDispatcher>>,
}

impl SequencerHooks {
    pub fn with_probe(mut self, probe: Arc<dyn DependencyProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn SuccessorDispatcher>) -> Self {
        self.dispatchers.push(dispatcher);
        self
    }

    fn probe_for(&self, kind: JobKind) -> Option<&Arc<dyn DependencyProbe>> {
        self.probes.iter().find(|p| p.kind() == kind)
    }

    fn dispatcher_for(&self, kind: JobKind) -> Option<&Arc<dyn SuccessorDispatcher>> {
        self.dispatchers.iter().find(|d| d.kind() == kind)
    }
}

pub async fn create_job_sequencer(store: &dyn ComplianceStore, sequencer: &JobSequencer) -> Result<()> {
    if sequencer.status != SequencerStatus::WaitingForDependencies {
        return Err(SequencerError::InvalidInitialStatus(sequencer.status));
    }
    if sequencer.dependency_ids.is_empty() {
        return Err(SequencerError::NoDependencies);
    }

    store.create_sequencer(sequencer).await?;

    tracing::info!(
        sequencer_id = %sequencer.id,
        dependency_kind = sequencer.dependency_kind.as_str(),
        dependencies = sequencer.dependency_ids.len(),
        next_job_kind = sequencer.next_job_kind.as_str(),
        "Created job sequencer"
    );

    Ok(())
}

/// Sequencers a poller still has to re-check
pub async fn list_waiting_job_sequencers(store: &dyn ComplianceStore) -> Result<Vec<JobSequencer>> {
    Ok(store.list_waiting_sequencers().await?)
}

/// Mark a sequencer failed; its successors are never started
pub async fn update_job_sequencer_failed(store: &dyn ComplianceStore, id: Uuid) -> Result<()> {
    if !store.update_sequencer_failed(id).await? {
        return Err(SequencerError::NotWaiting(id));
    }

    tracing::warn!(sequencer_id = %id, "Job sequencer failed");
    Ok(())
}

/// Mark a sequencer finished, recording the successors it unblocks
pub async fn update_job_sequencer_finished(
    store: &dyn ComplianceStore,
    id: Uuid,
    next_job_ids: &[Uuid],
) -> Result<()> {
    if !store.update_sequencer_finished(id, next_job_ids).await? {
        return Err(SequencerError::NotWaiting(id));
    }

    tracing::info!(sequencer_id = %id, successors = next_job_ids.len(), "Job sequencer finished");
    Ok(())
}

/// Resolve waiting sequencers whose dependencies settled, then hand the
/// successors of finished sequencers to their dispatchers
///
/// Sequencers whose dependency kind has no probe, or whose successor kind
/// has no dispatcher, in this process are left for whichever process owns
/// that kind. A failed hand-over is retried on the next pass.
pub async fn check_job_sequencers(
    store: &dyn ComplianceStore,
    hooks: &SequencerHooks,
) -> Result<PassOutcome> {
    let waiting = list_waiting_job_sequencers(store).await?;

    let mut outcome = PassOutcome::default();
    for sequencer in waiting {
        let Some(probe) = hooks.probe_for(sequencer.dependency_kind) else {
            continue;
        };

        match resolve(store, probe.as_ref(), &sequencer).await {
            Ok(true) => outcome.processed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(sequencer_id = %sequencer.id, error = %e, "Failed to resolve job sequencer");
                outcome.failures += 1;
            }
        }
    }

    for sequencer in store.list_undispatched_sequencers().await? {
        let Some(dispatcher) = hooks.dispatcher_for(sequencer.next_job_kind) else {
            continue;
        };

        match dispatch_successors(store, dispatcher.as_ref(), &sequencer).await {
            Ok(()) => outcome.processed += 1,
            Err(e) => {
                tracing::error!(sequencer_id = %sequencer.id, error = %e, "Failed to dispatch successors");
                outcome.failures += 1;
            }
        }
    }

    Ok(outcome)
}

async fn resolve(
    store: &dyn ComplianceStore,
    probe: &dyn DependencyProbe,
    sequencer: &JobSequencer,
) -> Result<bool> {
    match probe.state(&sequencer.dependency_ids).await? {
        DependencyState::Pending => Ok(false),
        DependencyState::Failed => {
            update_job_sequencer_failed(store, sequencer.id).await?;
            Ok(true)
        }
        DependencyState::Succeeded => {
            update_job_sequencer_finished(store, sequencer.id, &sequencer.next_job_ids).await?;
            Ok(true)
        }
    }
}

/// Messages are keyed per successor, so handing over again after a crash
/// between dispatch and the marker update produces no duplicates downstream
async fn dispatch_successors(
    store: &dyn ComplianceStore,
    dispatcher: &dyn SuccessorDispatcher,
    sequencer: &JobSequencer,
) -> Result<()> {
    dispatcher.dispatch(sequencer).await?;
    store.mark_sequencer_dispatched(sequencer.id).await?;

    tracing::info!(
        sequencer_id = %sequencer.id,
        next_job_kind = sequencer.next_job_kind.as_str(),
        successors = sequencer.effective_successors().len(),
        "Dispatched job sequencer successors"
    );
    Ok(())
}

/// Reads compliance job outcomes from the store
pub struct ComplianceJobProbe {
    store: Arc<dyn ComplianceStore>,
}

impl ComplianceJobProbe {
    pub fn new(store: Arc<dyn ComplianceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencyProbe for ComplianceJobProbe {
    fn kind(&self) -> JobKind {
        JobKind::Compliance
    }

    async fn state(&self, dependency_ids: &[Uuid]) -> Result<DependencyState> {
        let mut pending = false;
        for id in dependency_ids {
            match self.store.get_job(*id).await?.map(|job| job.status) {
                // A dependency that does not exist can never succeed
                None | Some(ComplianceJobStatus::Failed) => return Ok(DependencyState::Failed),
                Some(ComplianceJobStatus::Succeeded) => {}
                Some(_) => pending = true,
            }
        }

        Ok(if pending {
            DependencyState::Pending
        } else {
            DependencyState::Succeeded
        })
    }
}

/// Announces finished successors of one kind on a queue topic
pub struct QueueSuccessorDispatcher {
    queue: Arc<dyn JobQueue>,
    topic: String,
    kind: JobKind,
}

impl QueueSuccessorDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, topic: impl Into<String>, kind: JobKind) -> Self {
        Self {
            queue,
            topic: topic.into(),
            kind,
        }
    }
}

#[async_trait]
impl SuccessorDispatcher for QueueSuccessorDispatcher {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn dispatch(&self, sequencer: &JobSequencer) -> Result<()> {
        for job_id in sequencer.effective_successors() {
            let message = SuccessorReady {
                sequencer_id: sequencer.id,
                job_kind: sequencer.next_job_kind,
                job_id: *job_id,
            };
            let key = message.idempotency_key();
            self.queue
                .produce(&self.topic, serde_json::to_value(&message)?, &key)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use compliance_core::domain::job::ComplianceJob;

    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::testing::InMemoryQueue;

    const TOPIC: &str = "successors";

    fn job(store: &InMemoryStore, status: ComplianceJobStatus) -> Uuid {
        let mut job = ComplianceJob::new("cis", false);
        job.status = status;
        store.put_job(job.clone());
        job.id
    }

    fn hooks(store: &Arc<InMemoryStore>, queue: &Arc<InMemoryQueue>) -> SequencerHooks {
        SequencerHooks::default()
            .with_probe(Arc::new(ComplianceJobProbe::new(store.clone())))
            .with_dispatcher(Arc::new(QueueSuccessorDispatcher::new(
                queue.clone(),
                TOPIC,
                JobKind::Insight,
            )))
    }

    #[tokio::test]
    async fn test_finished_sequencer_records_and_dispatches_successors() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let dep = job(&store, ComplianceJobStatus::Succeeded);
        let next = vec![Uuid::new_v4(), Uuid::new_v4()];
        let seq = JobSequencer::new(JobKind::Compliance, vec![dep], JobKind::Insight, next.clone());
        create_job_sequencer(store.as_ref(), &seq).await.unwrap();

        let outcome = check_job_sequencers(store.as_ref(), &hooks(&store, &queue))
            .await
            .unwrap();

        assert_eq!(outcome.processed, 2);
        let stored = store.sequencer(seq.id).unwrap();
        assert_eq!(stored.status, SequencerStatus::Finished);
        assert_eq!(stored.effective_successors(), next.as_slice());
        assert!(stored.dispatched_at.is_some());

        let messages = queue.messages_on(TOPIC);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload["job_id"], next[0].to_string());
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_retried_on_next_pass() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let hooks = hooks(&store, &queue);
        let dep = job(&store, ComplianceJobStatus::Succeeded);
        let next = vec![Uuid::new_v4()];
        let seq = JobSequencer::new(JobKind::Compliance, vec![dep], JobKind::Insight, next.clone());
        create_job_sequencer(store.as_ref(), &seq).await.unwrap();

        queue.set_failing(true);
        let first = check_job_sequencers(store.as_ref(), &hooks).await.unwrap();

        assert_eq!(first.failures, 1);
        let stored = store.sequencer(seq.id).unwrap();
        assert_eq!(stored.status, SequencerStatus::Finished);
        assert!(stored.dispatched_at.is_none());
        assert!(queue.messages().is_empty());

        queue.set_failing(false);
        let second = check_job_sequencers(store.as_ref(), &hooks).await.unwrap();

        assert_eq!(second.failures, 0);
        let messages = queue.messages_on(TOPIC);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload["job_id"], next[0].to_string());
        assert!(store.sequencer(seq.id).unwrap().dispatched_at.is_some());

        check_job_sequencers(store.as_ref(), &hooks).await.unwrap();
        assert_eq!(queue.messages_on(TOPIC).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_dependency_never_unblocks_successors() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let ok = job(&store, ComplianceJobStatus::Succeeded);
        let bad = job(&store, ComplianceJobStatus::Failed);
        let seq = JobSequencer::new(
            JobKind::Compliance,
            vec![ok, bad],
            JobKind::Insight,
            vec![Uuid::new_v4()],
        );
        create_job_sequencer(store.as_ref(), &seq).await.unwrap();

        check_job_sequencers(store.as_ref(), &hooks(&store, &queue))
            .await
            .unwrap();

        let stored = store.sequencer(seq.id).unwrap();
        assert_eq!(stored.status, SequencerStatus::Failed);
        assert!(stored.effective_successors().is_empty());
        assert!(queue.messages().is_empty());
    }

    #[tokio::test]
    async fn test_running_dependency_keeps_waiting() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let running = job(&store, ComplianceJobStatus::SummarizerInProgress);
        let seq = JobSequencer::new(JobKind::Compliance, vec![running], JobKind::Insight, vec![]);
        create_job_sequencer(store.as_ref(), &seq).await.unwrap();

        let outcome = check_job_sequencers(store.as_ref(), &hooks(&store, &queue))
            .await
            .unwrap();

        assert_eq!(outcome.processed, 0);
        assert_eq!(list_waiting_job_sequencers(store.as_ref()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_dependency_kind_is_left_alone() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let seq = JobSequencer::new(
            JobKind::Describe,
            vec![Uuid::new_v4()],
            JobKind::Compliance,
            vec![Uuid::new_v4()],
        );
        create_job_sequencer(store.as_ref(), &seq).await.unwrap();

        check_job_sequencers(store.as_ref(), &hooks(&store, &queue))
            .await
            .unwrap();

        assert_eq!(
            store.sequencer(seq.id).unwrap().status,
            SequencerStatus::WaitingForDependencies
        );
    }

    #[tokio::test]
    async fn test_terminal_sequencer_cannot_transition_again() {
        let store = InMemoryStore::new();
        let seq = JobSequencer::new(JobKind::Describe, vec![Uuid::new_v4()], JobKind::Compliance, vec![]);
        create_job_sequencer(&store, &seq).await.unwrap();

        update_job_sequencer_failed(&store, seq.id).await.unwrap();

        let err = update_job_sequencer_finished(&store, seq.id, &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, SequencerError::NotWaiting(_)));
        assert_eq!(store.sequencer(seq.id).unwrap().status, SequencerStatus::Failed);
    }

    #[tokio::test]
    async fn test_sequencer_without_dependencies_is_rejected() {
        let store = InMemoryStore::new();
        let seq = JobSequencer::new(JobKind::Describe, vec![], JobKind::Compliance, vec![]);

        let err = create_job_sequencer(&store, &seq).await.unwrap_err();

        assert!(matches!(err, SequencerError::NoDependencies));
    }
}
