//! Job sequencer domain types
//!
//! A sequencer expresses "start these jobs only after those jobs finish" for
//! any job kind. It is pure bookkeeping: the owner of the successor jobs
//! enqueues them once it observes the sequencer as `Finished`, and the
//! sequencer remembers when that hand-over succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSequencer {
    pub id: Uuid,

    /// Kind of the upstream jobs this sequencer waits on
    pub dependency_kind: JobKind,
    pub dependency_ids: Vec<Uuid>,

    /// Jobs unblocked once the dependencies finish; the owner of those jobs
    /// creates them held back and starts them when the sequencer finishes
    pub next_job_kind: JobKind,
    pub next_job_ids: Vec<Uuid>,

    pub status: SequencerStatus,

    /// When the successors of a finished sequencer were handed over
    #[serde(default)]
    pub dispatched_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSequencer {
    /// Creates a sequencer in `WaitingForDependencies`
    pub fn new(
        dependency_kind: JobKind,
        dependency_ids: Vec<Uuid>,
        next_job_kind: JobKind,
        next_job_ids: Vec<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dependency_kind,
            dependency_ids,
            next_job_kind,
            next_job_ids,
            status: SequencerStatus::WaitingForDependencies,
            dispatched_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Successors that may actually be started
    ///
    /// Empty unless the sequencer finished.
    pub fn effective_successors(&self) -> &[Uuid] {
        match self.status {
            SequencerStatus::Finished => &self.next_job_ids,
            SequencerStatus::WaitingForDependencies | SequencerStatus::Failed => &[],
        }
    }
}

/// Job kinds a sequencer can chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Describe,
    Compliance,
    Insight,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Describe => "Describe",
            JobKind::Compliance => "Compliance",
            JobKind::Insight => "Insight",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Describe" => Ok(JobKind::Describe),
            "Compliance" => Ok(JobKind::Compliance),
            "Insight" => Ok(JobKind::Insight),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Sequencer status; `Finished` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerStatus {
    WaitingForDependencies,
    Finished,
    Failed,
}

impl SequencerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequencerStatus::WaitingForDependencies => "WaitingForDependencies",
            SequencerStatus::Finished => "Finished",
            SequencerStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SequencerStatus::WaitingForDependencies)
    }
}

impl std::fmt::Display for SequencerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SequencerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WaitingForDependencies" => Ok(SequencerStatus::WaitingForDependencies),
            "Finished" => Ok(SequencerStatus::Finished),
            "Failed" => Ok(SequencerStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
