//! Job sequencer DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::sequencer::{JobKind, JobSequencer};

/// Request to chain jobs behind other jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobSequencer {
    pub dependency_kind: JobKind,
    pub dependency_ids: Vec<Uuid>,
    pub next_job_kind: JobKind,
    pub next_job_ids: Vec<Uuid>,
}

impl From<CreateJobSequencer> for JobSequencer {
    fn from(req: CreateJobSequencer) -> Self {
        JobSequencer::new(
            req.dependency_kind,
            req.dependency_ids,
            req.next_job_kind,
            req.next_job_ids,
        )
    }
}

/// Message announcing that a held-back job may start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessorReady {
    pub sequencer_id: Uuid,
    pub job_kind: JobKind,
    pub job_id: Uuid,
}

impl SuccessorReady {
    pub fn idempotency_key(&self) -> String {
        format!("sequencer-{}-{}", self.sequencer_id, self.job_id)
    }
}
