//! Compliance job DTOs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::ComplianceJob;
use crate::domain::runner::ComplianceRunner;
use crate::domain::summarizer::ComplianceSummarizer;

/// Request to run a benchmark ad hoc
///
/// Without `connection_ids` the benchmark's assignments are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerComplianceJob {
    #[serde(default)]
    pub connection_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredJob {
    pub job_id: Uuid,
}

/// A job together with the progress of its sub-jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOverview {
    pub job: ComplianceJob,

    /// Runner count per status name
    pub runners: BTreeMap<String, usize>,

    pub summarizers: Vec<ComplianceSummarizer>,
}

impl JobOverview {
    pub fn new(
        job: ComplianceJob,
        runners: &[ComplianceRunner],
        summarizers: Vec<ComplianceSummarizer>,
    ) -> Self {
        let mut counts = BTreeMap::new();
        for runner in runners {
            *counts.entry(runner.status.as_str().to_string()).or_insert(0) += 1;
        }
        Self {
            job,
            runners: counts,
            summarizers,
        }
    }
}

/// Summarizer created for an ad hoc summarize request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredSummarizer {
    pub summarizer_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runner::RunnerStatus;

    #[test]
    fn test_overview_counts_runners_by_status() {
        let job = ComplianceJob::new("cis", false);
        let mut done = ComplianceRunner::new(job.id, "cis", "Q1", Some("c1".into()), None);
        done.status = RunnerStatus::Succeeded;
        let queued = ComplianceRunner::new(job.id, "cis", "Q2", Some("c1".into()), None);
        let mut failed = ComplianceRunner::new(job.id, "cis", "Q3", Some("c1".into()), None);
        failed.status = RunnerStatus::Failed;
        let mut also_done = failed.clone();
        also_done.status = RunnerStatus::Succeeded;

        let overview = JobOverview::new(job, &[done, queued, failed, also_done], vec![]);

        assert_eq!(overview.runners.get("Succeeded"), Some(&2));
        assert_eq!(overview.runners.get("Created"), Some(&1));
        assert_eq!(overview.runners.get("Failed"), Some(&1));
    }
}
