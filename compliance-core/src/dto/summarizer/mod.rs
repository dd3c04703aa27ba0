//! Summarizer DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::summarizer::{ComplianceSummarizer, SummarizerStatus};

/// Task message produced to the summarizer topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerJob {
    pub id: Uuid,
    pub retry_count: i32,
    pub benchmark_id: String,
    pub created_at: DateTime<Utc>,
}

impl SummarizerJob {
    pub fn idempotency_key(&self) -> String {
        super::idempotency_key(self.id, self.retry_count)
    }
}

impl From<&ComplianceSummarizer> for SummarizerJob {
    fn from(summarizer: &ComplianceSummarizer) -> Self {
        Self {
            id: summarizer.id,
            retry_count: summarizer.retry_count,
            benchmark_id: summarizer.benchmark_id.clone(),
            created_at: summarizer.created_at,
        }
    }
}

/// Status report sent by a summarizer worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerResult {
    pub status: SummarizerStatus,
    pub failure_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_produces_distinct_key() {
        let mut summarizer = ComplianceSummarizer::new("cis", None);
        let first = SummarizerJob::from(&summarizer);
        summarizer.retry_count += 1;
        let second = SummarizerJob::from(&summarizer);

        assert_eq!(first.id, second.id);
        assert_ne!(first.idempotency_key(), second.idempotency_key());
    }
}
