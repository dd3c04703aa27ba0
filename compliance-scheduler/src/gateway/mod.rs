//! Gateway Module
//!
//! Narrow interfaces to the collaborators the scheduler consumes: the
//! benchmark/control lookup API, the search index holding runner results,
//! and the job queue. Services only see these traits.

pub mod pgmq;

use async_trait::async_trait;
use compliance_client::{ComplianceApiClient, SearchClient};
use compliance_core::domain::benchmark::{Benchmark, BenchmarkAssignment, Control};
use uuid::Uuid;

pub use pgmq::PgmqQueue;

/// Benchmark and control definitions
#[async_trait]
pub trait BenchmarkLookup: Send + Sync {
    async fn get_benchmark(&self, benchmark_id: &str) -> compliance_client::Result<Benchmark>;
    async fn get_control(&self, control_id: &str) -> compliance_client::Result<Control>;
}

/// Where benchmarks are evaluated
#[async_trait]
pub trait AssignmentSource: Send + Sync {
    async fn list_assignments(&self) -> compliance_client::Result<Vec<BenchmarkAssignment>>;
    async fn get_assignment(
        &self,
        benchmark_id: &str,
    ) -> compliance_client::Result<BenchmarkAssignment>;
}

/// Exact count of result documents visible in the search index
#[async_trait]
pub trait SinkCounter: Send + Sync {
    async fn count_sunk_documents(
        &self,
        benchmark_id: &str,
        job_id: Uuid,
    ) -> compliance_client::Result<i64>;
}

#[async_trait]
impl BenchmarkLookup for ComplianceApiClient {
    async fn get_benchmark(&self, benchmark_id: &str) -> compliance_client::Result<Benchmark> {
        ComplianceApiClient::get_benchmark(self, benchmark_id).await
    }

    async fn get_control(&self, control_id: &str) -> compliance_client::Result<Control> {
        ComplianceApiClient::get_control(self, control_id).await
    }
}

#[async_trait]
impl AssignmentSource for ComplianceApiClient {
    async fn list_assignments(&self) -> compliance_client::Result<Vec<BenchmarkAssignment>> {
        ComplianceApiClient::list_assignments(self).await
    }

    async fn get_assignment(
        &self,
        benchmark_id: &str,
    ) -> compliance_client::Result<BenchmarkAssignment> {
        ComplianceApiClient::get_assignment(self, benchmark_id).await
    }
}

#[async_trait]
impl SinkCounter for SearchClient {
    async fn count_sunk_documents(
        &self,
        benchmark_id: &str,
        job_id: Uuid,
    ) -> compliance_client::Result<i64> {
        SearchClient::count_sunk_documents(self, benchmark_id, job_id).await
    }
}

// =============================================================================
// Job queue
// =============================================================================

/// Queue error type
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("produce to {topic} rejected: {message}")]
    Rejected { topic: String, message: String },
}

/// Result of a produce call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// A new message was written
    Enqueued { message_id: i64 },
    /// The idempotency key was already used on this topic; nothing was written
    Duplicate { message_id: Option<i64> },
}

/// At-least-once job queue keyed by idempotency key
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn produce(
        &self,
        topic: &str,
        payload: serde_json::Value,
        idempotency_key: &str,
    ) -> Result<ProduceOutcome, QueueError>;
}
