//! Data Transfer Objects for inter-service communication
//!
//! Queue messages produced for external workers, the callbacks those
//! workers send back, and the request bodies of the scheduler's HTTP API.

pub mod compliance;
pub mod runner;
pub mod sequencer;
pub mod summarizer;

use uuid::Uuid;

/// Idempotency key for one dispatch attempt of a queued job
///
/// Redelivering the same attempt reuses the key; a retry with a higher
/// `retry_count` is a distinct message.
pub fn idempotency_key(id: Uuid, retry_count: i32) -> String {
    format!("job-{}-{}", id, retry_count)
}
