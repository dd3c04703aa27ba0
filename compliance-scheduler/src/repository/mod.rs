//! Repository Module
//!
//! Data access layer for the scheduler.
//! Each repository handles database operations for a specific domain entity.

pub mod job;
pub mod runner;
pub mod sequencer;
pub mod summarizer;

// Re-export for convenience
pub use job as job_repository;
pub use runner as runner_repository;
pub use sequencer as sequencer_repository;
pub use summarizer as summarizer_repository;

use compliance_core::domain::UnknownStatus;

/// Parse a persisted status column, surfacing unknown values as decode errors
fn decode_status<T>(raw: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = UnknownStatus>,
{
    raw.parse::<T>().map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
