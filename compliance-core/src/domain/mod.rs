//! Core domain types
//!
//! This module contains the core domain structures used across the compliance
//! services. The scheduler persists them; workers and the HTTP layer only see
//! them through the DTOs.

pub mod benchmark;
pub mod job;
pub mod runner;
pub mod sequencer;
pub mod summarizer;

/// Error returned when a persisted status string does not name a known status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}
