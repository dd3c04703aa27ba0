//! Service Module
//!
//! Business logic layer for the scheduler.
//! Services orchestrate between the store, the gateways and contain domain logic.

pub mod compliance;
pub mod convergence;
pub mod runner;
pub mod runner_builder;
pub mod sequencer;
pub mod summarizer;

// Re-export for convenience
pub use compliance as compliance_service;
pub use convergence as convergence_service;
pub use runner as runner_service;
pub use sequencer as sequencer_service;
pub use summarizer as summarizer_service;

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::{AssignmentSource, BenchmarkLookup, JobQueue, SinkCounter};
use crate::store::ComplianceStore;

/// Everything a service call needs, shared by the scheduler and the HTTP handlers
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn ComplianceStore>,
    pub benchmarks: Arc<dyn BenchmarkLookup>,
    pub assignments: Arc<dyn AssignmentSource>,
    pub sinks: Arc<dyn SinkCounter>,
    pub queue: Arc<dyn JobQueue>,
    pub config: Arc<Config>,
}

/// Counts reported by a periodic pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    pub processed: u64,
    pub failures: u64,
}
