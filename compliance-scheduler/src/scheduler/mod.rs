//! Scheduler layer
//!
//! Periodic loops driving compliance jobs through their lifecycle: creating
//! jobs for due benchmarks, dispatching and reaping runners, watching for
//! results to converge, and running summarizers to completion.

pub mod poller;

pub use poller::ComplianceScheduler;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared between the scheduler loops and the health endpoint
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    failures: AtomicU64,
    jobs_created: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub failures: u64,
    pub jobs_created: u64,
}

impl SchedulerStats {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failures(&self, count: u64) {
        self.failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_jobs_created(&self, count: u64) {
        self.jobs_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
        }
    }
}
