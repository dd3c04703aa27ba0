//! Compliance scheduler loop
//!
//! A single task owns both timers, so ticks run one after another and never
//! race each other over the same rows. Every failure is logged and counted;
//! nothing a tick does stops the loop.

use std::fmt::Display;
use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use super::SchedulerStats;
use crate::service::sequencer::SequencerHooks;
use crate::service::{
    PassOutcome, ServiceContext, compliance_service, convergence_service, runner_service,
    sequencer_service, summarizer_service,
};

pub struct ComplianceScheduler {
    ctx: ServiceContext,
    hooks: SequencerHooks,
    stats: Arc<SchedulerStats>,
}

impl ComplianceScheduler {
    pub fn new(ctx: ServiceContext, hooks: SequencerHooks, stats: Arc<SchedulerStats>) -> Self {
        Self { ctx, hooks, stats }
    }

    /// Runs the scheduling and lifecycle loops until the process exits
    pub async fn run(&self) {
        let config = &self.ctx.config;
        info!(
            "Starting compliance scheduler (schedule: {:?}, lifecycle: {:?})",
            config.schedule_tick, config.convergence.poll_interval
        );

        let mut schedule = time::interval(config.schedule_tick);
        schedule.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut lifecycle = time::interval(config.convergence.poll_interval);
        lifecycle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = schedule.tick() => self.schedule_tick().await,
                _ = lifecycle.tick() => self.lifecycle_tick().await,
            }
        }
    }

    /// Creates jobs for every benchmark that is due
    async fn schedule_tick(&self) {
        self.stats.record_tick();
        debug!("Evaluating due benchmarks");

        match compliance_service::schedule_due_benchmarks(&self.ctx).await {
            Ok(outcome) => {
                if !outcome.created.is_empty() {
                    info!("Created {} compliance job(s)", outcome.created.len());
                }
                self.stats.record_jobs_created(outcome.created.len() as u64);
                self.stats.record_failures(outcome.failures);
            }
            Err(e) => {
                error!("Error during scheduling tick: {}", e);
                self.stats.record_failures(1);
            }
        }
    }

    /// Moves runners, jobs, summarizers and sequencers one step forward
    async fn lifecycle_tick(&self) {
        self.stats.record_tick();
        let ctx = &self.ctx;

        self.step("timeout runners", runner_service::timeout_runners(ctx).await);
        self.step("retry runners", runner_service::retry_failed_runners(ctx).await);
        self.pass("enqueue runners", runner_service::enqueue_runners(ctx).await);

        self.pass(
            "convergence check",
            convergence_service::check_jobs_converged(ctx).await,
        );

        self.step(
            "timeout summarizers",
            summarizer_service::timeout_summarizers(ctx).await,
        );
        self.step(
            "retry summarizers",
            summarizer_service::retry_failed_summarizers(ctx).await,
        );
        self.pass(
            "trigger summarizers",
            summarizer_service::trigger_pending_summarizers(ctx).await,
        );
        self.pass(
            "finish jobs",
            summarizer_service::finish_compliance_jobs(ctx).await,
        );

        self.pass(
            "job sequencers",
            sequencer_service::check_job_sequencers(ctx.store.as_ref(), &self.hooks).await,
        );
    }

    fn step<T, E: Display>(&self, name: &str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Error during {}: {}", name, e);
                self.stats.record_failures(1);
                None
            }
        }
    }

    fn pass<E: Display>(&self, name: &str, result: Result<PassOutcome, E>) {
        if let Some(outcome) = self.step(name, result) {
            if outcome.processed > 0 {
                debug!("{}: {} processed", name, outcome.processed);
            }
            self.stats.record_failures(outcome.failures);
        }
    }
}
