//! API Module
//!
//! HTTP API layer for the scheduler.
//! Each submodule handles endpoints for a specific domain.

pub mod compliance;
pub mod error;
pub mod health;
pub mod sequencer;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::scheduler::SchedulerStats;
use crate::service::ServiceContext;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: ServiceContext,
    pub stats: Arc<SchedulerStats>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Compliance endpoints
        .route(
            "/compliance/benchmarks/{id}/trigger",
            post(compliance::trigger_benchmark),
        )
        .route(
            "/compliance/benchmarks/{id}/summarize",
            post(compliance::summarize_benchmark),
        )
        .route("/compliance/jobs/{id}", get(compliance::get_job))
        // Worker callbacks
        .route(
            "/compliance/runners/{id}/result",
            post(compliance::report_runner_result),
        )
        .route(
            "/compliance/summarizers/{id}/result",
            post(compliance::report_summarizer_result),
        )
        // Job sequencer endpoints
        .route("/sequencers", post(sequencer::create_sequencer))
        .route("/sequencers/waiting", get(sequencer::list_waiting))
        .route("/sequencers/{id}/fail", post(sequencer::fail_sequencer))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
