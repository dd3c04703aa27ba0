//! Health Check API Handler
//!
//! Liveness plus the scheduler's counters for monitoring.

use axum::{Json, extract::State};
use serde::Serialize;

use super::AppState;
use crate::scheduler::StatsSnapshot;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub scheduler: StatsSnapshot,
}

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        scheduler: state.stats.snapshot(),
    })
}
