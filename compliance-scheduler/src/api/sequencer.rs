//! Job Sequencer API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use compliance_core::domain::sequencer::JobSequencer;
use compliance_core::dto::sequencer::CreateJobSequencer;
use uuid::Uuid;

use super::AppState;
use crate::api::error::ApiResult;
use crate::service::sequencer_service;

/// POST /sequencers
/// Hold jobs back until their dependencies finish
pub async fn create_sequencer(
    State(state): State<AppState>,
    Json(req): Json<CreateJobSequencer>,
) -> ApiResult<(StatusCode, Json<JobSequencer>)> {
    let sequencer = JobSequencer::from(req);
    sequencer_service::create_job_sequencer(state.ctx.store.as_ref(), &sequencer).await?;

    Ok((StatusCode::CREATED, Json(sequencer)))
}

/// GET /sequencers/waiting
pub async fn list_waiting(State(state): State<AppState>) -> ApiResult<Json<Vec<JobSequencer>>> {
    let sequencers = sequencer_service::list_waiting_job_sequencers(state.ctx.store.as_ref()).await?;
    Ok(Json(sequencers))
}

/// POST /sequencers/{id}/fail
/// Give up on a sequencer; its successors never start
pub async fn fail_sequencer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    sequencer_service::update_job_sequencer_failed(state.ctx.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
