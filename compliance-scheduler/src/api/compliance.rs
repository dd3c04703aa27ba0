//! Compliance API Handlers
//!
//! Ad hoc triggers for compliance jobs and summarizers, job inspection, and
//! the result callbacks of runner and summarizer workers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use compliance_core::domain::runner::ComplianceRunner;
use compliance_core::domain::summarizer::ComplianceSummarizer;
use compliance_core::dto::compliance::{
    JobOverview, TriggerComplianceJob, TriggeredJob, TriggeredSummarizer,
};
use compliance_core::dto::runner::RunnerResult;
use compliance_core::dto::summarizer::SummarizerResult;
use uuid::Uuid;

use super::AppState;
use crate::api::error::ApiResult;
use crate::service::{compliance_service, runner_service, summarizer_service};

// =============================================================================
// Trigger Endpoints
// =============================================================================

/// POST /compliance/benchmarks/{id}/trigger
/// Run a benchmark now, optionally on an explicit set of connections
pub async fn trigger_benchmark(
    State(state): State<AppState>,
    Path(benchmark_id): Path<String>,
    Json(req): Json<TriggerComplianceJob>,
) -> ApiResult<(StatusCode, Json<TriggeredJob>)> {
    tracing::info!("Triggering benchmark: {}", benchmark_id);

    let last_job = state.ctx.store.get_last_job(&benchmark_id).await?;
    let job_id = compliance_service::create_compliance_report_job(
        &state.ctx,
        &benchmark_id,
        last_job.as_ref(),
        req.connection_ids,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(TriggeredJob { job_id })))
}

/// POST /compliance/benchmarks/{id}/summarize
/// Summarize a benchmark's current results outside any job
pub async fn summarize_benchmark(
    State(state): State<AppState>,
    Path(benchmark_id): Path<String>,
) -> ApiResult<(StatusCode, Json<TriggeredSummarizer>)> {
    tracing::info!("Summarizing benchmark: {}", benchmark_id);

    let summarizer = summarizer_service::create_summarizer(&state.ctx, &benchmark_id, None).await?;

    Ok((
        StatusCode::CREATED,
        Json(TriggeredSummarizer {
            summarizer_id: summarizer.id,
        }),
    ))
}

/// GET /compliance/jobs/{id}
/// Get a compliance job with its runner progress
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobOverview>> {
    tracing::debug!("Getting compliance job: {}", id);

    let overview = compliance_service::get_job_overview(&state.ctx, id).await?;
    Ok(Json(overview))
}

// =============================================================================
// Worker Callbacks
// =============================================================================

/// POST /compliance/runners/{id}/result
pub async fn report_runner_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(result): Json<RunnerResult>,
) -> ApiResult<Json<ComplianceRunner>> {
    let runner = runner_service::handle_runner_result(&state.ctx, id, result).await?;
    Ok(Json(runner))
}

/// POST /compliance/summarizers/{id}/result
pub async fn report_summarizer_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(result): Json<SummarizerResult>,
) -> ApiResult<Json<ComplianceSummarizer>> {
    let summarizer = summarizer_service::handle_summarizer_result(&state.ctx, id, result).await?;
    Ok(Json(summarizer))
}
