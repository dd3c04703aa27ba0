//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::compliance::ComplianceError;
use crate::service::runner::RunnerError;
use crate::service::runner_builder::BuildError;
use crate::service::sequencer::SequencerError;
use crate::service::summarizer::SummarizerError;
use crate::store::StoreError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// A collaborator (lookup API, queue) failed
    Upstream(String),
    StoreError(StoreError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Upstream(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::StoreError(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::StoreError(err)
    }
}

impl From<ComplianceError> for ApiError {
    fn from(err: ComplianceError) -> Self {
        match err {
            ComplianceError::NotFound(id) => {
                ApiError::NotFound(format!("Compliance job {} not found", id))
            }
            ComplianceError::NoTargets(_) => ApiError::BadRequest(err.to_string()),
            ComplianceError::Assignments(ref source)
            | ComplianceError::Build(BuildError::Lookup { ref source, .. })
                if source.is_not_found() =>
            {
                ApiError::NotFound(err.to_string())
            }
            ComplianceError::Assignments(_) | ComplianceError::Build(_) => {
                ApiError::Upstream(err.to_string())
            }
            ComplianceError::Store(err) => ApiError::StoreError(err),
        }
    }
}

impl From<RunnerError> for ApiError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::NotFound(id) => ApiError::NotFound(format!("Runner {} not found", id)),
            RunnerError::InvalidReport { .. } => ApiError::BadRequest(err.to_string()),
            RunnerError::Serialization(e) => ApiError::InternalError(e.to_string()),
            RunnerError::Store(err) => ApiError::StoreError(err),
        }
    }
}

impl From<SummarizerError> for ApiError {
    fn from(err: SummarizerError) -> Self {
        match err {
            SummarizerError::NotFound(id) => {
                ApiError::NotFound(format!("Summarizer {} not found", id))
            }
            SummarizerError::JobNotReady(_) => ApiError::Conflict(err.to_string()),
            SummarizerError::InvalidReport { .. } => ApiError::BadRequest(err.to_string()),
            SummarizerError::Queue(_) => ApiError::Upstream(err.to_string()),
            SummarizerError::Serialization(e) => ApiError::InternalError(e.to_string()),
            SummarizerError::Store(err) => ApiError::StoreError(err),
        }
    }
}

impl From<SequencerError> for ApiError {
    fn from(err: SequencerError) -> Self {
        match err {
            SequencerError::NotWaiting(_) => ApiError::Conflict(err.to_string()),
            SequencerError::InvalidInitialStatus(_) | SequencerError::NoDependencies => {
                ApiError::BadRequest(err.to_string())
            }
            SequencerError::Queue(_) => ApiError::Upstream(err.to_string()),
            SequencerError::Serialization(e) => ApiError::InternalError(e.to_string()),
            SequencerError::Store(err) => ApiError::StoreError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
