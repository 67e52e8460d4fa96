use super::state::AppState;
use crate::error::RecorderError;
use crate::lifecycle::PageSignal;
use crate::session::{RecorderStatus, TrialContext};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    pub participant_id: String,
    pub trial_type: String,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub status: String,
    pub recorder: RecorderStatus,
}

#[derive(Debug, Serialize)]
pub struct PendingEntry {
    pub id: i64,
    pub filename: String,
    pub trial_type: String,
    pub participant_id: String,
    pub bytes: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recording/start
/// Start a screen recording for the given participant and trial
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> impl IntoResponse {
    let context = TrialContext::new(req.participant_id, req.trial_type);

    match state.coordinator.start(context).await {
        Ok(()) => (
            StatusCode::OK,
            Json(StartRecordingResponse {
                status: "recording".to_string(),
                message: "Screen recording started".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start recording: {}", e);
            let status = match &e {
                RecorderError::AlreadyActive => StatusCode::CONFLICT,
                RecorderError::MissingContext(_) => StatusCode::BAD_REQUEST,
                RecorderError::Acquisition(_) => StatusCode::FORBIDDEN,
                RecorderError::RecorderFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e.to_string())
        }
    }
}

/// POST /recording/stop
/// Stop the active recording; a no-op when nothing is recording
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    let recorder = state.coordinator.stop().await;
    (
        StatusCode::OK,
        Json(StopRecordingResponse {
            status: "stopped".to_string(),
            recorder,
        }),
    )
}

/// POST /recording/retry
/// Retry every pending delivery once
pub async fn retry_pending(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.coordinator.retry_pending().await;
    (StatusCode::OK, Json(report))
}

/// GET /recording/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.coordinator.status()))
}

/// GET /pending
/// Recordings still waiting to leave this device
pub async fn list_pending(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.coordinator.recorder().uploader().store().clone();
    match store.list_all().await {
        Ok(pending) => {
            let entries: Vec<PendingEntry> = pending
                .into_iter()
                .map(|r| PendingEntry {
                    id: r.id,
                    bytes: r.payload.len(),
                    filename: r.metadata.filename,
                    trial_type: r.metadata.trial_type,
                    participant_id: r.metadata.participant_id,
                    created_at: r.metadata.created_at,
                })
                .collect();
            (StatusCode::OK, Json(entries)).into_response()
        }
        Err(e) => {
            error!("Failed to list pending recordings: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /lifecycle/:signal
/// Forward a page signal (before_unload, visibility_hidden, ...)
pub async fn page_signal(
    State(state): State<AppState>,
    Path(signal): Path<String>,
) -> impl IntoResponse {
    let signal: PageSignal = match signal.parse() {
        Ok(signal) => signal,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    info!("Received page signal {}", signal);
    state.coordinator.dispatch(signal).await;

    (StatusCode::OK, Json(state.coordinator.status())).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
