//! Route handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::{self, Stream};
use sentinel_engine::scan_text_report;
use sentinel_types::ApprovalId;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub source_key: String,
    pub request: String,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub granted: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ready: bool,
    pub approval_mode: &'static str,
}

pub async fn post_task(State(state): State<AppState>, Json(body): Json<TaskRequest>) -> impl IntoResponse {
    let result = state.orchestrator.handle_task(&body.request, &body.source_key).await;
    Json(result)
}

pub async fn get_approval(
    State(state): State<AppState>,
    Path(id): Path<ApprovalId>,
) -> Result<impl IntoResponse, ApiError> {
    let now = sentinel_core::now_unix_ms();
    let checked = state
        .orchestrator
        .approval_queue()
        .check(id, now)
        .map_err(|error| ApiError(sentinel_engine::SentinelError::Fatal(error.to_string())))?;
    Ok(Json(serde_json::json!({
        "status": checked.status,
        "approval": checked.approval,
    })))
}

pub async fn post_approve(
    State(state): State<AppState>,
    Path(id): Path<ApprovalId>,
    Json(body): Json<ApproveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = sentinel_core::now_unix_ms();
    let checked = state
        .orchestrator
        .approval_queue()
        .submit(id, body.granted, body.reason, now)
        .map_err(|error| ApiError(sentinel_engine::SentinelError::Fatal(error.to_string())))?;

    if checked.status != sentinel_types::ApprovalStatus::Granted {
        return Ok(Json(serde_json::json!({ "status": checked.status })).into_response());
    }

    let result = state.orchestrator.execute_approved_plan(id).await;
    Ok(Json(result).into_response())
}

pub async fn post_scan(State(state): State<AppState>, Json(body): Json<ScanRequest>) -> impl IntoResponse {
    let report = scan_text_report(
        &body.text,
        state.injection_score_threshold,
        state.orchestrator.credential_scanner(),
    );
    Json(report)
}

pub async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        ready: state.orchestrator.is_ready(),
        approval_mode: state.orchestrator.approval_mode().as_str(),
    })
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(source_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .orchestrator
        .session_store()
        .get(&source_key)
        .map_err(|error| ApiError(sentinel_engine::SentinelError::Fatal(error.to_string())))?;
    Ok(Json(session))
}

pub async fn get_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.orchestrator.event_bus().subscribe("**");
    let stream = stream::unfold(subscription, |subscription| async move {
        let event = subscription.recv().await?;
        let sse_event = Event::default().event(event.topic.clone()).json_data(event.payload).ok()?;
        Some((Ok(sse_event), subscription))
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "no such route")
}
