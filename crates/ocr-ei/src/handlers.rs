//! Route handlers for the external-initiator surface (spec §4.I).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ocr_store::Deadline;
use ocr_types::{OcrError, OcrErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::AppState;

const REQUEST_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct JobCreate {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub params: ocr_store::models::JobSpec,
}

#[derive(Debug, Deserialize)]
pub struct JobRun {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub result: String,
}

#[derive(Debug, Serialize)]
pub struct JobHandle {
    pub id: String,
}

/// `500` with an empty body, matching spec §4.I's "internal failure" shape
/// (no error detail leaked to the external initiator).
pub struct EmptyInternalError;

impl IntoResponse for EmptyInternalError {
    fn into_response(self) -> Response {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

fn bad_request(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

pub async fn create_job(
    State(state): State<AppState>,
    body: Result<Json<JobCreate>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(json) => json,
        Err(err) => return bad_request(err),
    };
    // `type` is accepted for wire compatibility but every job this node
    // runs is an OCR2 median job; nothing else to dispatch on.
    let _ = req.job_type;

    match state
        .jobs
        .start_job(&req.job_id, req.params, Deadline::after(REQUEST_DEADLINE))
        .await
    {
        Ok(()) => (StatusCode::CREATED, Json(JobHandle { id: req.job_id })).into_response(),
        Err(err) if err.kind == OcrErrorKind::ValidationFailed => bad_request(err),
        Err(err) => {
            tracing::error!(job_id = %req.job_id, %err, "create_job failed");
            EmptyInternalError.into_response()
        }
    }
}

pub async fn delete_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    // Always 200 on successful dispatch, including when the job was
    // absent — `stop_job` is already idempotent (spec §4.I).
    match state
        .jobs
        .stop_job(&job_id, Deadline::after(REQUEST_DEADLINE))
        .await
    {
        Ok(()) => (StatusCode::OK, Json(JobHandle { id: job_id })).into_response(),
        Err(err) => {
            tracing::error!(job_id = %job_id, %err, "delete_job failed");
            EmptyInternalError.into_response()
        }
    }
}

pub async fn submit_run(
    State(state): State<AppState>,
    body: Result<Json<JobRun>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(json) => json,
        Err(err) => return bad_request(err),
    };
    match state.jobs.run_job(&req.job_id, &req.result).await {
        Ok(()) => (StatusCode::CREATED, Json(JobHandle { id: req.job_id })).into_response(),
        Err(OcrError { kind: OcrErrorKind::NotFound, .. }) => EmptyInternalError.into_response(),
        Err(err) => {
            tracing::error!(job_id = %req.job_id, %err, "submit_run failed");
            EmptyInternalError.into_response()
        }
    }
}

#[derive(Serialize)]
pub struct Health {
    chainlink: bool,
}

pub async fn health() -> Json<Health> {
    Json(Health { chainlink: true })
}
