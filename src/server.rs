use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::data::{GenerationRequest, JobId, SchoolId};
use crate::engine;
use crate::error::EngineError;
use crate::export;
use crate::jobs::{JobManager, JobStatus};
use crate::repository::{QueryFilters, RelationSet, ScheduleRepository, SnapshotCache, SqliteRepository};

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<SqliteRepository>,
    pub jobs: Arc<JobManager>,
    pub cache: Arc<SnapshotCache>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: JobId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest {
    job_id: JobId,
    school_id: SchoolId,
    actor: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    count: usize,
}

fn http_error(err: EngineError) -> (StatusCode, String) {
    let status = match &err {
        EngineError::InvalidInput(_) | EngineError::UnknownClass(_) | EngineError::EmptyScope(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::JobNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::DataAccess(_) | EngineError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

/// POST /v1/timetable/generate
/// Validates the request, snapshots the scheduling inputs and submits the run
/// to the worker pool. The reply carries the job id to poll.
async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, String)> {
    let snapshot = state
        .cache
        .fetch(
            state.repository.as_ref(),
            request.school_id,
            request.class_ids.as_deref(),
        )
        .map_err(http_error)?;
    engine::validate(&request, &snapshot).map_err(http_error)?;

    let constraints = request.constraints.unwrap_or_default();
    let params = request.optimization.unwrap_or_default();
    let job_id = state.jobs.submit((*snapshot).clone(), constraints, params);
    Ok(Json(SubmitResponse { job_id }))
}

/// GET /v1/timetable/jobs/:id
async fn job_status_handler(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<JobStatus>, (StatusCode, String)> {
    state.jobs.status(id).map(Json).map_err(http_error)
}

/// POST /v1/timetable/jobs/:id/cancel
/// The run finishes with the best candidate found so far.
async fn cancel_handler(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state.jobs.cancel(id).map_err(http_error)?;
    Ok(Json(json!({"status": "cancelling"})))
}

/// POST /v1/timetable/commit
/// Persists a completed job's timetable, replacing any prior schedule for the
/// same classes in one transaction, then drops the school's cached snapshots.
async fn commit_handler(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> Result<Json<CommitResponse>, (StatusCode, String)> {
    let result = state.jobs.result(request.job_id).map_err(http_error)?;
    let count = state
        .repository
        .replace_schedule(&result, request.school_id, &request.actor)
        .map_err(http_error)?;
    state.cache.invalidate(request.school_id);
    Ok(Json(CommitResponse { count }))
}

/// GET /v1/timetable
/// Read/export path. Query parameters: `schoolId` (required), optional
/// `classId`, `teacherId`, `day`, `include` (comma list of
/// class,subject,teacher) and `format` (`json` default, `csv`).
async fn timetable_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, (StatusCode, String)> {
    let school_id = parse_required(&query, "schoolId")?;
    let filters = QueryFilters {
        class_id: parse_optional(&query, "classId")?,
        teacher_id: parse_optional(&query, "teacherId")?,
        day: parse_optional(&query, "day")?,
        include: query
            .get("include")
            .map(|list| RelationSet::parse(list))
            .unwrap_or_default(),
    };

    let rows = state
        .repository
        .query(school_id, &filters)
        .map_err(http_error)?;

    match query.get("format").map(String::as_str) {
        Some("csv") => Ok((
            [(header::CONTENT_TYPE, "text/csv")],
            export::to_csv(&rows),
        )
            .into_response()),
        None | Some("json") => {
            let body = export::to_json(&rows)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response())
        }
        Some(other) => Err((
            StatusCode::BAD_REQUEST,
            format!("unsupported format '{other}' (expected json or csv)"),
        )),
    }
}

fn parse_required<T: std::str::FromStr>(
    query: &HashMap<String, String>,
    key: &str,
) -> Result<T, (StatusCode, String)> {
    parse_optional(query, key)?
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("{key} is required")))
}

fn parse_optional<T: std::str::FromStr>(
    query: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, (StatusCode, String)> {
    match query.get(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid {key}: {raw}"))),
        _ => Ok(None),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/timetable/generate", post(generate_handler))
        .route("/v1/timetable/jobs/:id", get(job_status_handler))
        .route("/v1/timetable/jobs/:id/cancel", post(cancel_handler))
        .route("/v1/timetable/commit", post(commit_handler))
        .route("/v1/timetable", get(timetable_handler))
        .with_state(state)
}

pub async fn run_server(state: AppState, bind_addr: &str) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    println!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}
