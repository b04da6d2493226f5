//! JSON API polled by the UI

use axum::{
    Json, Router,
    extract::{Path as HttpPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::{AppState, Error, MfRes, send_file};
use crate::jobs::{JobState, JobStatus, JobSummary};

#[derive(Debug, Default, Deserialize)]
pub struct JobQuery {
    pub id: Option<String>,
}

impl JobQuery {
    /// `None` selects the latest job
    fn job_id(&self) -> MfRes<Option<Ulid>> {
        match self.id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Ulid::from_string(raw)
                .map(Some)
                .map_err(|_| Error::InvalidId(raw.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub id: Option<Ulid>,
    pub progress: f64,
    pub status: JobStatus,
    pub message: String,
    pub error: Option<String>,
}

impl ProgressResponse {
    fn new(id: Option<Ulid>, state: JobState) -> Self {
        Self {
            id,
            progress: state.progress,
            status: state.status,
            message: state.message,
            error: state.error,
        }
    }
}

/// Current snapshot of a job; idle defaults before any job has run
pub async fn progress(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> MfRes<Json<ProgressResponse>> {
    let snapshot = state.jobs.snapshot(query.job_id()?)?;
    let response = match snapshot {
        Some((id, job)) => ProgressResponse::new(Some(id), job),
        None => ProgressResponse::new(None, JobState::default()),
    };
    Ok(Json(response))
}

/// The finished job's file, or `404 File not ready`
pub async fn download_file(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> MfRes<Response> {
    match state.jobs.artifact(query.job_id()?).await? {
        Some(path) => send_file(&path).await,
        None => Ok((StatusCode::NOT_FOUND, "File not ready").into_response()),
    }
}

pub async fn list_jobs(State(state): State<AppState>) -> MfRes<Json<Vec<JobSummary>>> {
    Ok(Json(state.jobs.list()?))
}

pub async fn get_job(
    State(state): State<AppState>,
    HttpPath(id): HttpPath<String>,
) -> MfRes<Json<JobSummary>> {
    let id = Ulid::from_string(&id).map_err(|_| Error::InvalidId(id))?;
    Ok(Json(state.jobs.get(id)?))
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/progress", get(progress))
        .route("/download-file", get(download_file))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
}
