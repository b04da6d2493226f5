//! HTTP layer: the UI pages and the JSON API

use std::path::Path;

use axum::{
    Json,
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::jobs::JobError;

pub mod api;
pub mod pages;
mod router;
pub mod templates;

pub use router::{AppState, create_router};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Invalid job id: {0}")]
    InvalidId(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::Job(JobError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Job(JobError::Busy(_)) => StatusCode::CONFLICT,
            Error::InvalidId(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type MfRes<T> = Result<T, Error>;

/// Stream `path` back as a download
pub async fn send_file(path: &Path) -> MfRes<Response> {
    let file = tokio::fs::File::open(path).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    let response = Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(body)?;

    Ok(response)
}
