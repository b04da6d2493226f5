//! Form handlers behind the UI shell

use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use super::templates::{FlashCategory, Page};
use super::{AppState, MfRes, send_file};
use crate::engine::simplify_formats;
use crate::jobs::JobError;

/// Bounds for the number of images fetched per query
const MAX_IMAGE_COUNT: usize = 100;
const DEFAULT_IMAGE_COUNT: usize = 10;

fn page_response(status: StatusCode, page: Page) -> MfRes<Response> {
    Ok((status, page.render()?).into_response())
}

pub async fn index() -> MfRes<Html<String>> {
    Ok(Page::default().render()?)
}

#[derive(Debug, Deserialize)]
pub struct VideoForm {
    pub url: Option<String>,
    pub action: Option<String>,
    pub format: Option<String>,
}

pub async fn handle_video(State(state): State<AppState>, Form(form): Form<VideoForm>) -> MfRes<Response> {
    let url = form.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return page_response(
            StatusCode::BAD_REQUEST,
            Page::default().flash(FlashCategory::Error, "Please provide a valid YouTube URL."),
        );
    }

    match form.action.as_deref() {
        Some("fetch") => fetch_formats(&state, url).await,
        Some("download") => {
            let format = form.format.as_deref().map(str::trim).unwrap_or_default();
            if format.is_empty() {
                return page_response(
                    StatusCode::BAD_REQUEST,
                    Page::default().flash(FlashCategory::Error, "Please select a format to download."),
                );
            }
            start_download(&state, url, format)
        }
        other => {
            warn!(action = ?other, "Unknown video action");
            page_response(
                StatusCode::BAD_REQUEST,
                Page::default().flash(FlashCategory::Error, "Unknown action."),
            )
        }
    }
}

async fn fetch_formats(state: &AppState, url: &str) -> MfRes<Response> {
    let engine = state.jobs.engine();
    match engine.probe(url).await {
        Ok(formats) => {
            let page = Page {
                url: url.to_string(),
                formats: simplify_formats(&formats),
                ..Default::default()
            };
            page_response(StatusCode::OK, page)
        }
        Err(e) => {
            warn!(url, error = %e, "Failed to fetch video details");
            page_response(
                StatusCode::BAD_GATEWAY,
                Page::default().flash(FlashCategory::Error, format!("Failed to fetch video details: {e}")),
            )
        }
    }
}

fn start_download(state: &AppState, url: &str, format: &str) -> MfRes<Response> {
    match state.jobs.start(url, format) {
        Ok(id) => {
            info!(id = %id, url, "Download started");
            let page = Page {
                url: url.to_string(),
                waiting: true,
                job_id: Some(id.to_string()),
                ..Default::default()
            };
            page_response(StatusCode::OK, page)
        }
        Err(JobError::Busy(running)) => page_response(
            StatusCode::CONFLICT,
            Page {
                url: url.to_string(),
                ..Default::default()
            }
            .flash(
                FlashCategory::Warning,
                format!("Another download ({running}) is still in progress."),
            ),
        ),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ImagesForm {
    pub query: Option<String>,
    pub count: Option<String>,
}

impl ImagesForm {
    fn count(&self) -> usize {
        self.count
            .as_deref()
            .and_then(|c| c.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_IMAGE_COUNT)
            .clamp(1, MAX_IMAGE_COUNT)
    }
}

/// Search, download and zip synchronously, answering with the archive
pub async fn handle_images(State(state): State<AppState>, Form(form): Form<ImagesForm>) -> MfRes<Response> {
    let query = form.query.as_deref().map(str::trim).unwrap_or_default();
    let count = form.count();

    if query.is_empty() {
        return page_response(
            StatusCode::BAD_REQUEST,
            Page::images().flash(FlashCategory::Error, "Please provide a search query."),
        );
    }

    let page = Page {
        query: query.to_string(),
        count,
        ..Page::images()
    };

    match state.images.download_archive(query, &state.image_dir, count).await {
        Ok(Some(zip)) => send_file(&zip).await,
        Ok(None) => page_response(
            StatusCode::OK,
            page.flash(FlashCategory::Warning, "No images found for that query."),
        ),
        Err(e) => {
            warn!(query, error = %e, "Image fetch failed");
            page_response(
                StatusCode::BAD_GATEWAY,
                page.flash(FlashCategory::Error, format!("Error fetching images: {e}")),
            )
        }
    }
}
