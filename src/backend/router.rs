use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::ErrorResponse;
use super::api::api_router;
use super::pages;
use crate::images::ImageFetcher;
use crate::jobs::JobRegistry;

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobRegistry>,
    pub images: Arc<ImageFetcher>,
    pub image_dir: PathBuf,
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not Found".to_string(),
        }),
    )
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/video", post(pages::handle_video))
        .route("/images", post(pages::handle_images))
        .nest("/api", api_router())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use tokio::sync::Semaphore;
    use tower::ServiceExt;
    use ulid::Ulid;

    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::engine::{AUDIO_ONLY_FORMAT, ProbedFormat};
    use crate::images::ImageSearchClient;
    use crate::jobs::{JobPolicy, JobStatus};

    fn state(engine: FakeEngine, dir: &Path) -> AppState {
        let search =
            ImageSearchClient::new("http://127.0.0.1:9/search.json", None, Duration::from_secs(1)).unwrap();
        AppState {
            jobs: Arc::new(JobRegistry::new(
                Arc::new(engine),
                dir.join("videos"),
                JobPolicy::default(),
            )),
            images: Arc::new(ImageFetcher::new(search, Duration::from_secs(1)).unwrap()),
            image_dir: dir.join("images"),
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, String) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_renders() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(&state(FakeEngine::audio(), dir.path()), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Media Fetcher"));
        assert!(body.contains(r#"value="fetch""#));
    }

    #[tokio::test]
    async fn test_progress_before_any_job() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(FakeEngine::audio(), dir.path());

        let (status, body) = send(&state, get("/api/progress")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["id"], serde_json::Value::Null);
        assert_eq!(json["status"], "idle");
        assert_eq!(json["progress"], 0.0);
        assert_eq!(json["message"], "");
        assert_eq!(json["error"], serde_json::Value::Null);

        let (status, body) = send(&state, get("/api/download-file")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "File not ready");
    }

    #[tokio::test]
    async fn test_download_flow() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(FakeEngine::audio(), dir.path());

        let (status, body) = send(
            &state,
            form("/video", "url=https%3A%2F%2Fexample.com%2Fv&action=download&format=bestaudio%2Fbest"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let id = state.jobs.latest().unwrap().unwrap();
        assert!(body.contains(&format!(r#"data-job-id="{id}""#)));
        assert_eq!(state.jobs.wait(id).await.unwrap().status, JobStatus::Done);

        let (status, body) = send(&state, get(&format!("/api/progress?id={id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["id"], id.to_string());
        assert_eq!(json["status"], "done");
        assert_eq!(json["progress"], 100.0);
        assert_eq!(json["message"], "Download complete!");

        let response = create_router(state.clone())
            .oneshot(get("/api/download-file"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            format!("attachment; filename=\"{id}.mp3\"")
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"media bytes");

        let (status, body) = send(&state, get("/api/jobs")).await;
        assert_eq!(status, StatusCode::OK);
        let jobs: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        assert_eq!(jobs[0]["format"], AUDIO_ONLY_FORMAT);
        assert_eq!(jobs[0]["state"]["status"], "done");
    }

    #[tokio::test]
    async fn test_failed_job_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(FakeEngine::failing("NetworkError: timeout"), dir.path());

        send(&state, form("/video", "url=https%3A%2F%2Fexample.com%2Fv&action=download&format=best")).await;
        let id = state.jobs.latest().unwrap().unwrap();
        state.jobs.wait(id).await.unwrap();

        let (_, body) = send(&state, get("/api/progress")).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["error"].as_str().unwrap().contains("timeout"));

        let (status, body) = send(&state, get(&format!("/api/download-file?id={id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "File not ready");
    }

    #[tokio::test]
    async fn test_busy_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let state = state(FakeEngine::audio().gated(gate.clone()), dir.path());
        let request = "url=https%3A%2F%2Fexample.com%2Fv&action=download&format=best";

        let (status, _) = send(&state, form("/video", request)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&state, form("/video", request)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.contains("still in progress"));

        gate.add_permits(1);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(FakeEngine::audio(), dir.path());

        let (status, body) = send(&state, get(&format!("/api/progress?id={}", Ulid::new()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("not found"));

        let (status, _) = send(&state, get("/api/progress?id=nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, get(&format!("/api/jobs/{}", Ulid::new()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, get("/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_lists_formats() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            formats: vec![
                ProbedFormat {
                    vcodec: Some("avc1".into()),
                    acodec: Some("none".into()),
                    height: Some(720),
                    ..Default::default()
                },
                ProbedFormat {
                    vcodec: Some("none".into()),
                    acodec: Some("opus".into()),
                    ..Default::default()
                },
            ],
            ..FakeEngine::audio()
        };
        let state = state(engine, dir.path());

        let (status, body) = send(&state, form("/video", "url=https%3A%2F%2Fexample.com%2Fv&action=fetch")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Highest Available Quality (Default)"));
        assert!(body.contains("720p Standard Video"));
        assert!(body.contains("Audio Only"));
        assert!(state.jobs.latest().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_form_validation() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(FakeEngine::audio(), dir.path());

        let (status, body) = send(&state, form("/video", "url=&action=fetch")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Please provide a valid YouTube URL."));

        let (status, body) = send(&state, form("/video", "url=https%3A%2F%2Fexample.com&action=download")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Please select a format to download."));

        let (status, body) = send(&state, form("/images", "query=&count=5")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Please provide a search query."));
    }

    #[tokio::test]
    async fn test_images_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(FakeEngine::audio(), dir.path());

        let (status, body) = send(&state, form("/images", "query=cats&count=3")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("Error fetching images: API_KEY not found"));
    }
}
