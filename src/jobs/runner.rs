//! Execution of a single job
//!
//! The engine runs on the job's task and pushes progress events into a bounded
//! channel. One folding task owns the [`ProgressReporter`] and is the only
//! writer of progress into the slot, so the engine's hot loop never contends
//! with readers. The terminal state is written after the folding task has
//! drained, so a late event can never overwrite it.

use std::sync::Arc;

use bytesize::ByteSize;
use tokio::sync::mpsc;
use tracing::{Instrument, Level, error, info, span, warn};
use ulid::Ulid;

use super::JobError;
use super::artifact;
use super::models::{JobStatus, JobUpdate, ProgressEvent};
use super::reporter::ProgressReporter;
use super::slot::JobSlot;
use crate::engine::{FetchRequest, MediaEngine};

/// Capacity of the engine → reporter channel
const PROGRESS_BUFFER: usize = 32;

/// Run `request` to completion, recording every phase in `slot`
pub async fn run_job(
    id: Ulid,
    engine: Arc<dyn MediaEngine>,
    request: FetchRequest,
    slot: Arc<JobSlot>,
) {
    let job_span = span!(Level::INFO, "job", id = %id, url = %request.url);

    async move {
        info!(engine = engine.name(), format = %request.format, "Starting job");
        slot.update(
            JobUpdate::new()
                .progress(0.0)
                .status(JobStatus::Downloading)
                .message("Starting download..."),
        );

        let (events_tx, mut events_rx) = mpsc::channel::<ProgressEvent>(PROGRESS_BUFFER);
        let mut reporter = ProgressReporter::new(slot.clone());
        let folder = tokio::spawn(
            async move {
                while let Some(event) = events_rx.recv().await {
                    reporter.handle(&event);
                }
            }
            .in_current_span(),
        );

        let result = engine.fetch(&request, events_tx).await;

        // The sender went away with the fetch call; wait for the backlog
        if let Err(e) = folder.await {
            warn!(error = %e, "Progress task ended abnormally");
        }

        let outcome = match result {
            Ok(outcome) => {
                match artifact::resolve(&request, outcome.reported_path.as_deref()).await {
                    Some(path) => Ok(path),
                    None => Err(JobError::ArtifactMissing(request.output_dir.clone())),
                }
            }
            Err(e) => Err(JobError::Engine(e)),
        };

        match outcome {
            Ok(path) => {
                let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
                info!(path = ?path, size = %ByteSize::b(size), "Job completed");
                slot.complete(path);
            }
            Err(e) => {
                error!(error = %e, "Job failed");
                slot.fail(&e);
            }
        }
    }
    .instrument(job_span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::engine::{AUDIO_ONLY_FORMAT, BEST_FORMAT};

    fn request(format: &str, dir: &std::path::Path, id: Ulid) -> FetchRequest {
        FetchRequest::new("https://example.com/watch?v=abc", format, dir).with_file_stem(id.to_string())
    }

    #[tokio::test]
    async fn test_successful_audio_job() {
        let dir = tempfile::tempdir().unwrap();
        let id = Ulid::new();
        let slot = Arc::new(JobSlot::new());

        run_job(
            id,
            Arc::new(FakeEngine::audio()),
            request(AUDIO_ONLY_FORMAT, dir.path(), id),
            slot.clone(),
        )
        .await;

        let state = slot.read();
        assert_eq!(state.status, JobStatus::Done);
        assert_eq!(state.progress, 100.0);
        assert_eq!(state.message, "Download complete!");
        let path = state.file_path.unwrap();
        assert_eq!(path, dir.path().join(format!("{id}.mp3")));
        assert!(path.exists());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_engine_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let id = Ulid::new();
        let slot = Arc::new(JobSlot::new());

        run_job(
            id,
            Arc::new(FakeEngine::failing("NetworkError: timeout")),
            request(BEST_FORMAT, dir.path(), id),
            slot.clone(),
        )
        .await;

        let state = slot.read();
        assert_eq!(state.status, JobStatus::Error);
        assert!(state.message.contains("timeout"));
        assert!(!state.error.unwrap_or_default().is_empty());
        assert!(state.file_path.is_none());
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let id = Ulid::new();
        let engine = FakeEngine {
            extension: Some("opus"),
            ..FakeEngine::audio()
        };
        let slot = Arc::new(JobSlot::new());

        run_job(id, Arc::new(engine), request(BEST_FORMAT, dir.path(), id), slot.clone()).await;

        let state = slot.read();
        assert_eq!(state.status, JobStatus::Error);
        assert!(state.error.unwrap().contains("not found"));
        assert!(state.file_path.is_none());
    }
}
