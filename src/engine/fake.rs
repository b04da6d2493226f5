//! Scripted engine for tests

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};

use super::{EngineError, FetchOutcome, FetchRequest, MediaEngine, ProbedFormat};
use crate::jobs::ProgressEvent;

/// Replays a fixed event list, optionally takes one permit from `gate`, then writes
/// `<stem>.<extension>` or fails with `failure`. Requests without a stem get
/// a title-named file whose path is reported back.
#[derive(Clone, Default)]
pub struct FakeEngine {
    pub events: Vec<ProgressEvent>,
    pub extension: Option<&'static str>,
    pub failure: Option<&'static str>,
    pub gate: Option<Arc<Semaphore>>,
    pub formats: Vec<ProbedFormat>,
}

impl FakeEngine {
    /// Audio job that reports 0%, 50%, 100%, finished and produces an mp3
    pub fn audio() -> Self {
        Self {
            events: vec![
                ProgressEvent::downloading("0.0%"),
                ProgressEvent::downloading("50.0%"),
                ProgressEvent::downloading("100%"),
                ProgressEvent::Finished,
            ],
            extension: Some("mp3"),
            ..Default::default()
        }
    }

    pub fn failing(message: &'static str) -> Self {
        Self {
            events: vec![ProgressEvent::downloading("12%")],
            failure: Some(message),
            ..Default::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn probe(&self, url: &str) -> Result<Vec<ProbedFormat>, EngineError> {
        if let Some(message) = self.failure {
            return Err(EngineError::Failed(format!("{message} ({url})")));
        }
        Ok(self.formats.clone())
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        events: mpsc::Sender<ProgressEvent>,
    ) -> Result<FetchOutcome, EngineError> {
        for event in &self.events {
            let _ = events.send(event.clone()).await;
        }
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(message) = self.failure {
            return Err(EngineError::Failed(message.to_string()));
        }
        let Some(ext) = self.extension else {
            return Ok(FetchOutcome::default());
        };

        // Title-named requests learn their path from the engine, like yt-dlp's after_move print
        let stem = request.file_stem.as_deref().unwrap_or("Fake Title");
        let path = request.output_dir.join(format!("{stem}.{ext}"));
        tokio::fs::create_dir_all(&request.output_dir).await?;
        tokio::fs::write(&path, b"media bytes").await?;

        Ok(FetchOutcome {
            reported_path: request.file_stem.is_none().then_some(path),
        })
    }
}
