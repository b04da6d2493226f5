//! Data structures for the job system
//!
//! This file contains the core data types used throughout the job system,
//! including the per-job state record, partial updates, and the progress
//! events emitted by the media engine.

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Phase of a job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job slot is empty or freshly reset
    #[default]
    Idle,
    /// The primary stream(s) are being fetched
    Downloading,
    /// The engine is muxing or transcoding the fetched streams
    Merging,
    /// The artifact exists on disk
    Done,
    /// The job failed
    Error,
}

impl JobStatus {
    /// `Done` and `Error` are only left through a reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Merging => "merging",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress, phase and outcome of one job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JobState {
    /// Percentage in `0.0..=100.0`
    pub progress: f64,
    pub status: JobStatus,
    /// Human readable text for the current phase
    pub message: String,
    /// Produced artifact, only while `status == Done`
    pub file_path: Option<PathBuf>,
    /// Failure description, only while `status == Error`
    pub error: Option<String>,
}

impl JobState {
    /// Merge a partial update into this state.
    ///
    /// Terminal states ignore updates, progress never moves backwards, and the
    /// `file_path`/`error` fields are cleared whenever the resulting status
    /// does not carry them.
    pub fn apply(&mut self, update: JobUpdate) {
        if self.status.is_terminal() {
            return;
        }

        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.clamp(0.0, 100.0));
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(path) = update.file_path {
            self.file_path = Some(path);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }

        if self.status != JobStatus::Done {
            self.file_path = None;
        }
        if self.status != JobStatus::Error {
            self.error = None;
        }
    }
}

/// A partial [`JobState`]; unset fields are left untouched by [`JobState::apply`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub progress: Option<f64>,
    pub status: Option<JobStatus>,
    pub message: Option<String>,
    pub file_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Low-level progress notification from the media engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A stream is downloading; `percent` is the engine's raw text, e.g. `" 45.2%"`
    Downloading { percent: String },
    /// The engine finished downloading a stream and moves on to post-processing
    Finished,
}

impl ProgressEvent {
    pub fn downloading(percent: impl Into<String>) -> Self {
        Self::Downloading {
            percent: percent.into(),
        }
    }
}
