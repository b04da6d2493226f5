//! Background download jobs
//!
//! This module provides the job registry, per-job state tracking, and the
//! folding of engine progress events into that state.

use std::path::PathBuf;

use thiserror::Error;
use ulid::Ulid;

use crate::engine::EngineError;

pub mod artifact;
mod models;
mod registry;
mod reporter;
mod runner;
mod slot;

// Re-export the public API
pub use models::{JobState, JobStatus, JobUpdate, ProgressEvent};
pub use registry::{JobPolicy, JobRegistry, JobSummary};
pub use reporter::{ProgressReporter, parse_percent, scale_download_percent};
pub use runner::run_job;
pub use slot::JobSlot;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("job {0} is still running")]
    Busy(Ulid),

    #[error("job {0} not found")]
    NotFound(Ulid),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("downloaded file not found in {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Mutex lock error: {0}")]
    MutexError(String),
}

impl<T> From<std::sync::PoisonError<std::sync::MutexGuard<'_, T>>> for JobError {
    fn from(err: std::sync::PoisonError<std::sync::MutexGuard<'_, T>>) -> Self {
        JobError::MutexError(err.to_string())
    }
}
