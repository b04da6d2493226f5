//! Lock-guarded holder of a single job's state
//!
//! A slot is backed by a `watch` channel: the sender owns the value behind
//! its internal read/write lock, so readers always see a complete snapshot and
//! subscribers get woken on every change.

use std::path::PathBuf;

use tokio::sync::watch;
use tracing::trace;

use super::models::{JobState, JobStatus, JobUpdate};

#[derive(Debug)]
pub struct JobSlot {
    tx: watch::Sender<JobState>,
}

impl Default for JobSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl JobSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(JobState::default());
        Self { tx }
    }

    /// Immutable copy of the current state
    pub fn read(&self) -> JobState {
        self.tx.borrow().clone()
    }

    /// Put the slot back to the idle defaults
    pub fn reset(&self) {
        self.tx.send_replace(JobState::default());
    }

    /// Merge `update` into the current state
    pub fn update(&self, update: JobUpdate) {
        self.tx.send_modify(|state| state.apply(update));
    }

    /// Run `f` against the state under the lock.
    ///
    /// `f` returns `None` to leave the state untouched; subscribers are only
    /// notified when an update was actually applied.
    pub fn update_with<F>(&self, f: F)
    where
        F: FnOnce(&JobState) -> Option<JobUpdate>,
    {
        self.tx.send_if_modified(|state| match f(state) {
            Some(update) => {
                state.apply(update);
                true
            }
            None => false,
        });
    }

    pub fn complete(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        trace!(path = ?path, "Marking job complete");
        self.update(
            JobUpdate::new()
                .progress(100.0)
                .status(JobStatus::Done)
                .message("Download complete!")
                .file_path(path),
        );
    }

    pub fn fail(&self, error: impl ToString) {
        let error = error.to_string();
        trace!(error = %error, "Marking job failed");
        self.update(
            JobUpdate::new()
                .status(JobStatus::Error)
                .message(format!("Error: {error}"))
                .error(error),
        );
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.tx.subscribe()
    }

    /// Wait until the job reaches `done` or `error` and return that snapshot
    pub async fn wait_until_done(&self) -> JobState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| state.status.is_terminal()).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so the channel cannot close while we wait
            Err(_) => self.read(),
        }
    }
}
