//! Job registry
//!
//! Jobs are keyed by ULID so several can be tracked at once. The registry
//! also remembers the most recently started job, which is what the progress
//! and result endpoints fall back to when the caller does not name one.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ulid::{Generator, Ulid};

use super::JobError;
use super::models::{JobState, JobStatus};
use super::runner::run_job;
use super::slot::JobSlot;
use crate::engine::{FetchRequest, MediaEngine};

/// How many jobs may run and how many finished ones are kept around
#[derive(Debug, Clone, Copy)]
pub struct JobPolicy {
    /// Allow a new job while another is still running
    pub allow_concurrent: bool,
    /// Finished jobs kept besides the latest one
    pub history: usize,
}

impl Default for JobPolicy {
    fn default() -> Self {
        Self {
            allow_concurrent: false,
            history: 20,
        }
    }
}

/// Public view of one job, as listed by the API
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: Ulid,
    pub url: String,
    pub format: String,
    pub created_at: DateTime<Utc>,
    pub state: JobState,
}

#[derive(Debug)]
struct JobRecord {
    url: String,
    format: String,
    created_at: DateTime<Utc>,
    slot: Arc<JobSlot>,
    handle: JoinHandle<()>,
}

impl JobRecord {
    /// A task that died without writing a terminal state no longer counts
    fn is_running(&self) -> bool {
        !self.slot.read().status.is_terminal() && !self.handle.is_finished()
    }

    fn summary(&self, id: Ulid) -> JobSummary {
        JobSummary {
            id,
            url: self.url.clone(),
            format: self.format.clone(),
            created_at: self.created_at,
            state: self.slot.read(),
        }
    }
}

struct JobTable {
    records: BTreeMap<Ulid, JobRecord>,
    latest: Option<Ulid>,
    /// Monotonic within a millisecond, so map order is start order
    ids: Generator,
}

impl JobTable {
    fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            latest: None,
            ids: Generator::new(),
        }
    }

    fn next_id(&mut self) -> Ulid {
        self.ids.generate().unwrap_or_else(|_| Ulid::new())
    }

    fn running(&self) -> Option<Ulid> {
        self.records
            .iter()
            .find(|(_, record)| record.is_running())
            .map(|(id, _)| *id)
    }

    /// Drop the oldest finished jobs beyond `keep`. Returns how many were removed.
    fn prune(&mut self, keep: usize) -> usize {
        // ULIDs sort by creation time, so this is oldest first
        let finished: Vec<Ulid> = self
            .records
            .iter()
            .filter(|(id, record)| Some(**id) != self.latest && !record.is_running())
            .map(|(id, _)| *id)
            .collect();

        let excess = finished.len().saturating_sub(keep);
        for id in &finished[..excess] {
            self.records.remove(id);
            debug!(id = %id, "Pruned finished job");
        }
        excess
    }

    fn resolve(&self, id: Option<Ulid>) -> Result<Option<(Ulid, &JobRecord)>, JobError> {
        match id {
            Some(id) => self
                .records
                .get(&id)
                .map(|record| Some((id, record)))
                .ok_or(JobError::NotFound(id)),
            None => Ok(self
                .latest
                .and_then(|id| self.records.get(&id).map(|record| (id, record)))),
        }
    }
}

pub struct JobRegistry {
    engine: Arc<dyn MediaEngine>,
    output_dir: PathBuf,
    policy: JobPolicy,
    table: Mutex<JobTable>,
}

impl JobRegistry {
    pub fn new(engine: Arc<dyn MediaEngine>, output_dir: impl Into<PathBuf>, policy: JobPolicy) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
            policy,
            table: Mutex::new(JobTable::new()),
        }
    }

    pub fn engine(&self) -> Arc<dyn MediaEngine> {
        self.engine.clone()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Register a job for `url` and start it in the background.
    ///
    /// Unless concurrent jobs are allowed, this fails with [`JobError::Busy`]
    /// while another job is still running. The check and the insert happen
    /// under the same lock.
    pub fn start(&self, url: &str, format: &str) -> Result<Ulid, JobError> {
        let mut table = self.table.lock()?;

        if !self.policy.allow_concurrent {
            if let Some(running) = table.running() {
                warn!(id = %running, url, "Rejecting job while another is running");
                return Err(JobError::Busy(running));
            }
        }

        let id = table.next_id();
        let slot = Arc::new(JobSlot::new());
        let request = FetchRequest::new(url, format, &self.output_dir).with_file_stem(id.to_string());

        info!(id = %id, url, format, "Adding job to registry");
        let handle = tokio::spawn(run_job(id, self.engine.clone(), request, slot.clone()));

        table.records.insert(
            id,
            JobRecord {
                url: url.to_string(),
                format: format.to_string(),
                created_at: Utc::now(),
                slot,
                handle,
            },
        );
        table.latest = Some(id);

        // The previous latest job only counts as history once it is superseded
        let pruned = table.prune(self.policy.history);
        if pruned > 0 {
            debug!(pruned, "Cleaned up finished jobs");
        }

        Ok(id)
    }

    /// Id of the most recently started job
    pub fn latest(&self) -> Result<Option<Ulid>, JobError> {
        Ok(self.table.lock()?.latest)
    }

    /// State of job `id`, or of the latest job when `id` is `None`.
    ///
    /// Returns `None` when no job was ever started; an unknown `id` is an error.
    pub fn snapshot(&self, id: Option<Ulid>) -> Result<Option<(Ulid, JobState)>, JobError> {
        let table = self.table.lock()?;
        Ok(table.resolve(id)?.map(|(id, record)| (id, record.slot.read())))
    }

    /// The produced file, only once the job is `done` and the file still exists
    pub async fn artifact(&self, id: Option<Ulid>) -> Result<Option<PathBuf>, JobError> {
        let Some((id, state)) = self.snapshot(id)? else {
            return Ok(None);
        };

        if state.status != JobStatus::Done {
            return Ok(None);
        }
        let Some(path) = state.file_path else {
            return Ok(None);
        };

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Ok(Some(path))
        } else {
            warn!(id = %id, path = ?path, "Finished job's file is gone");
            Ok(None)
        }
    }

    /// Slot of job `id`, for callers that want to follow it
    pub fn slot(&self, id: Ulid) -> Result<Arc<JobSlot>, JobError> {
        let table = self.table.lock()?;
        table
            .records
            .get(&id)
            .map(|record| record.slot.clone())
            .ok_or(JobError::NotFound(id))
    }

    pub fn get(&self, id: Ulid) -> Result<JobSummary, JobError> {
        let table = self.table.lock()?;
        table
            .records
            .get(&id)
            .map(|record| record.summary(id))
            .ok_or(JobError::NotFound(id))
    }

    /// All tracked jobs, newest first
    pub fn list(&self) -> Result<Vec<JobSummary>, JobError> {
        let table = self.table.lock()?;
        Ok(table
            .records
            .iter()
            .rev()
            .map(|(id, record)| record.summary(*id))
            .collect())
    }

    /// Wait for job `id` to reach a terminal state
    pub async fn wait(&self, id: Ulid) -> Result<JobState, JobError> {
        let slot = self.slot(id)?;
        Ok(slot.wait_until_done().await)
    }
}
