//! Folding of engine progress events into job state
//!
//! The download phase maps onto the `0..=90` band. Post-processing has no
//! progress signal from the engine and is pinned at 92%.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, trace};

use super::models::{JobStatus, JobUpdate, ProgressEvent};
use super::slot::JobSlot;

/// Upper bound of the download band
pub const DOWNLOAD_BAND_MAX: f64 = 90.0;
/// Checkpoint reported while the engine merges/transcodes
pub const MERGE_CHECKPOINT: f64 = 92.0;

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9.]+").expect("valid percent pattern"));
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid escape pattern"));

/// Extract the first number from engine percentage text such as `" 45.2%"`.
///
/// Returns `None` when the text carries no parsable number.
pub fn parse_percent(text: &str) -> Option<f64> {
    let plain = ANSI_ESCAPE.replace_all(text, "");
    let number = PERCENT.find(&plain)?;
    number.as_str().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Scale a raw download percentage into the download band
pub fn scale_download_percent(raw: f64) -> f64 {
    (raw * 0.9).min(DOWNLOAD_BAND_MAX)
}

pub struct ProgressReporter {
    slot: Arc<JobSlot>,
    last_milestone: u8,
}

impl ProgressReporter {
    pub fn new(slot: Arc<JobSlot>) -> Self {
        Self {
            slot,
            last_milestone: 0,
        }
    }

    pub fn handle(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Downloading { percent } => {
                let Some(raw) = parse_percent(percent) else {
                    trace!(text = %percent, "Ignoring unparsable progress text");
                    return;
                };
                let scaled = scale_download_percent(raw);

                self.slot.update_with(|state| {
                    // A second stream (audio after video) must not pull the job
                    // back out of the merge phase
                    if state.status == JobStatus::Merging {
                        return None;
                    }
                    Some(
                        JobUpdate::new()
                            .progress(scaled)
                            .status(JobStatus::Downloading)
                            .message("Downloading..."),
                    )
                });
                self.log_milestone(raw);
            }
            ProgressEvent::Finished => {
                debug!("Download stage finished, merging");
                self.slot.update(
                    JobUpdate::new()
                        .progress(MERGE_CHECKPOINT)
                        .status(JobStatus::Merging)
                        .message("Merging audio & video..."),
                );
            }
        }
    }

    fn log_milestone(&mut self, raw: f64) {
        let milestone = ((raw.clamp(0.0, 100.0) / 25.0).floor() as u8) * 25;
        if milestone > self.last_milestone {
            self.last_milestone = milestone;
            info!(
                percentage = format_args!("{:.1}%", raw),
                "Download milestone"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::models::JobState;

    fn reporter() -> (Arc<JobSlot>, ProgressReporter) {
        let slot = Arc::new(JobSlot::new());
        let reporter = ProgressReporter::new(slot.clone());
        (slot, reporter)
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent(" 45.2%"), Some(45.2));
        assert_eq!(parse_percent("100%"), Some(100.0));
        assert_eq!(parse_percent("\x1b[0;94m 12.5%\x1b[0m"), Some(12.5));
        assert_eq!(parse_percent("N/A"), None);
        assert_eq!(parse_percent(""), None);
        assert_eq!(parse_percent("1.2.3%"), None);
    }

    #[test]
    fn test_scaling_stays_in_download_band() {
        for step in 0..=1000 {
            let p = step as f64 / 10.0;
            let scaled = scale_download_percent(p);
            assert_eq!(scaled, (p * 0.9).min(90.0));
            assert!(scaled <= DOWNLOAD_BAND_MAX);
        }
        assert_eq!(scale_download_percent(250.0), 90.0);
    }

    #[test]
    fn test_finished_moves_to_merging_regardless_of_progress() {
        for start in ["0%", "12.5%", "100%"] {
            let (slot, mut reporter) = reporter();
            reporter.handle(&ProgressEvent::downloading(start));
            reporter.handle(&ProgressEvent::Finished);

            let state = slot.read();
            assert_eq!(state.status, JobStatus::Merging);
            assert_eq!(state.progress, MERGE_CHECKPOINT);
            assert_eq!(state.message, "Merging audio & video...");
        }
    }

    #[test]
    fn test_unparsable_text_leaves_state_unchanged() {
        let (slot, mut reporter) = reporter();
        reporter.handle(&ProgressEvent::downloading("20%"));
        let before = slot.read();

        reporter.handle(&ProgressEvent::downloading("Unknown%"));
        reporter.handle(&ProgressEvent::downloading("..."));
        assert_eq!(slot.read(), before);
    }

    #[test]
    fn test_second_stream_does_not_leave_merging() {
        let (slot, mut reporter) = reporter();
        reporter.handle(&ProgressEvent::downloading("100%"));
        reporter.handle(&ProgressEvent::Finished);
        reporter.handle(&ProgressEvent::downloading("3.0%"));

        let state = slot.read();
        assert_eq!(state.status, JobStatus::Merging);
        assert_eq!(state.progress, MERGE_CHECKPOINT);
    }

    #[test]
    fn test_audio_job_snapshot_sequence() {
        let (slot, mut reporter) = reporter();
        let mut seen: Vec<(JobStatus, f64)> = Vec::new();

        for event in [
            ProgressEvent::downloading("0%"),
            ProgressEvent::downloading("50%"),
            ProgressEvent::downloading("100%"),
            ProgressEvent::Finished,
        ] {
            reporter.handle(&event);
            let JobState {
                status, progress, ..
            } = slot.read();
            seen.push((status, progress));
        }

        assert_eq!(
            seen,
            vec![
                (JobStatus::Downloading, 0.0),
                (JobStatus::Downloading, 45.0),
                (JobStatus::Downloading, 90.0),
                (JobStatus::Merging, 92.0),
            ]
        );

        slot.complete("x.mp3");
        let done = slot.read();
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.progress, 100.0);
        assert_eq!(done.file_path, Some("x.mp3".into()));
    }
}
