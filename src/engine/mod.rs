//! Media engine seam
//!
//! Everything that actually extracts, downloads, muxes or transcodes media is
//! delegated to an external engine. The rest of the crate talks to it through
//! [`MediaEngine`] so the job machinery can be driven by a fake in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::jobs::ProgressEvent;

#[cfg(test)]
pub(crate) mod fake;
mod ytdlp;

pub use ytdlp::YtDlp;

/// Format selector that extracts audio only
pub const AUDIO_ONLY_FORMAT: &str = "bestaudio/best";
/// Default selector offered first in the quality list
pub const BEST_FORMAT: &str = "bestvideo+bestaudio[ext=m4a]/bestvideo+bestaudio/best";
/// Selector used by the command line for video downloads
pub const CLI_VIDEO_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("could not parse engine output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One download request handed to the engine
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Engine format selector, e.g. [`AUDIO_ONLY_FORMAT`]
    pub format: String,
    pub output_dir: PathBuf,
    /// File name without extension; `None` names the file after the media title
    pub file_stem: Option<String>,
    /// Bitrate in kbit/s used when extracting audio
    pub audio_quality: u32,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, format: impl Into<String>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            url: url.into(),
            format: format.into(),
            output_dir: output_dir.as_ref().to_path_buf(),
            file_stem: None,
            audio_quality: 320,
        }
    }

    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = Some(stem.into());
        self
    }

    pub fn with_audio_quality(mut self, kbps: u32) -> Self {
        self.audio_quality = kbps;
        self
    }

    pub fn is_audio_only(&self) -> bool {
        self.format == AUDIO_ONLY_FORMAT
    }
}

/// What the engine reports back after a successful run
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Final path as printed by the engine, when it printed one
    pub reported_path: Option<PathBuf>,
}

/// A quality choice offered to the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatOption {
    pub format_id: String,
    pub label: String,
}

/// Subset of a probed format the quality list is built from
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbedFormat {
    pub ext: Option<String>,
    pub format_note: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
}

#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// List the formats available for `url`
    async fn probe(&self, url: &str) -> Result<Vec<ProbedFormat>, EngineError>;

    /// Download `request`, pushing progress into `events` while it runs.
    ///
    /// `events` is dropped when the call returns, which closes the channel.
    async fn fetch(
        &self,
        request: &FetchRequest,
        events: mpsc::Sender<ProgressEvent>,
    ) -> Result<FetchOutcome, EngineError>;
}

/// Collapse the raw format list into the short quality menu shown in the UI
pub fn simplify_formats(formats: &[ProbedFormat]) -> Vec<FormatOption> {
    let mut heights: Vec<u32> = Vec::new();
    let mut has_audio = false;

    for format in formats {
        let storyboard = format
            .format_note
            .as_deref()
            .is_some_and(|note| note.to_lowercase().contains("storyboard"));
        if format.ext.as_deref() == Some("mhtml") || storyboard {
            continue;
        }
        if format.vcodec.as_deref() != Some("none") {
            if let Some(height) = format.height {
                if !heights.contains(&height) {
                    heights.push(height);
                }
            }
        }
        if format.acodec.as_deref() != Some("none") {
            has_audio = true;
        }
    }

    heights.sort_unstable_by(|a, b| b.cmp(a));

    let mut options = vec![FormatOption {
        format_id: BEST_FORMAT.to_string(),
        label: "Highest Available Quality (Default)".to_string(),
    }];

    options.extend(heights.iter().map(|h| FormatOption {
        format_id: format!(
            "bestvideo[height<={h}]+bestaudio[ext=m4a]/bestvideo[height<={h}]+bestaudio/best[height<={h}]"
        ),
        label: format!("{h}p Standard Video"),
    }));

    if has_audio || heights.is_empty() {
        options.push(FormatOption {
            format_id: AUDIO_ONLY_FORMAT.to_string(),
            label: "Audio Only (MP3/M4A)".to_string(),
        });
    }

    options
}
