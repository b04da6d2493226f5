//! Command line entry point
//!
//! Runs a single image query or video download in the foreground, logging
//! progress as it goes. Failures are returned so the process exits non-zero.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::{EngineConfig, SearchConfig};
use crate::engine::{AUDIO_ONLY_FORMAT, CLI_VIDEO_FORMAT, FetchRequest, MediaEngine};
use crate::jobs::{JobSlot, JobStatus, run_job};

/// Bitrate used when the CLI extracts audio
pub const CLI_AUDIO_QUALITY: u32 = 192;

#[derive(Parser, Debug)]
#[clap(
    name = "mediafetch-cli",
    about = "Media Fetcher CLI - Download Images from Google or Videos from YouTube",
    after_help = "Examples:\n  mediafetch-cli images \"cute dogs\"\n  mediafetch-cli video https://www.youtube.com/watch?v=dQw4w9WgXcQ"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,

    #[clap(flatten)]
    pub engine: EngineConfig,

    #[clap(flatten)]
    pub search: SearchConfig,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download images using SerpApi
    Images {
        /// Search query (e.g. 'funny cats')
        query: String,

        /// Number of images to fetch
        #[clap(short = 'n', long, default_value_t = 10)]
        number: usize,

        /// Output directory
        #[clap(short, long, default_value = "images")]
        dir: PathBuf,
    },
    /// Download a video using yt-dlp
    Video {
        /// URL of the video to download
        url: String,

        /// Download audio only (extracts mp3)
        #[clap(short, long)]
        audio: bool,

        /// Output directory
        #[clap(short, long, default_value = "videos")]
        dir: PathBuf,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Images { query, number, dir } => {
            fetch_images(&cli.search, &query, number, &dir).await?;
        }
        Command::Video { url, audio, dir } => {
            let engine: Arc<dyn MediaEngine> = Arc::new(cli.engine.engine());
            fetch_video(engine, &url, audio, &dir).await?;
        }
    }
    Ok(())
}

async fn fetch_images(search: &SearchConfig, query: &str, number: usize, dir: &Path) -> Result<usize> {
    info!("Starting Image Fetcher for: '{query}'");
    let fetcher = search.fetcher()?;
    let batch = fetcher.download(query, dir, number).await?;

    if batch.saved.is_empty() {
        warn!("No images found or retrieved for '{query}'");
    } else {
        info!(
            folder = %batch.folder.display(),
            "Successfully downloaded {} images for '{query}'",
            batch.saved.len()
        );
    }
    Ok(batch.saved.len())
}

/// Request for a title-named CLI download
pub fn video_request(url: &str, audio_only: bool, dir: &Path) -> FetchRequest {
    let format = if audio_only { AUDIO_ONLY_FORMAT } else { CLI_VIDEO_FORMAT };
    FetchRequest::new(url, format, dir).with_audio_quality(CLI_AUDIO_QUALITY)
}

/// Run one download in the foreground and return the produced file
pub async fn fetch_video(
    engine: Arc<dyn MediaEngine>,
    url: &str,
    audio_only: bool,
    dir: &Path,
) -> Result<PathBuf> {
    info!("Starting Video Fetcher for: '{url}'");
    tokio::fs::create_dir_all(dir).await?;

    let slot = Arc::new(JobSlot::new());
    let mut updates = slot.subscribe();
    let job = tokio::spawn(run_job(
        Ulid::new(),
        engine,
        video_request(url, audio_only, dir),
        slot.clone(),
    ));

    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.message != last && !state.status.is_terminal() {
                info!(progress = %format!("{:.1}%", state.progress), "{}", state.message);
                last = state.message;
            }
            if state.status.is_terminal() {
                break;
            }
        }
    });

    job.await?;
    printer.abort();

    let state = slot.read();
    match (state.status, state.file_path) {
        (JobStatus::Done, Some(path)) => {
            info!("Saved: {}", path.display());
            Ok(path)
        }
        _ => Err(eyre!(
            "Download failed: {}",
            state.error.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}
