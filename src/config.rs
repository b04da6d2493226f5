//! Config module for mediafetch

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::engine::YtDlp;
use crate::images::{ImageFetcher, ImageSearchClient};
use crate::jobs::JobPolicy;

/// Settings for the external media engine, shared with the CLI.
///
/// Flags are global so the CLI accepts them after a subcommand.
#[derive(Parser, Debug, Clone)]
pub struct EngineConfig {
    /// Path or name of the yt-dlp executable
    #[clap(long, global = true, env = "MF_YTDLP_PATH", default_value = "yt-dlp")]
    pub ytdlp_path: PathBuf,

    /// Directory or binary passed to yt-dlp as the ffmpeg location
    #[clap(long, global = true, env = "MF_FFMPEG_PATH")]
    pub ffmpeg_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn engine(&self) -> YtDlp {
        YtDlp::new(&self.ytdlp_path).with_ffmpeg(self.ffmpeg_path.clone())
    }
}

/// Settings for the image search collaborator, shared with the CLI
#[derive(Parser, Debug, Clone)]
pub struct SearchConfig {
    /// SerpApi key; image search is refused without one
    #[clap(long, global = true, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[clap(long, global = true, env = "MF_SERPAPI_URL", default_value = "https://serpapi.com/search.json")]
    pub serpapi_url: String,

    /// Timeout in seconds for the search request and each image download
    #[clap(long, global = true, env = "MF_IMAGE_TIMEOUT", default_value_t = 10)]
    pub image_timeout: u64,
}

impl SearchConfig {
    pub fn fetcher(&self) -> Result<ImageFetcher, crate::images::ImageError> {
        let timeout = Duration::from_secs(self.image_timeout);
        let search = ImageSearchClient::new(&self.serpapi_url, self.api_key.clone(), timeout)?;
        ImageFetcher::new(search, timeout)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct Config {
    #[clap(long, env = "MF_HOST", default_value = "127.0.0.1:5000")]
    pub host: String,

    /// Where web downloads are stored
    #[clap(long, env = "MF_VIDEO_DIR", default_value = "videos")]
    pub video_dir: PathBuf,

    /// Where image sets and their archives are stored
    #[clap(long, env = "MF_IMAGE_DIR", default_value = "images")]
    pub image_dir: PathBuf,

    /// Allow starting a download while another one is still running
    #[clap(long, env = "MF_CONCURRENT_JOBS", default_value = "false")]
    pub concurrent_jobs: bool,

    /// Finished jobs kept in memory besides the latest one
    #[clap(long, env = "MF_JOB_HISTORY", default_value_t = 20)]
    pub job_history: usize,

    #[clap(flatten)]
    pub engine: EngineConfig,

    #[clap(flatten)]
    pub search: SearchConfig,
}

impl Config {
    pub fn job_policy(&self) -> JobPolicy {
        JobPolicy {
            allow_concurrent: self.concurrent_jobs,
            history: self.job_history,
        }
    }

    /// Create the output roots if they do not exist yet
    pub fn prepare_dirs(&self) -> std::io::Result<()> {
        ensure_dir(&self.video_dir)?;
        ensure_dir(&self.image_dir)
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        tracing::debug!("Directory '{}' already exists, skipping...", dir.display());
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    tracing::info!("Directory '{}' does not exist, created", dir.display());
    Ok(())
}

pub fn config() -> Config {
    Config::parse()
}
