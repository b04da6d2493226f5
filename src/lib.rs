//! mediafetch: a web UI and CLI that fetch videos through yt-dlp and image
//! sets through SerpApi, tracking each download as a background job.

pub mod backend;
pub mod cli;
pub mod config;
pub mod engine;
pub mod images;
pub mod jobs;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
