//! Resolution of the file a finished job produced
//!
//! The engine's final naming does not always match the template it was given
//! (remuxes and audio extraction change the extension), so the path is
//! resolved with a fixed, ordered policy where the first existing candidate
//! wins:
//!
//! 1. the path the engine printed after moving the file into place
//! 2. `<stem>.mp3` for audio-only jobs, `<stem>.mp4` otherwise
//! 3. `<stem>` with each of [`FALLBACK_EXTENSIONS`] in order

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::engine::FetchRequest;

/// Extensions probed after the preferred one, in priority order
pub const FALLBACK_EXTENSIONS: [&str; 5] = ["mp4", "mp3", "webm", "mkv", "m4a"];

/// Candidate paths for `request`, in the order they are tried
pub fn candidates(request: &FetchRequest, reported: Option<&Path>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = reported.map(Path::to_path_buf).into_iter().collect();

    if let Some(stem) = &request.file_stem {
        let base = request.output_dir.join(stem);
        let preferred = if request.is_audio_only() { "mp3" } else { "mp4" };

        for ext in std::iter::once(preferred).chain(FALLBACK_EXTENSIONS) {
            let path = base.with_extension(ext);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }

    paths
}

/// First candidate that exists on disk
pub async fn resolve(request: &FetchRequest, reported: Option<&Path>) -> Option<PathBuf> {
    for path in candidates(request, reported) {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = ?path, "Resolved job artifact");
            return Some(path);
        }
    }
    None
}
