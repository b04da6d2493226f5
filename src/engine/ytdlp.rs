//! yt-dlp backed [`MediaEngine`]
//!
//! yt-dlp is driven as a child process. Progress and the final file path are
//! requested through `--progress-template` / `--print` with fixed prefixes so
//! they can be told apart from the tool's regular chatter on either stream.

use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::mpsc,
};
use tracing::{debug, info, instrument, trace};

use super::{EngineError, FetchOutcome, FetchRequest, MediaEngine, ProbedFormat};
use crate::jobs::ProgressEvent;

const PROGRESS_PREFIX: &str = "mf-progress|";
const OUTPUT_PREFIX: &str = "mf-output|";
const PROGRESS_TEMPLATE: &str = "download:mf-progress|%(progress.status)s|%(progress._percent_str)s";
const OUTPUT_TEMPLATE: &str = "after_move:mf-output|%(filepath)s";

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    ffmpeg: Option<PathBuf>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg: None,
        }
    }

    /// Point yt-dlp at a specific ffmpeg executable or directory
    pub fn with_ffmpeg(mut self, ffmpeg: Option<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .env("PYTHONIOENCODING", "UTF-8")
            .env("PYTHONUTF8", "1")
            .kill_on_drop(true);
        if let Some(ffmpeg) = &self.ffmpeg {
            command.arg("--ffmpeg-location").arg(ffmpeg);
        }
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Spawn {
            binary: self.binary.display().to_string(),
            source,
        }
    }

    fn output_template(request: &FetchRequest) -> PathBuf {
        let name = match &request.file_stem {
            Some(stem) => format!("{stem}.%(ext)s"),
            None => "%(title)s.%(ext)s".to_string(),
        };
        request.output_dir.join(name)
    }

    /// Arguments for a download run, excluding the ffmpeg location
    pub(crate) fn fetch_args(request: &FetchRequest) -> Vec<String> {
        let mut args: Vec<String> = [
            "--newline",
            "--no-colors",
            "--no-playlist",
            "--no-warnings",
            "--progress",
            "--progress-template",
            PROGRESS_TEMPLATE,
            "--print",
            OUTPUT_TEMPLATE,
            "-f",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push(request.format.clone());
        args.push("-o".to_string());
        args.push(Self::output_template(request).to_string_lossy().into_owned());

        if request.is_audio_only() {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                format!("{}K", request.audio_quality),
            ]);
        } else {
            // AAC audio keeps the merged mp4 playable everywhere
            args.extend([
                "--merge-output-format".to_string(),
                "mp4".to_string(),
                "--postprocessor-args".to_string(),
                "ffmpeg:-c:a aac -b:a 192k".to_string(),
            ]);
        }

        args.push("--".to_string());
        args.push(request.url.clone());
        args
    }
}

/// A line of yt-dlp output, as far as we care about it
#[derive(Debug, PartialEq)]
enum EngineLine {
    Progress(ProgressEvent),
    Output(PathBuf),
    Other,
}

fn classify_line(line: &str) -> EngineLine {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        let (status, percent) = rest.split_once('|').unwrap_or((rest, ""));
        return match status {
            "downloading" => EngineLine::Progress(ProgressEvent::downloading(percent)),
            "finished" => EngineLine::Progress(ProgressEvent::Finished),
            _ => EngineLine::Other,
        };
    }
    match line.strip_prefix(OUTPUT_PREFIX) {
        Some(path) if !path.is_empty() => EngineLine::Output(PathBuf::from(path)),
        _ => EngineLine::Other,
    }
}

/// Tail of yt-dlp's stderr used for error reports.
///
/// An explicit `ERROR:` line wins over whatever chatter follows it.
#[derive(Debug, Default)]
struct ErrorTail {
    explicit: Option<String>,
    last: Option<String>,
}

impl ErrorTail {
    fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(PROGRESS_PREFIX) || line.starts_with(OUTPUT_PREFIX) {
            return;
        }
        match line.strip_prefix("ERROR:") {
            Some(message) => self.explicit = Some(message.trim().to_string()),
            None => self.last = Some(line.to_string()),
        }
    }

    fn message(self) -> Option<String> {
        self.explicit.or(self.last)
    }
}

fn error_from_stderr(stderr: &str) -> Option<String> {
    let mut tail = ErrorTail::default();
    stderr.lines().for_each(|line| tail.push(line));
    tail.message()
}

fn parse_probe(stdout: &[u8]) -> Result<Vec<ProbedFormat>, EngineError> {
    #[derive(Deserialize)]
    struct ProbePayload {
        #[serde(default)]
        formats: Option<Vec<ProbedFormat>>,
        #[serde(flatten)]
        top: ProbedFormat,
    }

    let payload: ProbePayload = serde_json::from_slice(stdout)?;
    // Single-format extractors describe the only stream at the top level
    Ok(payload.formats.unwrap_or_else(|| vec![payload.top]))
}

#[async_trait]
impl MediaEngine for YtDlp {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    #[instrument(name = "ytdlp_probe", level = "debug", skip(self))]
    async fn probe(&self, url: &str) -> Result<Vec<ProbedFormat>, EngineError> {
        let mut command = self.command();
        command
            .args(["-J", "--skip-download", "--no-playlist", "--no-warnings", "--"])
            .arg(url);

        let output = command.output().await.map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = error_from_stderr(&stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(EngineError::Failed(message));
        }

        let formats = parse_probe(&output.stdout)?;
        debug!(count = formats.len(), "Probed formats");
        Ok(formats)
    }

    #[instrument(
        name = "ytdlp_fetch",
        level = "debug",
        skip(self, request, events),
        fields(url = %request.url, format = %request.format)
    )]
    async fn fetch(
        &self,
        request: &FetchRequest,
        events: mpsc::Sender<ProgressEvent>,
    ) -> Result<FetchOutcome, EngineError> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let args = Self::fetch_args(request);
        debug!(args = ?args, "Spawning yt-dlp");

        let mut command = self.command();
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Failed("failed to capture yt-dlp stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Failed("failed to capture yt-dlp stderr".to_string()))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);
        let mut outcome = FetchOutcome::default();
        let mut error_tail = ErrorTail::default();

        while out_open || err_open {
            let line = tokio::select! {
                line = out_lines.next_line(), if out_open => match line? {
                    Some(line) => line,
                    None => {
                        out_open = false;
                        continue;
                    }
                },
                line = err_lines.next_line(), if err_open => match line? {
                    Some(line) => {
                        error_tail.push(&line);
                        line
                    }
                    None => {
                        err_open = false;
                        continue;
                    }
                },
            };

            match classify_line(&line) {
                EngineLine::Progress(event) => {
                    // A closed receiver only means nobody is watching anymore
                    let _ = events.send(event).await;
                }
                EngineLine::Output(path) => {
                    debug!(path = ?path, "yt-dlp reported output file");
                    outcome.reported_path = Some(path);
                }
                EngineLine::Other => trace!(line = %line, "yt-dlp"),
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let message = error_tail
                .message()
                .unwrap_or_else(|| format!("yt-dlp exited with {status}"));
            return Err(EngineError::Failed(message));
        }

        info!(path = ?outcome.reported_path, "yt-dlp finished");
        Ok(outcome)
    }
}
