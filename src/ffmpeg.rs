use crate::config::MediaConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} failed ({status}): {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("missing video stream data")]
    NoStreamData,
}

/// Aspect-ratio bucket of an uploaded video.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AspectRatio {
    Landscape,
    Portrait,
    Other,
}

impl AspectRatio {
    /// Coarse bucket for a width/height pair. Exactly square and ultra-wide
    /// sources both land in `Other`.
    pub fn classify(width: f64, height: f64) -> Self {
        let ratio = width / height;
        if ratio < 1.0 {
            AspectRatio::Portrait
        } else if ratio > 1.0 && ratio < 2.0 {
            AspectRatio::Landscape
        } else {
            AspectRatio::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Other => "other",
        }
    }

    /// Object-storage key prefix for the bucket.
    pub fn storage_prefix(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "landscape",
            AspectRatio::Portrait => "portrait",
            AspectRatio::Other => "other",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

/// Runs `command` to completion, killing it if `timeout` elapses or the
/// calling future is dropped.
async fn run_tool(
    tool: &str,
    mut command: Command,
    timeout: Duration,
) -> Result<Output, MediaError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| MediaError::Timeout {
            tool: tool.to_string(),
            timeout,
        })?
        .map_err(|source| MediaError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(MediaError::Failed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

fn parse_aspect_ratio(stdout: &[u8]) -> Result<AspectRatio, MediaError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)?;
    let stream = probe.streams.first().ok_or(MediaError::NoStreamData)?;
    Ok(AspectRatio::classify(stream.width, stream.height))
}

/// Classify the aspect ratio of the first stream using ffprobe
pub async fn get_video_aspect_ratio<P: AsRef<Path>>(
    media: &MediaConfig,
    file_path: P,
) -> Result<AspectRatio, MediaError> {
    let mut command = Command::new(&media.ffprobe_bin);
    command
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_streams")
        .arg(file_path.as_ref());

    let output = run_tool("ffprobe", command, media.probe_timeout()).await?;
    let aspect_ratio = parse_aspect_ratio(&output.stdout)?;

    debug!(
        "[ffprobe] {} -> {}",
        file_path.as_ref().display(),
        aspect_ratio
    );

    Ok(aspect_ratio)
}

/// Path the fast-start copy of `file_path` is written to.
pub fn fast_start_path(file_path: &Path) -> PathBuf {
    let mut path = file_path.as_os_str().to_owned();
    path.push(".processing");
    PathBuf::from(path)
}

/// Remux an MP4 so the moov atom precedes the media data. Streams are copied,
/// not re-encoded.
pub async fn process_video_for_fast_start<P: AsRef<Path>>(
    media: &MediaConfig,
    file_path: P,
) -> Result<PathBuf, MediaError> {
    let output_path = fast_start_path(file_path.as_ref());

    let mut command = Command::new(&media.ffmpeg_bin);
    command
        .arg("-y")
        .arg("-i")
        .arg(file_path.as_ref())
        .arg("-c")
        .arg("copy")
        .arg("-movflags")
        .arg("faststart")
        .arg("-f")
        .arg("mp4")
        .arg(&output_path);

    run_tool("ffmpeg", command, media.remux_timeout()).await?;

    Ok(output_path)
}

/// First line of `<program> -version`, used for startup diagnostics.
pub async fn tool_version(program: &str) -> Result<String, MediaError> {
    let mut command = Command::new(program);
    command.arg("-version");

    let output = run_tool(program, command, Duration::from_secs(5)).await?;
    let version = String::from_utf8_lossy(&output.stdout);
    Ok(version.lines().next().unwrap_or("unknown").to_string())
}
