//! Fixtures shared by the unit tests: stand-in ffprobe/ffmpeg scripts, test
//! configuration, token minting, and log capture.
//!
//! All scripts are written once, before any test spawns a process, so no
//! child can inherit a write handle to a script that is about to be executed.

use crate::auth;
use crate::config::{Config, LimitsConfig, MediaConfig, StorageConfig};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-at-least-32-characters-long";

pub struct FakeTools {
    _dir: TempDir,
    pub ffprobe_landscape: PathBuf,
    pub ffprobe_portrait: PathBuf,
    pub ffprobe_square: PathBuf,
    pub ffprobe_empty: PathBuf,
    pub ffmpeg_copy: PathBuf,
    pub failing_tool: PathBuf,
    pub hanging_tool: PathBuf,
}

impl FakeTools {
    /// Media config probing with `ffprobe` and remuxing with the copying ffmpeg.
    pub fn media_config(&self, ffprobe: &Path) -> MediaConfig {
        MediaConfig {
            ffmpeg_bin: self.ffmpeg_copy.display().to_string(),
            ffprobe_bin: ffprobe.display().to_string(),
            probe_timeout_seconds: 10,
            remux_timeout_seconds: 10,
        }
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake tool");
    path
}

fn probe_script(dir: &Path, name: &str, streams: &str) -> PathBuf {
    write_script(dir, name, &format!("echo '{{\"streams\":[{streams}]}}'"))
}

pub fn fake_tools() -> &'static FakeTools {
    static TOOLS: OnceLock<FakeTools> = OnceLock::new();
    TOOLS.get_or_init(|| {
        let dir = tempfile::tempdir().expect("create fake tool dir");
        let root = dir.path();
        FakeTools {
            ffprobe_landscape: probe_script(
                root,
                "ffprobe-landscape",
                r#"{"codec_type":"video","width":1920,"height":1080}"#,
            ),
            ffprobe_portrait: probe_script(
                root,
                "ffprobe-portrait",
                r#"{"codec_type":"video","width":1080,"height":1920}"#,
            ),
            ffprobe_square: probe_script(
                root,
                "ffprobe-square",
                r#"{"codec_type":"video","width":1000,"height":1000}"#,
            ),
            ffprobe_empty: probe_script(root, "ffprobe-empty", ""),
            // ffmpeg -y -i <input> ... <output>
            ffmpeg_copy: write_script(
                root,
                "ffmpeg-copy",
                "for arg in \"$@\"; do last=\"$arg\"; done\ncp \"$3\" \"$last\"",
            ),
            failing_tool: write_script(
                root,
                "failing-tool",
                "echo 'simulated failure' >&2\nexit 1",
            ),
            hanging_tool: write_script(root, "hanging-tool", "exec sleep 30"),
            _dir: dir,
        }
    })
}

/// Config rooted in `root`, using the landscape probe unless overridden.
pub fn test_config(root: &Path) -> Config {
    let tools = fake_tools();
    Config {
        port: 8091,
        public_host: "localhost".to_string(),
        assets_root: root.join("assets"),
        scratch_dir: root.join("scratch"),
        max_upload_bytes: 1024 * 1024,
        thumbnail_memory_bytes: 64 * 1024,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        storage: StorageConfig {
            s3_bucket: "test-bucket".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            distribution_url: "https://cdn.test".to_string(),
        },
        media: tools.media_config(&tools.ffprobe_landscape),
        limits: LimitsConfig::default(),
    }
}

pub fn bearer_for(user_id: Uuid) -> String {
    let token = auth::make_jwt(user_id, TEST_JWT_SECRET, chrono::Duration::hours(1))
        .expect("mint test token");
    format!("Bearer {token}")
}

/// Log sink for asserting on what a code path emits.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Runs `f` with a WARN-and-above subscriber writing into this sink.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn warn_lines(&self) -> usize {
        self.contents().lines().filter(|line| line.contains("WARN")).count()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
