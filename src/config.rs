use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 10 GiB, applied to every multipart upload body.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 << 30;
/// 10 MiB of a thumbnail is held in memory; the rest spills to a scratch file.
pub const DEFAULT_THUMBNAIL_MEMORY_BYTES: u64 = 10 << 20;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub public_host: Option<String>,
    pub assets_root: Option<String>,
    pub scratch_dir: Option<String>,
    pub max_upload_bytes: Option<u64>,
    pub thumbnail_memory_bytes: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub s3_bucket: String,
    pub s3_region: String,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    /// Public base (usually a CDN distribution) that fronts the bucket.
    pub distribution_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub probe_timeout_seconds: u64,
    pub remux_timeout_seconds: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub scratch_max_age_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: Option<StorageConfig>,
    pub media: Option<MediaConfig>,
    pub limits: Option<LimitsConfig>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub public_host: String,
    pub assets_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub thumbnail_memory_bytes: u64,
    pub jwt_secret: String,
    pub storage: StorageConfig,
    pub media: MediaConfig,
    pub limits: LimitsConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            s3_bucket: "tubely-videos".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            distribution_url: "http://localhost:9000/tubely-videos".to_string(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            probe_timeout_seconds: 30,
            remux_timeout_seconds: 600,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            scratch_max_age_seconds: 6 * 60 * 60,
            cleanup_interval_seconds: 15 * 60,
        }
    }
}

impl MediaConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn remux_timeout(&self) -> Duration {
        Duration::from_secs(self.remux_timeout_seconds)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn resolve_dir(base_dir: &Path, dir: String) -> PathBuf {
    let path = PathBuf::from(dir);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

impl Config {
    /// Loads `config.toml` from the working directory when present, then applies
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let config_path = base_dir.join("config.toml");
        let config_file = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            toml::from_str::<ConfigFile>(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?
        } else {
            ConfigFile::default()
        };

        Self::from_file(config_file, &base_dir)
    }

    fn from_file(file: ConfigFile, base_dir: &Path) -> anyhow::Result<Self> {
        let server = file.server;

        let port = env_parsed("PORT").or(server.port).unwrap_or(8091);

        let public_host = env_string("PUBLIC_HOST")
            .or(server.public_host)
            .unwrap_or_else(|| "localhost".to_string());

        let assets_root = env_string("ASSETS_ROOT")
            .or(server.assets_root)
            .unwrap_or_else(|| "assets".to_string());

        let scratch_dir = env_string("SCRATCH_DIR")
            .or(server.scratch_dir)
            .map(|dir| resolve_dir(base_dir, dir))
            .unwrap_or_else(|| std::env::temp_dir().join("tubely"));

        let max_upload_bytes = server
            .max_upload_bytes
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let thumbnail_memory_bytes = server
            .thumbnail_memory_bytes
            .unwrap_or(DEFAULT_THUMBNAIL_MEMORY_BYTES);

        let jwt_secret = env_string("JWT_SECRET")
            .or(file.auth.jwt_secret)
            .context("JWT_SECRET must be set (environment or [auth] jwt_secret)")?;

        let mut storage = file.storage.unwrap_or_default();
        if let Some(bucket) = env_string("S3_BUCKET") {
            storage.s3_bucket = bucket;
        }
        if let Some(region) = env_string("S3_REGION") {
            storage.s3_region = region;
        }
        if let Some(endpoint) = env_string("S3_ENDPOINT") {
            storage.s3_endpoint = Some(endpoint);
        }
        if let Some(distribution) = env_string("S3_CF_DISTRO") {
            storage.distribution_url = distribution;
        }

        let mut media = file.media.unwrap_or_default();
        if let Some(ffmpeg) = env_string("FFMPEG_BIN") {
            media.ffmpeg_bin = ffmpeg;
        }
        if let Some(ffprobe) = env_string("FFPROBE_BIN") {
            media.ffprobe_bin = ffprobe;
        }

        Ok(Self {
            port,
            public_host,
            assets_root: resolve_dir(base_dir, assets_root),
            scratch_dir,
            max_upload_bytes,
            thumbnail_memory_bytes,
            jwt_secret,
            storage,
            media,
            limits: file.limits.unwrap_or_default(),
        })
    }

    /// Public URL of a thumbnail written under `assets_root`.
    pub fn asset_url(&self, filename: &str) -> String {
        format!(
            "http://{}:{}/assets/{}",
            self.public_host, self.port, filename
        )
    }

    /// Public URL of an object stored under `key`.
    pub fn video_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.storage.distribution_url.trim_end_matches('/'),
            key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            port: 8091,
            public_host: "localhost".to_string(),
            assets_root: PathBuf::from("/srv/assets"),
            scratch_dir: PathBuf::from("/tmp/tubely"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            thumbnail_memory_bytes: DEFAULT_THUMBNAIL_MEMORY_BYTES,
            jwt_secret: "secret".to_string(),
            storage: StorageConfig {
                distribution_url: "https://d111111abcdef8.cloudfront.net/".to_string(),
                ..StorageConfig::default()
            },
            media: MediaConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    #[test]
    fn test_asset_url() {
        let config = test_config();
        assert_eq!(
            config.asset_url("abc.png"),
            "http://localhost:8091/assets/abc.png"
        );
    }

    #[test]
    fn test_video_url_trims_trailing_slash() {
        let config = test_config();
        assert_eq!(
            config.video_url("landscape/abc.mp4"),
            "https://d111111abcdef8.cloudfront.net/landscape/abc.mp4"
        );
    }

    #[test]
    fn test_limits_defaults() {
        assert_eq!(DEFAULT_MAX_UPLOAD_BYTES, 10 * 1024 * 1024 * 1024);
        assert_eq!(DEFAULT_THUMBNAIL_MEMORY_BYTES, 10 * 1024 * 1024);
    }

    #[test]
    fn test_parse_config_file() {
        let content = r#"
            [server]
            port = 9000
            assets_root = "/var/lib/tubely/assets"
            thumbnail_memory_bytes = 2048

            [auth]
            jwt_secret = "from-file"

            [storage]
            s3_bucket = "videos"
            s3_region = "eu-west-1"
            distribution_url = "https://cdn.example.com"

            [media]
            ffmpeg_bin = "/opt/ffmpeg/bin/ffmpeg"
            ffprobe_bin = "/opt/ffmpeg/bin/ffprobe"
            probe_timeout_seconds = 5
            remux_timeout_seconds = 60
        "#;
        let file: ConfigFile = toml::from_str(content).unwrap();
        assert_eq!(file.server.port, Some(9000));
        assert_eq!(file.server.thumbnail_memory_bytes, Some(2048));
        assert_eq!(file.auth.jwt_secret.as_deref(), Some("from-file"));

        let storage = file.storage.unwrap();
        assert_eq!(storage.s3_bucket, "videos");
        assert!(storage.s3_endpoint.is_none());

        let media = file.media.unwrap();
        assert_eq!(media.probe_timeout(), Duration::from_secs(5));
        assert_eq!(media.remux_timeout(), Duration::from_secs(60));
        assert!(file.limits.is_none());
    }

    #[test]
    fn test_resolve_dir() {
        let base = Path::new("/srv/app");
        assert_eq!(
            resolve_dir(base, "assets".to_string()),
            PathBuf::from("/srv/app/assets")
        );
        assert_eq!(
            resolve_dir(base, "/data/assets".to_string()),
            PathBuf::from("/data/assets")
        );
    }
}
