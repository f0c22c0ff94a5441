use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::process::DEFAULT_GRACE_PERIOD;

pub const DEFAULT_BIN_DIR: &str = "./bin";
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings of one [`Downloader`](crate::Downloader).
///
/// Everything that varies per download lives in
/// [`DownloadConfig`](crate::DownloadConfig) instead.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Where provisioned executables and their manifest are kept.
    pub bin_dir: PathBuf,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    /// Download missing executables instead of failing with
    /// [`Error::BinaryNotFound`].
    pub auto_provision: bool,
    /// Look for executables on `PATH`.
    pub use_system_path: bool,
    /// Used when a download's own configuration names none.
    pub cookies_file: Option<PathBuf>,
    /// Passed to every yt-dlp invocation, before the URL.
    pub extra_args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Bound on metadata, playlist listing and search invocations.
    pub metadata_timeout: Option<Duration>,
    /// Default bound on a download; a download's own timeout wins.
    pub download_timeout: Option<Duration>,
    pub grace_period: Duration
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from(DEFAULT_BIN_DIR),
            ytdlp_path: None,
            ffmpeg_path: None,
            auto_provision: true,
            use_system_path: true,
            cookies_file: None,
            extra_args: Vec::new(),
            env: HashMap::new(),
            metadata_timeout: Some(DEFAULT_METADATA_TIMEOUT),
            download_timeout: None,
            grace_period: DEFAULT_GRACE_PERIOD
        }
    }
}

impl DownloaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `ASYNCYT_BIN_DIR`, `ASYNCYT_YTDLP_PATH`,
    /// `ASYNCYT_FFMPEG_PATH`, `ASYNCYT_COOKIES_FILE`, `ASYNCYT_EXTRACTOR_ARGS`
    /// and `ASYNCYT_NO_PROVISION`. Empty values are ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get("ASYNCYT_BIN_DIR") {
            config.bin_dir = PathBuf::from(dir);
        }
        config.ytdlp_path = get("ASYNCYT_YTDLP_PATH").map(PathBuf::from);
        config.ffmpeg_path = get("ASYNCYT_FFMPEG_PATH").map(PathBuf::from);
        config.cookies_file = get("ASYNCYT_COOKIES_FILE").map(PathBuf::from);

        if let Some(args) = get("ASYNCYT_EXTRACTOR_ARGS") {
            config = config.extractor_args(&args);
        }

        if let Some(value) = get("ASYNCYT_NO_PROVISION") {
            config.auto_provision = !parse_flag("ASYNCYT_NO_PROVISION", &value)?;
        }

        Ok(config)
    }

    pub fn bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = dir.into();
        self
    }

    pub fn ytdlp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ytdlp_path = Some(path.into());
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    pub fn auto_provision(mut self, enabled: bool) -> Self {
        self.auto_provision = enabled;
        self
    }

    pub fn use_system_path(mut self, enabled: bool) -> Self {
        self.use_system_path = enabled;
        self
    }

    pub fn cookies_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_file = Some(path.into());
        self
    }

    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// One `extractor:key=value` per line, joined into a single
    /// `--extractor-args`.
    pub fn extractor_args(mut self, input: &str) -> Self {
        let joined: Vec<&str> = input
            .lines()
            .flat_map(|l| l.split(';'))
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if !joined.is_empty() {
            self.extra_args.push("--extractor-args".to_string());
            self.extra_args.push(joined.join(";"));
        }
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn metadata_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn download_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key} must be a boolean, got {other:?}")))
    }
}
