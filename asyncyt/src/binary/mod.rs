//! Locating, provisioning and caching the external executables.
//!
//! Every operation resolves its executables through a [`BinaryCache`] owned
//! by the `Downloader`: the [`BinaryLocator`] probes a configured path, the
//! system `PATH` and the provisioning directory; when nothing usable is found
//! the [`BinaryFetcher`] installs the pinned build for the current platform.

mod cache;
mod fetcher;
mod locator;
mod manifest;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::process::{ProcessRunner, RunOptions};

pub use cache::BinaryCache;
pub use fetcher::{BinaryFetcher, FetchEvent, FetchPhase, FetchProgress, FetchStream};
pub use locator::BinaryLocator;
pub use manifest::{Manifest, ManifestEntry};

pub const YT_DLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";

const YT_DLP_RELEASE: &str = "2024.12.13";
const FFMPEG_RELEASE: &str = "7.1";

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    LinuxX64,
    LinuxArm64,
    MacOs,
    WindowsX64
}

impl Platform {
    pub fn current() -> Option<Self> {
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("linux", "x86_64") => Some(Platform::LinuxX64),
            ("linux", "aarch64") => Some(Platform::LinuxArm64),
            ("macos", _) => Some(Platform::MacOs),
            ("windows", "x86_64") => Some(Platform::WindowsX64),
            _ => None
        }
    }

    pub fn is_windows(self) -> bool {
        self == Platform::WindowsX64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::LinuxX64 => "linux-x64",
            Platform::LinuxArm64 => "linux-arm64",
            Platform::MacOs => "macos",
            Platform::WindowsX64 => "windows-x64"
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the expected SHA-256 of an asset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    Sha256(String),
    /// A `sha256sum`-style listing published next to the release.
    Sha256Sums { url: String, asset: String }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformAsset {
    pub platform: Platform,
    pub url: String,
    pub checksum: Checksum,
    /// Files to pull out of a zip archive, primary executable first. Empty
    /// when the asset is the executable itself.
    pub archive_members: Vec<String>
}

/// A required external executable and the pinned builds that can stand in
/// for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableSpec {
    pub name: String,
    pub pinned_version: String,
    pub min_version: Option<String>,
    pub version_arg: String,
    pub assets: Vec<PlatformAsset>
}

impl ExecutableSpec {
    pub fn asset_for(&self, platform: Platform) -> Option<&PlatformAsset> {
        self.assets.iter().find(|a| a.platform == platform)
    }

    pub fn file_name(&self, platform: Platform) -> String {
        if platform.is_windows() {
            format!("{}.exe", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn meets_min_version(&self, version: &str) -> bool {
        self.min_version
            .as_deref()
            .is_none_or(|min| version_at_least(version, min))
    }

    pub fn yt_dlp() -> Self {
        let base = format!("https://github.com/yt-dlp/yt-dlp/releases/download/{YT_DLP_RELEASE}");
        let sums = format!("{base}/SHA2-256SUMS");
        let asset = |platform, file: &str| PlatformAsset {
            platform,
            url: format!("{base}/{file}"),
            checksum: Checksum::Sha256Sums {
                url: sums.clone(),
                asset: file.to_string()
            },
            archive_members: Vec::new()
        };

        Self {
            name: YT_DLP.to_string(),
            pinned_version: YT_DLP_RELEASE.to_string(),
            min_version: Some("2023.03.04".to_string()),
            version_arg: "--version".to_string(),
            assets: vec![
                asset(Platform::LinuxX64, "yt-dlp_linux"),
                asset(Platform::LinuxArm64, "yt-dlp_linux_aarch64"),
                asset(Platform::MacOs, "yt-dlp_macos"),
                asset(Platform::WindowsX64, "yt-dlp.exe"),
            ]
        }
    }

    /// Only Windows gets a provisioned ffmpeg; elsewhere a system install is
    /// expected.
    pub fn ffmpeg() -> Self {
        let base = "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest";
        let archive = format!("ffmpeg-n{FFMPEG_RELEASE}-latest-win64-lgpl-{FFMPEG_RELEASE}.zip");

        Self {
            name: FFMPEG.to_string(),
            pinned_version: FFMPEG_RELEASE.to_string(),
            min_version: Some("4.0".to_string()),
            version_arg: "-version".to_string(),
            assets: vec![PlatformAsset {
                platform: Platform::WindowsX64,
                url: format!("{base}/{archive}"),
                checksum: Checksum::Sha256Sums {
                    url: format!("{base}/checksums.sha256"),
                    asset: archive
                },
                archive_members: vec!["ffmpeg.exe".to_string(), "ffprobe.exe".to_string()]
            }]
        }
    }
}

static BUILTIN_SPECS: LazyLock<Vec<ExecutableSpec>> =
    LazyLock::new(|| vec![ExecutableSpec::yt_dlp(), ExecutableSpec::ffmpeg()]);

/// The executables every `Downloader` knows how to set up.
pub fn builtin_specs() -> &'static [ExecutableSpec] {
    &BUILTIN_SPECS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinarySource {
    /// Path given explicitly in the configuration.
    Configured,
    System,
    Provisioned
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBinary {
    pub name: String,
    pub path: PathBuf,
    pub version: String,
    pub source: BinarySource,
    /// `None` when the host is not one of the provisionable platforms.
    pub platform: Option<Platform>
}

/// Runs `<path> <version_arg>` and returns the reported version, or `None`
/// when the executable does not run successfully.
pub(crate) async fn probe_version(
    runner: &ProcessRunner,
    path: &Path,
    spec: &ExecutableSpec
) -> Option<String> {
    let options = RunOptions::default().timeout(VERSION_PROBE_TIMEOUT);
    match runner.output(path, &[spec.version_arg.clone()], options).await {
        Ok(output) if output.report.success() => extract_version(&output.stdout),
        Ok(output) => {
            tracing::debug!(
                path = %path.display(),
                code = ?output.report.code,
                "version probe failed"
            );
            None
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "version probe failed");
            None
        }
    }
}

/// `2024.12.13` from yt-dlp, `7.1` from `ffmpeg version 7.1 Copyright ...`.
fn extract_version(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut tokens = line.split_whitespace();
    let version = match tokens.clone().position(|t| t == "version") {
        Some(pos) => tokens.nth(pos + 1)?,
        None => tokens.next()?
    };
    Some(version.to_string())
}

fn numeric_segments(version: &str) -> Vec<u64> {
    let start = version.find(|c: char| c.is_ascii_digit());
    let Some(start) = start else {
        return Vec::new();
    };
    // `N-113...` nightly ffmpeg builds carry no release number.
    if version[..start].contains('-') {
        return Vec::new();
    }
    version[start..]
        .split(|c: char| !c.is_ascii_digit() && c != '.')
        .next()
        .unwrap_or_default()
        .split('.')
        .map_while(|s| s.parse().ok())
        .collect()
}

/// Compares dotted versions numerically. Unparseable versions (development
/// builds) are accepted.
pub(crate) fn version_at_least(found: &str, min: &str) -> bool {
    let found = numeric_segments(found);
    let min = numeric_segments(min);
    if found.is_empty() || min.is_empty() {
        return true;
    }
    let len = found.len().max(min.len());
    let pad = |v: &[u64]| (0..len).map(|i| v.get(i).copied().unwrap_or(0)).collect::<Vec<_>>();
    pad(&found) >= pad(&min)
}
