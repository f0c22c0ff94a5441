use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::progress::DownloadEvent;
use super::video_info::VideoInfo;
use crate::binary::BinarySource;

/// Outcome of a successful download.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub url: String,
    /// The media file first, followed by side files (subtitles, thumbnails,
    /// info JSON) that were left on disk.
    pub files: Vec<PathBuf>,
    pub duration: Duration,
    pub metadata: Option<VideoInfo>
}

impl OperationResult {
    pub fn primary_file(&self) -> Option<&PathBuf> {
        self.files.first()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryFailure {
    pub index: usize,
    pub url: String,
    pub title: Option<String>,
    /// Display form of the error, including the stderr tail for process failures.
    pub error: String
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaylistResult {
    pub title: Option<String>,
    pub total: usize,
    /// Ordered by entry index.
    pub successes: Vec<(usize, OperationResult)>,
    pub failures: Vec<EntryFailure>,
    /// Entries that were cancelled or never started.
    pub cancelled: Vec<usize>,
    /// Set when `StopOnError` cut the playlist short.
    pub aborted: bool
}

impl PlaylistResult {
    pub fn downloaded_files(&self) -> Vec<&PathBuf> {
        self.successes
            .iter()
            .filter_map(|(_, result)| result.primary_file())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.successes.len() == self.total
    }
}

#[derive(Debug, Clone)]
pub enum PlaylistEvent {
    EntryStarted {
        index: usize,
        total: usize,
        title: Option<String>
    },
    /// A download event of one entry. Events of a given entry keep their order.
    Entry { index: usize, event: DownloadEvent },
    EntryFailed(EntryFailure),
    Finished(PlaylistResult)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy
}

#[derive(Debug, Clone, Serialize)]
pub struct BinaryHealth {
    pub name: String,
    pub resolvable: bool,
    pub runnable: bool,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    pub source: Option<BinarySource>,
    pub detail: Option<String>
}

impl BinaryHealth {
    pub fn is_ok(&self) -> bool {
        self.resolvable && self.runnable
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub binaries: Vec<BinaryHealth>,
    pub binaries_path: PathBuf
}

impl HealthReport {
    pub fn binary(&self, name: &str) -> Option<&BinaryHealth> {
        self.binaries.iter().find(|b| b.name == name)
    }

    pub(crate) fn from_binaries(binaries: Vec<BinaryHealth>, binaries_path: PathBuf) -> Self {
        let healthy = binaries.iter().filter(|b| b.is_ok()).count();
        let status = if healthy == binaries.len() {
            HealthStatus::Healthy
        } else if healthy > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };
        Self {
            status,
            binaries,
            binaries_path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(name: &str, ok: bool) -> BinaryHealth {
        BinaryHealth {
            name: name.to_string(),
            resolvable: ok,
            runnable: ok,
            path: None,
            version: None,
            source: None,
            detail: None
        }
    }

    #[test]
    fn test_health_status() {
        let report = HealthReport::from_binaries(
            vec![health("yt-dlp", true), health("ffmpeg", true)],
            PathBuf::from("bin")
        );
        assert_eq!(report.status, HealthStatus::Healthy);

        let report = HealthReport::from_binaries(
            vec![health("yt-dlp", true), health("ffmpeg", false)],
            PathBuf::from("bin")
        );
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.binary("ffmpeg").unwrap().is_ok());

        let report = HealthReport::from_binaries(vec![health("yt-dlp", false)], PathBuf::from("bin"));
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }
}
