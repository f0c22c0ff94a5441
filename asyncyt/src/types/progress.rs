use std::time::Duration;

use serde::Serialize;

use super::result::OperationResult;

/// Where an operation is in its lifecycle.
///
/// Stages only move forward: `Pending → Resolving → Downloading →
/// [Converting] → Done`, with `Error` reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Resolving,
    Downloading,
    /// Merging formats, recoding, extracting audio or embedding.
    Converting,
    Done,
    Error
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// 0–100, never lower than a previous event of the same stage.
    pub percent: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
    pub eta: Option<Duration>,
    pub message: Option<String>
}

impl ProgressEvent {
    pub fn new(stage: Stage, percent: f64) -> Self {
        Self {
            stage,
            percent,
            downloaded_bytes: 0,
            total_bytes: None,
            speed: None,
            eta: None,
            message: None
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn format_speed(&self) -> Option<String> {
        self.speed.map(|s| format!("{}/s", format_bytes(s as u64)))
    }

    pub fn format_eta(&self) -> Option<String> {
        self.eta.map(|eta| {
            let secs = eta.as_secs();
            let mins = secs / 60;
            let hours = mins / 60;
            if hours > 0 {
                format!("{}:{:02}:{:02}", hours, mins % 60, secs % 60)
            } else {
                format!("{}:{:02}", mins, secs % 60)
            }
        })
    }

    pub fn format_size(&self) -> String {
        format_bytes(self.downloaded_bytes)
    }

    pub fn format_total(&self) -> Option<String> {
        self.total_bytes.map(format_bytes)
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.2} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.2} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{bytes} B")
    }
}

/// Item of a download stream. `Completed` and `Cancelled` are terminal; a
/// failed download ends the stream with an `Err` instead.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Progress(ProgressEvent),
    Completed(OperationResult),
    Cancelled
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadEvent::Completed(_) | DownloadEvent::Cancelled)
    }

    pub fn progress(&self) -> Option<&ProgressEvent> {
        match self {
            DownloadEvent::Progress(progress) => Some(progress),
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Pending < Stage::Resolving);
        assert!(Stage::Downloading < Stage::Converting);
        assert!(Stage::Converting < Stage::Done);
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Error.is_terminal());
        assert!(!Stage::Converting.is_terminal());
    }

    #[test]
    fn test_formatting() {
        let mut event = ProgressEvent::new(Stage::Downloading, 50.0);
        event.downloaded_bytes = 1_500_000;
        event.speed = Some(2_000.0);
        event.eta = Some(Duration::from_secs(3_725));
        assert_eq!(event.format_size(), "1.50 MB");
        assert_eq!(event.format_speed().as_deref(), Some("2.00 KB/s"));
        assert_eq!(event.format_eta().as_deref(), Some("1:02:05"));
        assert_eq!(event.format_total(), None);
    }
}
