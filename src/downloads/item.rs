//! Download entity and lifecycle status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{PackageMatch, PackageStatus};

/// Lifecycle status of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Handed to the agent, not transferring yet.
    Queued,
    /// The agent is transferring bytes.
    Downloading,
    /// The agent paused the package.
    Paused,
    /// The agent is unpacking archives.
    Extracting,
    /// Files are in place.
    Completed,
    /// Submission or transfer failed.
    Failed,
}

impl DownloadStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Extracting => "extracting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// True for `completed` and `failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "paused" => Ok(Self::Paused),
            "extracting" => Ok(Self::Extracting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// One accepted download, tracked from submission to import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Download {
    /// Internal id.
    pub id: String,
    /// Externally visible queue id; stable once assigned.
    pub queue_id: String,
    /// Clean release title.
    pub title: String,
    /// Client category (`radarr`, `sonarr`, ...).
    pub category: String,
    /// Direct-download URLs handed to the agent.
    pub urls: Vec<String>,
    /// Catalog link this download was accepted from.
    pub link_id: Option<u64>,
    /// Last known agent package id.
    pub agent_id: Option<String>,
    /// Package name as submitted, after character substitution.
    pub package_name: Option<String>,
    pub status: DownloadStatus,
    pub bytes_total: u64,
    pub bytes_downloaded: u64,
    /// Bytes per second.
    pub speed: u64,
    /// Seconds remaining, when known.
    pub eta: Option<u64>,
    /// Destination folder; replaced by the agent's save location on completion.
    pub output_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last error message.
    pub error: Option<String>,
}

impl Download {
    /// Percent complete, derived from byte counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.status == DownloadStatus::Completed {
            return 100.0;
        }
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_downloaded.min(self.bytes_total) as f64 / self.bytes_total as f64) * 100.0
    }

    /// Bytes still to transfer.
    #[must_use]
    pub fn bytes_remaining(&self) -> u64 {
        self.bytes_total.saturating_sub(self.bytes_downloaded)
    }

    /// True while the download is not in a terminal state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Marks the download failed with a message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = DownloadStatus::Failed;
        self.error = Some(message.into());
        self.speed = 0;
        self.eta = None;
        self.completed_at = Some(Utc::now());
    }

    /// Applies an agent package report.
    ///
    /// A name-based match adopts the package's current id so later polls
    /// hit on the id directly.
    pub fn apply_package(&mut self, package: &PackageStatus, matched: PackageMatch) {
        if matched == PackageMatch::ByName {
            self.agent_id = Some(package.id.clone());
        }
        if package.bytes_total > 0 {
            self.bytes_total = package.bytes_total;
        }
        self.bytes_downloaded = package.bytes_loaded;
        self.speed = package.speed;
        self.eta = package.eta;

        if package.finished {
            self.status = DownloadStatus::Completed;
            self.bytes_downloaded = self.bytes_total.max(package.bytes_loaded);
            self.bytes_total = self.bytes_downloaded;
            self.speed = 0;
            self.eta = None;
            self.completed_at = Some(Utc::now());
            if let Some(save_to) = package.save_to.as_deref().filter(|p| !p.is_empty()) {
                self.output_path = Some(save_to.to_string());
            }
            return;
        }
        if package.running {
            self.status = DownloadStatus::Downloading;
            return;
        }

        let text = package.status.as_deref().unwrap_or_default().to_lowercase();
        if text.contains("extract") {
            self.status = DownloadStatus::Extracting;
        } else if text.contains("pause") {
            self.status = DownloadStatus::Paused;
        } else if text.contains("queue") || text.contains("wait") {
            self.status = DownloadStatus::Queued;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::download;
    use super::*;

    fn package() -> PackageStatus {
        PackageStatus {
            id: "100".to_string(),
            name: "[RADARR] Test Movie (2024) Bluray-2160p".to_string(),
            ..PackageStatus::default()
        }
    }

    // ==================== Status Tests ====================

    #[test]
    fn test_download_status_round_trip_and_terminal() {
        for status in [
            DownloadStatus::Queued,
            DownloadStatus::Downloading,
            DownloadStatus::Paused,
            DownloadStatus::Extracting,
            DownloadStatus::Completed,
            DownloadStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<DownloadStatus>(), Ok(status));
        }
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(!DownloadStatus::Paused.is_terminal());
        assert!("done".parse::<DownloadStatus>().is_err());
    }

    // ==================== Package Mapping Tests ====================

    #[test]
    fn test_apply_finished_package_completes() {
        let mut item = download("a");
        let mut pkg = package();
        pkg.finished = true;
        pkg.bytes_total = 1000;
        pkg.bytes_loaded = 990;
        pkg.save_to = Some("/x".to_string());

        item.apply_package(&pkg, PackageMatch::ById);
        assert_eq!(item.status, DownloadStatus::Completed);
        assert!((item.percent() - 100.0).abs() < f64::EPSILON);
        assert_eq!(item.output_path.as_deref(), Some("/x"));
        assert!(item.completed_at.is_some());
        assert_eq!(item.bytes_remaining(), 0);
    }

    #[test]
    fn test_apply_running_package_downloads() {
        let mut item = download("a");
        let mut pkg = package();
        pkg.running = true;
        pkg.bytes_total = 1000;
        pkg.bytes_loaded = 250;
        pkg.speed = 50;

        item.apply_package(&pkg, PackageMatch::ById);
        assert_eq!(item.status, DownloadStatus::Downloading);
        assert!((item.percent() - 25.0).abs() < f64::EPSILON);
        assert_eq!(item.speed, 50);
    }

    #[test]
    fn test_apply_status_text_patterns() {
        let cases = [
            ("Extracting archive", DownloadStatus::Extracting),
            ("Paused", DownloadStatus::Paused),
            ("Waiting for slot", DownloadStatus::Queued),
            ("Queued", DownloadStatus::Queued),
        ];
        for (text, expected) in cases {
            let mut item = download("a");
            item.status = DownloadStatus::Downloading;
            let mut pkg = package();
            pkg.status = Some(text.to_string());
            item.apply_package(&pkg, PackageMatch::ById);
            assert_eq!(item.status, expected, "status text {text}");
        }
    }

    #[test]
    fn test_apply_unknown_status_text_keeps_state() {
        let mut item = download("a");
        item.status = DownloadStatus::Downloading;
        let mut pkg = package();
        pkg.status = Some("Connecting".to_string());
        item.apply_package(&pkg, PackageMatch::ById);
        assert_eq!(item.status, DownloadStatus::Downloading);
    }

    #[test]
    fn test_apply_name_match_adopts_agent_id() {
        let mut item = download("a");
        item.agent_id = Some("transient".to_string());
        let mut pkg = package();
        pkg.id = "1700000000001".to_string();
        item.apply_package(&pkg, PackageMatch::ByName);
        assert_eq!(item.agent_id.as_deref(), Some("1700000000001"));
    }

    #[test]
    fn test_fail_records_message() {
        let mut item = download("a");
        item.fail("agent returned no package identifier");
        assert_eq!(item.status, DownloadStatus::Failed);
        assert!(!item.is_active());
        assert!(item.error.as_deref().unwrap_or_default().contains("no package"));
    }
}
