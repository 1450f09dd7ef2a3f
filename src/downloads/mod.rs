//! Download lifecycle manager.
//!
//! # Overview
//!
//! [`DownloadManager`] owns the durable set of accepted downloads:
//!
//! - [`DownloadManager::accept`] creates a download and submits its links to
//!   the [`Agent`]
//! - [`DownloadManager::reconcile_all`] polls the agent and moves downloads
//!   through their [`DownloadStatus`] lifecycle
//! - [`DownloadManager::cleanup_stale`] drops imported and expired entries
//! - [`DownloadManager::run_reconciler`] drives reconciliation on an interval
//!   until shutdown is signalled
//!
//! Every mutation is one critical section over the in-memory map: changes are
//! staged on a copy, persisted through [`DownloadRepository`], and swapped in
//! only once the write succeeded. Agent calls
//! happen outside the critical section.

mod error;
mod item;
mod repository;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub use error::{DownloadDbErrorKind, DownloadError};
pub use item::{Download, DownloadStatus};
pub use repository::DownloadRepository;

use crate::agent::{Agent, PackageMatch, SubmitRequest, find_package, normalize_package_name};

#[cfg(test)]
pub(crate) use item::fixtures;

/// Default age after which failed downloads are dropped.
pub const DEFAULT_FAILED_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Longest title fragment embedded in a queue id.
const QUEUE_ID_SLUG_LEN: usize = 32;

/// A download request decoded from an accepted search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDownload {
    /// Clean release title.
    pub title: String,
    /// Client category (`radarr`, `sonarr`, `lidarr`, ...).
    pub category: String,
    /// Direct-download URLs; empty fails the download immediately.
    pub urls: Vec<String>,
    /// Catalog link id, used to deduplicate accepts.
    pub link_id: Option<u64>,
}

/// Which downloads a bulk delete targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    /// Non-terminal downloads (the client's queue).
    Active,
    /// Completed and failed downloads (the client's history).
    History,
}

impl DeleteScope {
    fn contains(self, download: &Download) -> bool {
        match self {
            Self::Active => download.is_active(),
            Self::History => !download.is_active(),
        }
    }
}

/// Owns the download set and its reconciliation against the agent.
pub struct DownloadManager {
    agent: Arc<dyn Agent>,
    repository: DownloadRepository,
    download_dir: PathBuf,
    failed_retention: Duration,
    downloads: Mutex<HashMap<String, Download>>,
}

impl DownloadManager {
    /// Creates a manager and loads the persisted download set.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the persisted set cannot be loaded.
    pub async fn new(
        agent: Arc<dyn Agent>,
        repository: DownloadRepository,
        download_dir: impl Into<PathBuf>,
    ) -> Result<Self, DownloadError> {
        let loaded = repository.load_all().await?;
        info!(count = loaded.len(), "Download set restored");
        Ok(Self {
            agent,
            repository,
            download_dir: download_dir.into(),
            failed_retention: DEFAULT_FAILED_RETENTION,
            downloads: Mutex::new(loaded.into_iter().map(|d| (d.id.clone(), d)).collect()),
        })
    }

    /// Overrides how long failed downloads are kept.
    #[must_use]
    pub fn with_failed_retention(mut self, retention: Duration) -> Self {
        self.failed_retention = retention;
        self
    }

    /// Returns the base download folder.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Accepts a download and hands it to the agent.
    ///
    /// An existing non-failed download for the same link is returned as is;
    /// a failed one is replaced. Submission failures do not error: the
    /// returned download is `failed` with the reason recorded.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] only when the set cannot be persisted.
    #[instrument(skip(self, request), fields(title = %request.title, category = %request.category))]
    pub async fn accept(&self, request: NewDownload) -> Result<Download, DownloadError> {
        let download = {
            let mut downloads = self.downloads.lock().await;
            let mut next = downloads.clone();
            if let Some(existing) = find_duplicate(&downloads, &request) {
                if existing.status != DownloadStatus::Failed {
                    info!(queue_id = %existing.queue_id, "Download already tracked");
                    return Ok(existing.clone());
                }
                let stale_id = existing.id.clone();
                debug!(id = %stale_id, "Replacing failed download");
                next.remove(&stale_id);
            }

            let download = self.new_download(request);
            next.insert(download.id.clone(), download.clone());
            self.commit(&mut downloads, next).await?;
            download
        };
        info!(queue_id = %download.queue_id, "Download created");

        let outcome = self.submit(&download).await;

        let mut downloads = self.downloads.lock().await;
        let mut next = downloads.clone();
        let Some(stored) = next.get_mut(&download.id) else {
            // Deleted while the submission was in flight.
            return Ok(download);
        };
        match outcome {
            Ok(agent_id) => stored.agent_id = Some(agent_id),
            Err(message) => {
                warn!(queue_id = %stored.queue_id, error = %message, "Download submission failed");
                stored.fail(message);
            }
        }
        let updated = stored.clone();
        self.commit(&mut downloads, next).await?;
        Ok(updated)
    }

    fn new_download(&self, request: NewDownload) -> Download {
        let id = Uuid::new_v4().simple().to_string();
        let (package_name, base) = if request.category.is_empty() {
            (request.title.clone(), self.download_dir.clone())
        } else {
            (
                format!("[{}] {}", request.category.to_uppercase(), request.title),
                self.download_dir.join(&request.category),
            )
        };
        let package_name = normalize_package_name(&package_name);
        let folder = base.join(normalize_package_name(&request.title));

        Download {
            queue_id: queue_id(&request.title, &id),
            title: request.title,
            category: request.category,
            urls: request.urls,
            link_id: request.link_id,
            agent_id: None,
            package_name: Some(package_name),
            status: DownloadStatus::Queued,
            bytes_total: 0,
            bytes_downloaded: 0,
            speed: 0,
            eta: None,
            output_path: Some(folder.to_string_lossy().into_owned()),
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            id,
        }
    }

    async fn submit(&self, download: &Download) -> Result<String, String> {
        if download.urls.is_empty() {
            return Err("no download links".to_string());
        }
        let request = SubmitRequest {
            links: download.urls.clone(),
            package_name: download.package_name.clone().unwrap_or_default(),
            destination: download
                .output_path
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| self.download_dir.clone()),
        };
        match self.agent.submit(&request).await {
            Ok(id) if id.trim().is_empty() => Err("agent returned no package identifier".to_string()),
            Ok(id) => Ok(id),
            Err(error) => Err(error.to_string()),
        }
    }

    /// Looks up a download by internal id or queue id.
    pub async fn get(&self, id: &str) -> Option<Download> {
        let downloads = self.downloads.lock().await;
        lookup(&downloads, id).cloned()
    }

    /// Non-terminal downloads, oldest first.
    pub async fn active(&self) -> Vec<Download> {
        self.collect(Download::is_active).await
    }

    /// Completed and failed downloads, oldest first.
    pub async fn history(&self) -> Vec<Download> {
        self.collect(|d| !d.is_active()).await
    }

    async fn collect(&self, keep: impl Fn(&Download) -> bool) -> Vec<Download> {
        let downloads = self.downloads.lock().await;
        let mut selected: Vec<Download> = downloads.values().filter(|d| keep(d)).cloned().collect();
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        selected
    }

    /// Polls the agent once and applies its package reports.
    ///
    /// Downloads whose identifiers do not resolve stay as they are; a
    /// download the agent never identified was already failed when it was
    /// submitted. Returns the number of downloads that changed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the updated set cannot be persisted.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<usize, DownloadError> {
        let snapshot = self.active().await;
        if snapshot.is_empty() {
            return Ok(0);
        }

        let packages = match self.agent.packages().await {
            Ok(packages) => packages,
            Err(error) => {
                warn!(error = %error, "Agent unavailable; skipping reconciliation");
                return Ok(0);
            }
        };

        let mut updates = Vec::new();
        for original in snapshot {
            let mut download = original.clone();
            if let Some((package, matched)) = find_package(
                &packages,
                download.agent_id.as_deref(),
                download.package_name.as_deref(),
            ) {
                if matched == PackageMatch::ByName {
                    debug!(queue_id = %download.queue_id, agent_id = %package.id, "Package re-identified by name");
                }
                download.apply_package(package, matched);
                if download.status == DownloadStatus::Completed {
                    self.log_completed_files(&download, &package.id).await;
                }
            } else {
                debug!(queue_id = %download.queue_id, "Package not visible on agent yet");
            }
            if download != original {
                updates.push(download);
            }
        }

        if updates.is_empty() {
            return Ok(0);
        }

        let mut downloads = self.downloads.lock().await;
        let mut next = downloads.clone();
        let mut applied = 0;
        for update in updates {
            // Skip entries deleted or finished by another writer meanwhile.
            if let Some(current) = next.get_mut(&update.id)
                && current.is_active()
            {
                if update.status == DownloadStatus::Completed {
                    info!(queue_id = %update.queue_id, path = ?update.output_path, "Download completed");
                }
                *current = update;
                applied += 1;
            }
        }
        if applied > 0 {
            self.commit(&mut downloads, next).await?;
        }
        Ok(applied)
    }

    async fn log_completed_files(&self, download: &Download, package_id: &str) {
        match self.agent.package_files(package_id).await {
            Ok(files) => {
                if let Some(first) = files.first() {
                    debug!(queue_id = %download.queue_id, file = %first.name, count = files.len(), "Completed package files");
                }
            }
            Err(error) => debug!(error = %error, "Could not list completed package files"),
        }
    }

    /// Removes imported completions and expired failures.
    ///
    /// A completed download counts as imported once its output path is gone
    /// or is an empty folder. Active downloads are never removed here.
    /// Returns the number of removed downloads.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the updated set cannot be persisted.
    #[instrument(skip(self))]
    pub async fn cleanup_stale(&self) -> Result<usize, DownloadError> {
        let retention = chrono::Duration::from_std(self.failed_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let now = Utc::now();

        let mut stale = Vec::new();
        for download in self.history().await {
            let remove = match download.status {
                DownloadStatus::Completed => match download.output_path.as_deref() {
                    Some(path) => is_consumed(Path::new(path)).await,
                    None => false,
                },
                DownloadStatus::Failed => now - download.created_at > retention,
                _ => false,
            };
            if remove {
                stale.push((download.id, download.status));
            }
        }
        if stale.is_empty() {
            return Ok(0);
        }

        let mut downloads = self.downloads.lock().await;
        let mut next = downloads.clone();
        let mut removed = 0;
        for (id, status) in stale {
            if next.get(&id).is_some_and(|d| d.status == status)
                && let Some(download) = next.remove(&id)
            {
                info!(queue_id = %download.queue_id, status = %status, "Stale download removed");
                removed += 1;
            }
        }
        if removed > 0 {
            self.commit(&mut downloads, next).await?;
        }
        Ok(removed)
    }

    /// Deletes one download by internal id or queue id.
    ///
    /// Deleting an active download also removes its agent package, best
    /// effort. Returns false when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the updated set cannot be persisted.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool, DownloadError> {
        let removed = {
            let mut downloads = self.downloads.lock().await;
            let Some(key) = lookup(&downloads, id).map(|d| d.id.clone()) else {
                warn!("Download not found");
                return Ok(false);
            };
            let mut next = downloads.clone();
            let removed = next.remove(&key);
            self.commit(&mut downloads, next).await?;
            removed
        };
        if let Some(download) = removed {
            info!(queue_id = %download.queue_id, "Download deleted");
            if download.is_active() {
                self.remove_from_agent(&download).await;
            }
        }
        Ok(true)
    }

    /// Deletes every download in `scope`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the updated set cannot be persisted.
    #[instrument(skip(self))]
    pub async fn delete_all(&self, scope: DeleteScope) -> Result<usize, DownloadError> {
        let removed: Vec<Download> = {
            let mut downloads = self.downloads.lock().await;
            let keys: Vec<String> = downloads
                .values()
                .filter(|d| scope.contains(d))
                .map(|d| d.id.clone())
                .collect();
            let mut next = downloads.clone();
            let removed = keys.iter().filter_map(|k| next.remove(k)).collect();
            self.commit(&mut downloads, next).await?;
            removed
        };
        for download in removed.iter().filter(|d| d.is_active()) {
            self.remove_from_agent(download).await;
        }
        info!(count = removed.len(), "Downloads deleted");
        Ok(removed.len())
    }

    async fn remove_from_agent(&self, download: &Download) {
        let resolved = self
            .agent
            .package_status(download.agent_id.as_deref(), download.package_name.as_deref())
            .await;
        let package_id = match resolved {
            Ok(Some((package, _))) => package.id,
            Ok(None) => match download.agent_id.clone() {
                Some(id) => id,
                None => return,
            },
            Err(error) => {
                warn!(queue_id = %download.queue_id, error = %error, "Could not resolve agent package for removal");
                return;
            }
        };
        if let Err(error) = self.agent.remove_package(&package_id).await {
            warn!(queue_id = %download.queue_id, error = %error, "Agent package removal failed");
        }
    }

    /// Reconciles every `interval` until `shutdown` flips to true or its
    /// sender is dropped.
    ///
    /// A pass in progress always runs to completion before the loop exits.
    pub async fn run_reconciler(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Reconciliation loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.reconcile_all().await {
                        warn!(error = %error, "Reconciliation pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Reconciliation loop stopped");
    }

    /// Persists `next` and only then makes it the in-memory set, so a failed
    /// write leaves memory matching the database.
    async fn commit(
        &self,
        downloads: &mut MutexGuard<'_, HashMap<String, Download>>,
        next: HashMap<String, Download>,
    ) -> Result<(), DownloadError> {
        self.repository.save_all(next.values()).await?;
        **downloads = next;
        Ok(())
    }
}

fn lookup<'a>(downloads: &'a HashMap<String, Download>, id: &str) -> Option<&'a Download> {
    downloads
        .get(id)
        .or_else(|| downloads.values().find(|d| d.queue_id == id))
}

fn find_duplicate<'a>(
    downloads: &'a HashMap<String, Download>,
    request: &NewDownload,
) -> Option<&'a Download> {
    downloads.values().find(|d| match request.link_id {
        Some(link_id) => d.link_id == Some(link_id),
        None => !request.urls.is_empty() && d.urls == request.urls,
    })
}

/// Builds the client-visible queue id from a title and the internal id.
fn queue_id(title: &str, id: &str) -> String {
    let mut slug = String::with_capacity(QUEUE_ID_SLUG_LEN);
    for ch in title.chars() {
        if slug.len() >= QUEUE_ID_SLUG_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    let short = id.get(..8).unwrap_or(id);
    format!("SABnzbd_nzo_{slug}_{short}")
}

/// True when an importer has moved the files away: the path is gone or is
/// a folder with no visible entries.
async fn is_consumed(path: &Path) -> bool {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(error) => return error.kind() == ErrorKind::NotFound,
    };
    if !metadata.is_dir() {
        return false;
    }
    let Ok(mut entries) = tokio::fs::read_dir(path).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with('.') {
            return false;
        }
    }
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::agent::{AgentError, PackageFile, PackageStatus};
    use crate::db::Database;

    /// Agent double with scripted submissions and package reports.
    #[derive(Default)]
    struct FakeAgent {
        submit_result: StdMutex<Option<String>>,
        packages: StdMutex<Vec<PackageStatus>>,
        submitted: StdMutex<Vec<SubmitRequest>>,
        removed: StdMutex<Vec<String>>,
    }

    impl FakeAgent {
        fn accepting(id: &str) -> Arc<Self> {
            let agent = Self::default();
            *agent.submit_result.lock().unwrap() = Some(id.to_string());
            Arc::new(agent)
        }

        fn report(&self, package: PackageStatus) {
            self.packages.lock().unwrap().push(package);
        }
    }

    #[async_trait]
    impl Agent for FakeAgent {
        async fn submit(&self, request: &SubmitRequest) -> Result<String, AgentError> {
            self.submitted.lock().unwrap().push(request.clone());
            self.submit_result
                .lock()
                .unwrap()
                .clone()
                .ok_or(AgentError::NoIdentifier)
        }

        async fn packages(&self) -> Result<Vec<PackageStatus>, AgentError> {
            Ok(self.packages.lock().unwrap().clone())
        }

        async fn package_files(&self, _package_id: &str) -> Result<Vec<PackageFile>, AgentError> {
            Ok(Vec::new())
        }

        async fn remove_package(&self, package_id: &str) -> Result<(), AgentError> {
            self.removed.lock().unwrap().push(package_id.to_string());
            Ok(())
        }
    }

    async fn manager(agent: Arc<FakeAgent>) -> DownloadManager {
        let repository = DownloadRepository::new(Database::new_in_memory().await.unwrap());
        DownloadManager::new(agent, repository, "/output").await.unwrap()
    }

    fn request(link_id: u64) -> NewDownload {
        NewDownload {
            title: "Test Movie (2024) Bluray-2160p".to_string(),
            category: "radarr".to_string(),
            urls: vec!["https://1fichier.com/?a".to_string()],
            link_id: Some(link_id),
        }
    }

    fn package(id: &str, name: &str) -> PackageStatus {
        PackageStatus {
            id: id.to_string(),
            name: name.to_string(),
            ..PackageStatus::default()
        }
    }

    // ==================== Accept Tests ====================

    #[tokio::test]
    async fn test_accept_submits_normalized_package() {
        let agent = FakeAgent::accepting("42");
        let manager = manager(Arc::clone(&agent)).await;

        let mut req = request(1);
        req.title = "Mission: Impossible (1996) WEBDL-1080p".to_string();
        let download = manager.accept(req).await.unwrap();

        assert_eq!(download.status, DownloadStatus::Queued);
        assert_eq!(download.agent_id.as_deref(), Some("42"));
        assert!(download.queue_id.starts_with("SABnzbd_nzo_Mission_Impossible_1996"));

        let submitted = agent.submitted.lock().unwrap();
        assert_eq!(submitted[0].package_name, "[RADARR] Mission; Impossible (1996) WEBDL-1080p");
        assert_eq!(
            submitted[0].destination,
            PathBuf::from("/output/radarr/Mission; Impossible (1996) WEBDL-1080p")
        );
    }

    #[tokio::test]
    async fn test_accept_without_identifier_fails_download() {
        let agent = Arc::new(FakeAgent::default());
        let manager = manager(agent).await;

        let download = manager.accept(request(1)).await.unwrap();
        assert_eq!(download.status, DownloadStatus::Failed);
        assert!(download.error.is_some());
        assert_eq!(manager.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_accept_blank_identifier_fails_download() {
        let agent = FakeAgent::accepting("  ");
        let manager = manager(agent).await;

        let download = manager.accept(request(1)).await.unwrap();
        assert_eq!(download.status, DownloadStatus::Failed);
        assert!(download.agent_id.is_none());
        assert!(manager.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_accept_without_links_fails_without_submitting() {
        let agent = FakeAgent::accepting("1");
        let manager = manager(Arc::clone(&agent)).await;

        let mut req = request(1);
        req.urls.clear();
        let download = manager.accept(req).await.unwrap();
        assert_eq!(download.status, DownloadStatus::Failed);
        assert!(agent.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_deduplicates_by_link() {
        let agent = FakeAgent::accepting("42");
        let manager = manager(Arc::clone(&agent)).await;

        let first = manager.accept(request(7)).await.unwrap();
        let second = manager.accept(request(7)).await.unwrap();
        assert_eq!(first.queue_id, second.queue_id);
        assert_eq!(manager.active().await.len(), 1);
        assert_eq!(agent.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_accept_replaces_failed_download() {
        let agent = Arc::new(FakeAgent::default());
        let manager = manager(Arc::clone(&agent)).await;
        let failed = manager.accept(request(7)).await.unwrap();
        assert_eq!(failed.status, DownloadStatus::Failed);

        *agent.submit_result.lock().unwrap() = Some("9".to_string());
        let retried = manager.accept(request(7)).await.unwrap();
        assert_ne!(retried.id, failed.id);
        assert_eq!(retried.status, DownloadStatus::Queued);
        assert!(manager.get(&failed.queue_id).await.is_none());
    }

    // ==================== Reconcile Tests ====================

    #[tokio::test]
    async fn test_reconcile_finished_package_completes() {
        let agent = FakeAgent::accepting("42");
        let manager = manager(Arc::clone(&agent)).await;
        let download = manager.accept(request(1)).await.unwrap();

        let mut pkg = package("42", "ignored");
        pkg.finished = true;
        pkg.bytes_total = 2048;
        pkg.bytes_loaded = 2048;
        pkg.save_to = Some("/x".to_string());
        agent.report(pkg);

        assert_eq!(manager.reconcile_all().await.unwrap(), 1);
        let updated = manager.get(&download.queue_id).await.unwrap();
        assert_eq!(updated.status, DownloadStatus::Completed);
        assert!((updated.percent() - 100.0).abs() < f64::EPSILON);
        assert_eq!(updated.output_path.as_deref(), Some("/x"));
    }

    #[tokio::test]
    async fn test_reconcile_running_package_by_name_updates_id() {
        let agent = FakeAgent::accepting("transient");
        let manager = manager(Arc::clone(&agent)).await;
        let download = manager.accept(request(1)).await.unwrap();

        let mut pkg = package("1700000000001", "[RADARR] Test Movie (2024) Bluray-2160p");
        pkg.running = true;
        agent.report(pkg);

        manager.reconcile_all().await.unwrap();
        let updated = manager.get(&download.id).await.unwrap();
        assert_eq!(updated.status, DownloadStatus::Downloading);
        assert_eq!(updated.agent_id.as_deref(), Some("1700000000001"));
    }

    #[tokio::test]
    async fn test_reconcile_tolerates_unresolved_package() {
        let agent = FakeAgent::accepting("42");
        let manager = manager(Arc::clone(&agent)).await;
        manager.accept(request(1)).await.unwrap();

        assert_eq!(manager.reconcile_all().await.unwrap(), 0);
        assert_eq!(manager.active().await[0].status, DownloadStatus::Queued);
    }

    // ==================== Cleanup Tests ====================

    #[tokio::test]
    async fn test_cleanup_removes_imported_and_expired_only() {
        let temp = tempfile::tempdir().unwrap();
        let kept_dir = temp.path().join("kept");
        std::fs::create_dir(&kept_dir).unwrap();
        std::fs::write(kept_dir.join("movie.mkv"), b"x").unwrap();
        let empty_dir = temp.path().join("empty");
        std::fs::create_dir(&empty_dir).unwrap();
        std::fs::write(empty_dir.join(".hidden"), b"x").unwrap();

        let agent = Arc::new(FakeAgent::default());
        let manager = manager(agent).await;
        {
            let mut downloads = manager.downloads.lock().await;
            let mut add = |id: &str, status: DownloadStatus, path: Option<&Path>, age_hours: i64| {
                let mut d = fixtures::download(id);
                d.status = status;
                d.output_path = path.map(|p| p.to_string_lossy().into_owned());
                d.created_at = Utc::now() - chrono::Duration::hours(age_hours);
                downloads.insert(d.id.clone(), d);
            };
            let missing = temp.path().join("missing");
            add("gone", DownloadStatus::Completed, Some(missing.as_path()), 0);
            add("empty", DownloadStatus::Completed, Some(empty_dir.as_path()), 0);
            add("kept", DownloadStatus::Completed, Some(kept_dir.as_path()), 0);
            add("old-fail", DownloadStatus::Failed, None, 25);
            add("new-fail", DownloadStatus::Failed, None, 1);
            add("active", DownloadStatus::Downloading, Some(missing.as_path()), 48);
        }

        assert_eq!(manager.cleanup_stale().await.unwrap(), 3);
        let mut left: Vec<String> = manager.downloads.lock().await.keys().cloned().collect();
        left.sort();
        assert_eq!(left, ["active", "kept", "new-fail"]);
    }

    // ==================== Delete Tests ====================

    #[tokio::test]
    async fn test_delete_active_removes_agent_package() {
        let agent = FakeAgent::accepting("42");
        let manager = manager(Arc::clone(&agent)).await;
        let download = manager.accept(request(1)).await.unwrap();
        agent.report(package("42", "x"));

        assert!(manager.delete(&download.queue_id).await.unwrap());
        assert!(manager.get(&download.queue_id).await.is_none());
        assert_eq!(*agent.removed.lock().unwrap(), ["42"]);
        assert!(!manager.delete(&download.queue_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_respects_scope() {
        let agent = FakeAgent::accepting("42");
        let manager = manager(Arc::clone(&agent)).await;
        manager.accept(request(1)).await.unwrap();
        *agent.submit_result.lock().unwrap() = None;
        manager.accept(request(2)).await.unwrap();

        assert_eq!(manager.delete_all(DeleteScope::History).await.unwrap(), 1);
        assert_eq!(manager.active().await.len(), 1);
        assert!(agent.removed.lock().unwrap().is_empty());
    }

    // ==================== Persistence / Loop Tests ====================

    #[tokio::test]
    async fn test_downloads_survive_restart() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("linkarr.db");
        let agent = FakeAgent::accepting("42");

        let first = {
            let repository = DownloadRepository::new(Database::new(&db_path).await.unwrap());
            let manager = DownloadManager::new(Arc::clone(&agent) as Arc<dyn Agent>, repository, "/output")
                .await
                .unwrap();
            manager.accept(request(1)).await.unwrap()
        };

        let repository = DownloadRepository::new(Database::new(&db_path).await.unwrap());
        let manager = DownloadManager::new(agent, repository, "/output").await.unwrap();
        let restored = manager.get(&first.queue_id).await.unwrap();
        assert_eq!(restored.agent_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let agent = FakeAgent::accepting("42");
        let db = Database::new_in_memory().await.unwrap();
        let repository = DownloadRepository::new(db.clone());
        let manager = DownloadManager::new(Arc::clone(&agent) as Arc<dyn Agent>, repository, "/output")
            .await
            .unwrap();
        let download = manager.accept(request(1)).await.unwrap();

        db.close().await;

        assert!(manager.delete(&download.queue_id).await.is_err());
        assert!(manager.get(&download.queue_id).await.is_some());

        assert!(manager.accept(request(2)).await.is_err());
        assert_eq!(manager.active().await.len(), 1);
        assert_eq!(agent.submitted.lock().unwrap().len(), 1);

        assert!(manager.delete_all(DeleteScope::Active).await.is_err());
        assert_eq!(manager.active().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconcile_write_keeps_previous_state() {
        let agent = FakeAgent::accepting("42");
        let db = Database::new_in_memory().await.unwrap();
        let repository = DownloadRepository::new(db.clone());
        let manager = DownloadManager::new(Arc::clone(&agent) as Arc<dyn Agent>, repository, "/output")
            .await
            .unwrap();
        let download = manager.accept(request(1)).await.unwrap();

        let mut pkg = package("42", "ignored");
        pkg.finished = true;
        agent.report(pkg);
        db.close().await;

        assert!(manager.reconcile_all().await.is_err());
        let current = manager.get(&download.id).await.unwrap();
        assert_eq!(current.status, DownloadStatus::Queued);
    }

    #[test]
    fn test_queue_id_slug() {
        assert_eq!(
            queue_id("Test Movie (2024) Bluray-2160p", "0123456789abcdef"),
            "SABnzbd_nzo_Test_Movie_2024_Bluray_2160p_01234567"
        );
        assert_eq!(queue_id("***", "abc"), "SABnzbd_nzo__abc");
    }

    #[tokio::test]
    async fn test_run_reconciler_stops_on_shutdown() {
        let agent = FakeAgent::accepting("42");
        let manager = Arc::new(manager(agent).await);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::clone(&manager).run_reconciler(Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
