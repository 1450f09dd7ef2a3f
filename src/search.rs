//! Search orchestration: titles, then links, then verification, then
//! indexed releases.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::catalog::CatalogClient;
use crate::media::{Link, MediaKind, Title};
use crate::payload::LinkPayload;
use crate::quality::notes::parse_edition;
use crate::quality::{build_release_title, category_code, normalize_quality, resolve_size};
use crate::verify::LinkVerifier;

/// Season searched when a series request names none.
const DEFAULT_SEASON: u32 = 1;

/// Search budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Catalog titles considered per query.
    pub title_limit: usize,
    /// Links probed per title.
    pub max_links_per_title: usize,
    /// Concurrent probes per batch.
    pub verify_batch_size: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            title_limit: 10,
            max_links_per_title: 15,
            verify_batch_size: 5,
        }
    }
}

/// A catalog search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub media_kind: MediaKind,
    pub season: Option<u32>,
    /// Series only: keep this episode and season packs.
    pub episode: Option<u32>,
}

/// A verified link rendered for indexer clients.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRelease {
    /// Clean title (no host tag).
    pub title: String,
    /// Display title (with host tag).
    pub display_title: String,
    /// Stable result id.
    pub guid: String,
    pub size: u64,
    /// Newznab category code.
    pub category: u32,
    pub published_at: DateTime<Utc>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub payload: LinkPayload,
}

/// Turns a text query into verified, indexed releases.
#[derive(Clone)]
pub struct SearchService {
    catalog: Arc<CatalogClient>,
    verifier: LinkVerifier,
    limits: SearchLimits,
}

impl SearchService {
    #[must_use]
    pub fn new(catalog: Arc<CatalogClient>, verifier: LinkVerifier, limits: SearchLimits) -> Self {
        Self {
            catalog,
            verifier,
            limits,
        }
    }

    /// Runs a search. Upstream failures yield fewer (or no) releases.
    #[instrument(skip(self, request), fields(query = %request.query, kind = %request.media_kind))]
    pub async fn search(&self, request: &SearchRequest) -> Vec<IndexedRelease> {
        let titles = self
            .catalog
            .search(&request.query, Some(request.media_kind), self.limits.title_limit)
            .await;
        let season = request.season.unwrap_or(DEFAULT_SEASON);

        let mut releases = Vec::new();
        for title in titles.iter().filter(|t| t.has_link) {
            let mut links = self.catalog.fetch_links(title.id, season).await;
            if request.media_kind == MediaKind::Series
                && let Some(episode) = request.episode
            {
                links.retain(|link| link.is_season_pack() || link.episode_number() == episode);
            }
            if links.is_empty() {
                debug!(title_id = title.id, "No candidate links");
                continue;
            }
            for link in &mut links {
                fill_title_info(link, title);
            }

            let verified = self
                .verifier
                .verify(links, self.limits.max_links_per_title, self.limits.verify_batch_size)
                .await;
            releases.extend(verified.iter().map(|link| index_link(link, request.media_kind)));
        }

        info!(count = releases.len(), "Search complete");
        releases
    }
}

fn fill_title_info(link: &mut Link, title: &Title) {
    if link.title_name.trim().is_empty() {
        link.title_name.clone_from(&title.name);
    }
    if link.year.is_none() {
        link.year = title.year;
    }
}

/// Renders one verified link as an indexed release.
#[must_use]
pub fn index_link(link: &Link, media_kind: MediaKind) -> IndexedRelease {
    let edition = link.notes.as_deref().and_then(parse_edition);
    let titles = build_release_title(link, edition.as_deref(), media_kind);
    let canonical = normalize_quality(&link.quality);
    let series = media_kind == MediaKind::Series;

    IndexedRelease {
        guid: format!("catalog-{}-{}", link.title_id, link.id),
        size: resolve_size(link, media_kind),
        category: category_code(&canonical, &link.quality, media_kind),
        published_at: link.created_at.unwrap_or_else(Utc::now),
        season: series.then_some(link.season),
        episode: link.episode.filter(|e| series && *e > 0),
        payload: LinkPayload {
            url: link.download_url.clone(),
            title: titles.display.clone(),
            clean_title: titles.clean.clone(),
            link_id: Some(link.id),
        },
        title: titles.clean,
        display_title: titles.display,
    }
}
