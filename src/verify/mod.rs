//! Link verification and ranking.
//!
//! # Overview
//!
//! Titles often carry dozens of mirrors, most of them dead. [`LinkVerifier`]
//! orders candidates with [`diversify`] so the probe budget covers every
//! episode before re-checking mirrors of an episode already represented,
//! then probes the first `max_to_check` candidates in sequential batches of
//! concurrent probes.

mod ranking;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, info, instrument};

pub use ranking::{diversify, host_rank, quality_score};

use crate::catalog::rewrite_mirror_domain;
use crate::media::Link;

/// Liveness check for a single link.
#[async_trait]
pub trait LinkProbe: Send + Sync {
    /// Returns the direct URL of a live link, or `None` when the link is
    /// inactive, deleted or unresolvable.
    async fn probe(&self, link_id: u64) -> Option<String>;
}

/// Verifies candidate links against a [`LinkProbe`].
#[derive(Clone)]
pub struct LinkVerifier {
    probe: Arc<dyn LinkProbe>,
}

impl LinkVerifier {
    /// Creates a verifier backed by `probe`.
    #[must_use]
    pub fn new(probe: Arc<dyn LinkProbe>) -> Self {
        Self { probe }
    }

    /// Returns the live subset of `links`, each enriched with its direct URL.
    ///
    /// At most `max_to_check` links are probed. Probes run in batches of
    /// `batch_size`; each batch completes before the next starts. Output
    /// keeps the diversified order.
    #[instrument(skip(self, links), fields(candidates = links.len()))]
    pub async fn verify(&self, links: Vec<Link>, max_to_check: usize, batch_size: usize) -> Vec<Link> {
        let batch_size = batch_size.max(1);
        let candidates: Vec<Link> = diversify(links).into_iter().take(max_to_check).collect();
        let checked = candidates.len();

        let mut verified = Vec::with_capacity(checked);
        for (batch_index, batch) in candidates.chunks(batch_size).enumerate() {
            let results = join_all(batch.iter().map(|link| self.verify_one(link))).await;
            let before = verified.len();
            verified.extend(results.into_iter().flatten());
            debug!(
                batch = batch_index,
                size = batch.len(),
                alive = verified.len() - before,
                "Verification batch complete"
            );
        }

        info!(alive = verified.len(), checked, "Link verification complete");
        verified
    }

    async fn verify_one(&self, link: &Link) -> Option<Link> {
        let url = self.probe.probe(link.id).await?;
        let url = rewrite_mirror_domain(url.trim());
        if url.is_empty() {
            return None;
        }
        let mut verified = link.clone();
        verified.download_url = Some(url);
        Some(verified)
    }
}
