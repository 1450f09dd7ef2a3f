//! Episode diversification and candidate ranking.

use std::collections::{BTreeMap, HashSet};

use crate::media::Link;

/// Hosts ranked ahead of all others, best first. Unlisted hosts tie last.
const PREFERRED_HOSTS: &[&str] = &["1fichier", "send"];

/// Quality score of a raw quality label; lower is better.
///
/// Full UHD encodes, then other 2160p-class, remux, bluray 1080p, other
/// 1080p, 720p, everything else.
#[must_use]
pub fn quality_score(raw: &str) -> u8 {
    let q = raw.to_uppercase();
    if q.contains("ULTRA HD") && !q.contains("LIGHT") {
        0
    } else if ["ULTRA", "UHD", "2160", "4K"].iter().any(|t| q.contains(t)) {
        1
    } else if q.contains("REMUX") {
        2
    } else if q.contains("BLURAY") && q.contains("1080") {
        3
    } else if q.contains("1080") {
        4
    } else if q.contains("720") {
        5
    } else {
        6
    }
}

/// Host preference rank; lower is better.
#[must_use]
pub fn host_rank(host: &str) -> usize {
    let host = host.to_lowercase();
    PREFERRED_HOSTS
        .iter()
        .position(|preferred| host.contains(preferred))
        .unwrap_or(PREFERRED_HOSTS.len())
}

/// Orders links so every episode gets one representative before any repeat.
///
/// Representatives (best quality, then best host, first discovered on a
/// tie) come first in ascending episode order, season packs first. The
/// remaining links follow in discovery order, deduplicated by id.
#[must_use]
pub fn diversify(links: Vec<Link>) -> Vec<Link> {
    let mut best_by_episode: BTreeMap<u32, usize> = BTreeMap::new();
    for (index, link) in links.iter().enumerate() {
        best_by_episode
            .entry(link.episode_number())
            .and_modify(|best| {
                if rank_key(link) < rank_key(&links[*best]) {
                    *best = index;
                }
            })
            .or_insert(index);
    }

    let mut ordered = Vec::with_capacity(links.len());
    let mut seen: HashSet<u64> = HashSet::with_capacity(links.len());
    for &index in best_by_episode.values() {
        if seen.insert(links[index].id) {
            ordered.push(links[index].clone());
        }
    }
    for link in links {
        if seen.insert(link.id) {
            ordered.push(link);
        }
    }
    ordered
}

fn rank_key(link: &Link) -> (u8, usize) {
    (quality_score(&link.quality), host_rank(&link.host))
}
