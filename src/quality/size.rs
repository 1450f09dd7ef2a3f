//! Size resolution and heuristic size estimates.

use crate::media::{Link, MediaKind};

use super::notes;

/// Sizes below this are treated as provider placeholders, not real sizes.
pub const MIN_TRUSTED_SIZE: u64 = 100_000_000;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Episodes in an estimated season pack.
const SEASON_PACK_EPISODES: f64 = 10.0;

/// Album estimate in GiB.
const MUSIC_ALBUM_GIB: f64 = 0.5;

/// Quality markers with (episode GiB, movie GiB), first match wins.
const SIZE_TABLE: &[(&str, f64, f64)] = &[
    ("REMUX UHD", 50.0, 70.0),
    ("REMUX 4K", 50.0, 70.0),
    ("ULTRA HD", 7.0, 15.0),
    ("UHD", 7.0, 15.0),
    ("2160", 6.0, 12.0),
    ("REMUX", 25.0, 40.0),
    ("BLURAY 1080", 4.0, 10.0),
    ("1080", 2.0, 5.0),
    ("720", 1.0, 2.5),
    ("DVD", 0.7, 1.5),
    ("480", 0.5, 1.2),
];

const DEFAULT_EPISODE_GIB: f64 = 1.5;
const DEFAULT_MOVIE_GIB: f64 = 4.0;

/// Estimates a plausible size in bytes for a release.
///
/// `quality` is the raw provider label. Season packs are modelled as ten
/// episodes; music is a fixed album size regardless of quality.
#[must_use]
pub fn estimate_size(quality: &str, media_kind: MediaKind, is_season_pack: bool) -> u64 {
    let upper = quality.to_uppercase();
    let (episode_gib, movie_gib) = SIZE_TABLE
        .iter()
        .find(|(marker, _, _)| upper.contains(marker))
        .map_or((DEFAULT_EPISODE_GIB, DEFAULT_MOVIE_GIB), |(_, ep, movie)| {
            (*ep, *movie)
        });

    let gib = match media_kind {
        MediaKind::Series if is_season_pack => episode_gib * SEASON_PACK_EPISODES,
        MediaKind::Series => episode_gib,
        MediaKind::Music => MUSIC_ALBUM_GIB,
        MediaKind::Movie => movie_gib,
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bytes = (gib * GIB) as u64;
    bytes
}

/// Resolves the size to advertise for a link.
///
/// Priority: size parsed from the release notes, then the provider size,
/// each only when at least [`MIN_TRUSTED_SIZE`]; otherwise [`estimate_size`].
#[must_use]
pub fn resolve_size(link: &Link, media_kind: MediaKind) -> u64 {
    if let Some(parsed) = link.notes.as_deref().and_then(notes::parse_size)
        && parsed >= MIN_TRUSTED_SIZE
    {
        return parsed;
    }
    if link.size >= MIN_TRUSTED_SIZE {
        return link.size;
    }
    let is_season_pack = media_kind == MediaKind::Series && link.is_season_pack();
    estimate_size(&link.quality, media_kind, is_season_pack)
}
