//! Newznab category codes.

use crate::media::MediaKind;

/// Returns the Newznab category code for a release.
///
/// Movie and series tiers are keyed on the canonical quality; music tiers
/// on the raw label, since lossless markers do not survive normalization.
#[must_use]
pub fn category_code(canonical_quality: &str, raw_quality: &str, media_kind: MediaKind) -> u32 {
    let q = canonical_quality.to_lowercase();

    match media_kind {
        MediaKind::Movie => {
            if contains_any(&q, &["2160", "uhd"]) {
                2045
            } else if contains_any(&q, &["remux", "bluray"]) {
                2050
            } else if contains_any(&q, &["480", "dvd"]) {
                2030
            } else {
                2040
            }
        }
        MediaKind::Series => {
            if contains_any(&q, &["2160", "uhd"]) {
                5045
            } else if contains_any(&q, &["480", "dvd"]) {
                5030
            } else {
                5040
            }
        }
        MediaKind::Music => {
            let raw = raw_quality.to_lowercase();
            if raw.contains("flac") || raw.contains("lossless") {
                3040
            } else {
                3010
            }
        }
    }
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_code_movie_tiers() {
        assert_eq!(category_code("Bluray-2160p", "ULTRA HD (x265)", MediaKind::Movie), 2045);
        assert_eq!(category_code("Bluray-1080p Remux", "REMUX", MediaKind::Movie), 2050);
        assert_eq!(category_code("WEBDL-720p", "720p", MediaKind::Movie), 2040);
        assert_eq!(category_code("DVD", "DVDRip", MediaKind::Movie), 2030);
    }

    #[test]
    fn test_category_code_series_tiers() {
        assert_eq!(category_code("WEBDL-2160p", "4K", MediaKind::Series), 5045);
        assert_eq!(category_code("WEBDL-1080p", "1080p", MediaKind::Series), 5040);
        assert_eq!(category_code("HDTV-480p", "hdtv sd", MediaKind::Series), 5030);
    }

    #[test]
    fn test_category_code_music_lossless() {
        assert_eq!(category_code("WEBDL-1080p", "FLAC 24bit", MediaKind::Music), 3040);
        assert_eq!(category_code("WEBDL-1080p", "MP3 320", MediaKind::Music), 3010);
    }
}
