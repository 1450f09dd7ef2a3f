//! Quality & metadata normalization.
//!
//! # Overview
//!
//! Catalog links carry free-form quality, language and notes strings. This
//! module maps them onto the release-naming vocabulary media-automation
//! clients parse (`Bluray-2160p`, `WEBDL-1080p`, `FRENCH`, ...) and estimates
//! sizes when the provider does not report a usable one.
//!
//! Every function here is pure: no I/O, no shared mutable state.
//!
//! # Example
//!
//! ```
//! use linkarr_core::quality::normalize_quality;
//!
//! assert_eq!(normalize_quality("ULTRA HD (x265)"), "Bluray-2160p");
//! assert_eq!(normalize_quality("some 4k webrip"), "WEBRip-2160p");
//! assert_eq!(normalize_quality(""), "WEBDL-1080p");
//! ```

mod category;
pub mod notes;
mod release;
mod size;

pub use category::category_code;
pub use release::{DEFAULT_AUDIO_LANGUAGE, ReleaseTitle, build_release_title};
pub use size::{MIN_TRUSTED_SIZE, estimate_size, resolve_size};

/// Canonical quality returned for blank or unrecognized input.
pub const DEFAULT_QUALITY: &str = "WEBDL-1080p";

/// Curated raw-label to canonical-quality table, matched exactly.
const QUALITY_TABLE: &[(&str, &str)] = &[
    ("ULTRA HD (x265)", "Bluray-2160p"),
    ("ULTRA HD", "Bluray-2160p"),
    ("UHD (x265)", "Bluray-2160p"),
    ("UHD", "Bluray-2160p"),
    ("Ultra HDLight (x265)", "WEBDL-2160p"),
    ("Ultra HDLight", "WEBDL-2160p"),
    ("REMUX UHD", "Bluray-2160p Remux"),
    ("REMUX 4K", "Bluray-2160p Remux"),
    ("REMUX BLURAY 2160p", "Bluray-2160p Remux"),
    ("4K", "WEBDL-2160p"),
    ("2160p", "WEBDL-2160p"),
    ("REMUX BLURAY", "Bluray-1080p Remux"),
    ("REMUX", "Bluray-1080p Remux"),
    ("REMUX 1080p", "Bluray-1080p Remux"),
    ("Bluray 1080p", "Bluray-1080p"),
    ("Bluray", "Bluray-1080p"),
    ("BDRip 1080p", "Bluray-1080p"),
    ("BRRip 1080p", "Bluray-1080p"),
    ("HDLight 1080p (x265)", "WEBDL-1080p"),
    ("HDLight 1080p", "WEBDL-1080p"),
    ("WEB 1080p", "WEBDL-1080p"),
    ("WEB-DL 1080p", "WEBDL-1080p"),
    ("WEBDL 1080p", "WEBDL-1080p"),
    ("WEBRip 1080p", "WEBRip-1080p"),
    ("1080p", "WEBDL-1080p"),
    ("Bluray 720p", "Bluray-720p"),
    ("HDLight 720p (x265)", "WEBDL-720p"),
    ("HDLight 720p", "WEBDL-720p"),
    ("WEB-DL 720p", "WEBDL-720p"),
    ("WEBRip 720p", "WEBRip-720p"),
    ("720p", "WEBDL-720p"),
    ("DVDRIP", "DVD"),
    ("DVDRip", "DVD"),
    ("DVD", "DVD"),
    ("HDTV 1080p", "HDTV-1080p"),
    ("HDTV 720p", "HDTV-720p"),
    ("HDTV", "HDTV-1080p"),
    ("Blu-Ray 3D", "Bluray-1080p"),
    ("REMUX 3D", "Bluray-1080p Remux"),
    ("ISO", "BR-DISK"),
    ("Autre", "WEBDL-1080p"),
];

/// Provider language labels mapped to scene tokens.
const LANGUAGE_TABLE: &[(&str, &str)] = &[
    ("French", "FRENCH"),
    ("TrueFrench", "TRUEFRENCH"),
    ("VFF", "VFF"),
    ("VFQ", "VFQ"),
    ("VFI", "VFI"),
    ("VF2", "VF2"),
    ("English", "ENGLISH"),
    ("German", "GERMAN"),
    ("Spanish", "SPANISH"),
    ("Italian", "ITALIAN"),
    ("Portuguese", "PORTUGUESE"),
    ("Russian", "RUSSIAN"),
    ("Japanese", "JAPANESE"),
    ("Korean", "KOREAN"),
    ("Chinese", "CHINESE"),
    ("Arabic", "ARABIC"),
    ("Hindi", "HINDI"),
    ("French (Canada)", "VFQ"),
    ("MULTI", "MULTI"),
    ("MULTi", "MULTI"),
];

/// Maps a raw provider quality label to the canonical quality taxonomy.
///
/// Exact table matches win. Otherwise resolution and release type are
/// inferred independently from substrings and composed as
/// `"{type}-{resolution}"`; DVD sources are returned bare.
#[must_use]
pub fn normalize_quality(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return DEFAULT_QUALITY.to_string();
    }

    if let Some((_, canonical)) = QUALITY_TABLE.iter().find(|(label, _)| *label == raw) {
        return (*canonical).to_string();
    }

    let lower = raw.to_lowercase();
    let resolution = infer_resolution(&lower);

    let release_type = if lower.contains("remux") {
        "Remux"
    } else if ["bluray", "bdrip", "brrip"].iter().any(|t| lower.contains(t)) {
        "Bluray"
    } else if lower.contains("webrip") {
        "WEBRip"
    } else if ["hdlight", "web-dl", "webdl", "web "]
        .iter()
        .any(|t| lower.contains(t))
    {
        "WEBDL"
    } else if lower.contains("hdtv") {
        "HDTV"
    } else if lower.contains("dvd") {
        return "DVD".to_string();
    } else {
        "WEBDL"
    };

    format!("{release_type}-{resolution}")
}

fn infer_resolution(lower: &str) -> &'static str {
    if ["2160", "4k", "uhd", "ultra hd"]
        .iter()
        .any(|t| lower.contains(t))
    {
        "2160p"
    } else if lower.contains("1080") {
        "1080p"
    } else if lower.contains("720") {
        "720p"
    } else if lower.contains("480") || lower.contains("sd") {
        "480p"
    } else {
        "1080p"
    }
}

/// Maps a provider language label to its scene token.
///
/// Unknown labels are uppercased with spaces removed.
#[must_use]
pub fn normalize_language(raw: &str) -> String {
    let raw = raw.trim();
    LANGUAGE_TABLE
        .iter()
        .find(|(label, _)| *label == raw)
        .map_or_else(|| raw.to_uppercase().replace(' ', ""), |(_, token)| (*token).to_string())
}
