//! Best-effort extraction from free-text release notes (NFO).
//!
//! Notes are uploader-written text of no fixed format. Both parsers return
//! `None` whenever nothing recognizable is found; a miss is "no data", never
//! an error.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Size patterns, most specific first: labelled lines ("File size : 6.75 GiB"),
/// then any amount followed by a size unit ("Taille : 1,36 Gio").
#[allow(clippy::expect_used)]
static SIZE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)File\s*size\s*:\s*([\d.,]+)\s*(GiB|GB|Gio|Go|MiB|MB|Mio|Mo)\b")
            .expect("file size regex is valid"),
        Regex::new(r"(?i)\bSize\s*:\s*([\d.,]+)\s*(GiB|GB|Gio|Go|MiB|MB|Mio|Mo)\b")
            .expect("size regex is valid"),
        Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s*(GiB|GB|Gio|Go|MiB|MB|Mio|Mo)\b")
            .expect("bare size regex is valid"),
    ]
});

#[allow(clippy::expect_used)]
static EDITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(EXTENDED|THEATRICAL|UNRATED|UNCUT|DIRECTOR'?S?[ .]?CUT|FINAL[ .]?CUT|SPECIAL[ .]?EDITION|REMASTERED|ANNIVERSARY|COLLECTOR'?S?[ .]?EDITION|CRITERION|IMAX|3D|DC)\b",
    )
    .expect("edition regex is valid")
});

/// Extracts the file size in bytes from release notes.
///
/// Decimal commas are accepted (`2,54 GB`). Gigabyte units are converted
/// with 1024³ and megabyte units with 1024², matching how release tools
/// print sizes.
#[must_use]
pub fn parse_size(notes: &str) -> Option<u64> {
    SIZE_PATTERNS.iter().find_map(|pattern| {
        let captures = pattern.captures(notes)?;
        let amount: f64 = captures.get(1)?.as_str().replace(',', ".").parse().ok()?;
        let multiplier = match captures.get(2)?.as_str().to_ascii_uppercase().as_str() {
            "GIB" | "GB" | "GIO" | "GO" => GIB,
            _ => MIB,
        };
        let bytes = amount * multiplier;
        if !bytes.is_finite() || bytes <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bytes = bytes as u64;
        debug!(bytes, "Size found in release notes");
        Some(bytes)
    })
}

/// Extracts a release edition tag (`EXTENDED`, `DIRECTOR'S CUT`, ...) from notes.
///
/// Only the first match is returned.
#[must_use]
pub fn parse_edition(notes: &str) -> Option<String> {
    let matched = EDITION_PATTERN.captures(notes)?.get(1)?.as_str();
    let edition = matched.to_uppercase().replace(['.', '\''], " ");
    let edition = edition.split_whitespace().collect::<Vec<_>>().join(" ");
    let edition = match edition.as_str() {
        "DIRECTORS CUT" | "DIRECTOR S CUT" | "DIRECTORSCUT" | "DIRECTOR CUT" => {
            "DIRECTOR'S CUT".to_string()
        }
        "COLLECTOR S EDITION" | "COLLECTORSEDITION" => "COLLECTORS EDITION".to_string(),
        _ => edition,
    };
    debug!(edition = %edition, "Edition found in release notes");
    Some(edition)
}
