//! Catalog entities shared by the search and download pipelines.
//!
//! [`Title`] and [`Link`] are read-only snapshots of upstream catalog records.
//! Neither is persisted: they are discovered per query and dropped once the
//! query has been answered.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media a catalog title represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A single feature film.
    Movie,
    /// Episodic content (tv shows and anime).
    Series,
    /// Music albums.
    Music,
}

impl MediaKind {
    /// Returns the canonical lowercase label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Music => "music",
        }
    }

    /// Maps an upstream catalog type label to a media kind.
    ///
    /// The catalog labels anime and tv separately; both collapse to
    /// [`MediaKind::Series`]. Unknown labels (ebooks, games) return `None`.
    #[must_use]
    pub fn from_catalog_type(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" | "film" => Some(Self::Movie),
            "series" | "serie" | "tv" | "animes" | "anime" => Some(Self::Series),
            "music" | "album" => Some(Self::Music),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_catalog_type(s).ok_or_else(|| format!("invalid media kind: {s}"))
    }
}

/// An upstream catalog entry (one movie, series or album).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    /// Opaque upstream identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Original-language name when it differs from the display name.
    pub original_name: Option<String>,
    /// Release year when known.
    pub year: Option<i32>,
    /// Media kind.
    pub kind: MediaKind,
    /// IMDB identifier (`tt...`) when known.
    pub imdb_id: Option<String>,
    /// TMDB identifier when known.
    pub tmdb_id: Option<u64>,
    /// Whether the catalog lists at least one download link.
    pub has_link: bool,
}

/// One downloadable mirror of a [`Title`].
///
/// Identity is the provider's link id. The owning title's name and year are
/// carried along so release naming needs nothing but the link itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Opaque upstream link identifier.
    pub id: u64,
    /// Owning title identifier.
    pub title_id: u64,
    /// Owning title display name.
    pub title_name: String,
    /// Owning title release year.
    pub year: Option<i32>,
    /// Raw provider quality label.
    pub quality: String,
    /// Distribution host name.
    pub host: String,
    /// Audio languages, primary first.
    pub audio_languages: Vec<String>,
    /// Subtitle languages.
    pub subtitle_languages: Vec<String>,
    /// Season number (0 when not applicable).
    pub season: u32,
    /// Episode number; `None` or `Some(0)` marks a season pack.
    pub episode: Option<u32>,
    /// Provider-reported size in bytes (0 = unknown).
    pub size: u64,
    /// Free-text release notes (NFO) attached to the link.
    pub notes: Option<String>,
    /// When the link was published upstream.
    pub created_at: Option<DateTime<Utc>>,
    /// Direct-download URL, set once the link has been verified.
    pub download_url: Option<String>,
}

impl Link {
    /// Returns the episode number with season packs normalized to 0.
    #[must_use]
    pub fn episode_number(&self) -> u32 {
        self.episode.unwrap_or(0)
    }

    /// Returns true when the link covers a whole season.
    #[must_use]
    pub fn is_season_pack(&self) -> bool {
        self.episode_number() == 0
    }
}
