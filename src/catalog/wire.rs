//! Upstream JSON shapes and their conversion into catalog entities.
//!
//! The catalog API is loosely typed (numbers arrive as strings, flags as
//! `0`/`1`, lists as `null`), so most scalar fields are read as
//! [`serde_json::Value`] and converted leniently.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::media::{Link, MediaKind, Title};

use super::session::CatalogLookups;

#[derive(Debug, Deserialize)]
pub(super) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawTitle {
    pub id: u64,
    pub name: String,
    pub original_title: Option<String>,
    pub year: Option<Value>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub tmdb_id: Option<Value>,
    pub imdb_id: Option<String>,
    pub have_link: Option<Value>,
}

impl RawTitle {
    /// Converts into a [`Title`]; titles of unsupported kinds yield `None`.
    pub fn into_title(self) -> Option<Title> {
        let kind = MediaKind::from_catalog_type(self.kind.as_deref()?)?;
        Some(Title {
            id: self.id,
            name: self.name,
            original_name: self.original_title.filter(|n| !n.trim().is_empty()),
            year: self.year.as_ref().and_then(value_as_year),
            kind,
            imdb_id: self.imdb_id.filter(|id| !id.trim().is_empty()),
            tmdb_id: self.tmdb_id.as_ref().and_then(value_as_u64),
            has_link: self.have_link.as_ref().is_some_and(value_is_truthy),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LinksResponse {
    pub status: Option<String>,
    pub title: Option<Value>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Pagination {
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Title fields repeated on the first page of a link listing.
#[derive(Debug, Default, Clone, Deserialize)]
pub(super) struct RawTitleInfo {
    pub name: Option<String>,
    pub year: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuality {
    qual: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNfo {
    nfo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawLink {
    id: u64,
    qualite: Option<Value>,
    qual: Option<RawQuality>,
    id_host: Option<Value>,
    host: Option<RawNamed>,
    langues_compact: Option<Vec<RawNamed>>,
    subs_compact: Option<Vec<RawNamed>>,
    taille: Option<Value>,
    nfo: Option<Vec<RawNfo>>,
    saison: Option<Value>,
    episode: Option<Value>,
    created_at: Option<String>,
}

impl RawLink {
    /// Converts into a [`Link`], naming quality and host through the
    /// session lookups when the record only carries their ids.
    pub fn into_link(self, title_id: u64, info: &RawTitleInfo, lookups: &CatalogLookups) -> Link {
        let quality = self
            .qual
            .and_then(|q| q.qual)
            .or_else(|| {
                self.qualite
                    .as_ref()
                    .and_then(value_as_u64)
                    .and_then(|id| lookups.quality(id))
            })
            .unwrap_or_default();
        let host = self
            .host
            .and_then(|h| h.name)
            .or_else(|| {
                self.id_host
                    .as_ref()
                    .and_then(value_as_u64)
                    .and_then(|id| lookups.host(id))
            })
            .unwrap_or_default();

        Link {
            id: self.id,
            title_id,
            title_name: info.name.clone().unwrap_or_default(),
            year: info.year.as_ref().and_then(value_as_year),
            quality,
            host,
            audio_languages: names(self.langues_compact),
            subtitle_languages: names(self.subs_compact),
            season: self
                .saison
                .as_ref()
                .and_then(value_as_u64)
                .and_then(|s| u32::try_from(s).ok())
                .unwrap_or(0),
            episode: self
                .episode
                .as_ref()
                .and_then(value_as_u64)
                .and_then(|e| u32::try_from(e).ok()),
            size: self.taille.as_ref().and_then(value_as_u64).unwrap_or(0),
            notes: self
                .nfo
                .and_then(|entries| entries.into_iter().find_map(|entry| entry.nfo))
                .filter(|text| !text.trim().is_empty()),
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
            download_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct DownloadResponse {
    pub lien: Option<RawLien>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawLien {
    pub deleted_at: Option<Value>,
    pub active: Option<Value>,
    #[serde(rename = "directDL")]
    pub direct_dl: Option<String>,
    pub lien: Option<String>,
}

impl RawLien {
    /// Returns the direct URL, preferring the direct-download field.
    pub fn url(&self) -> Option<&str> {
        [self.direct_dl.as_deref(), self.lien.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|url| !url.is_empty())
    }

    /// True when the record is neither soft-deleted nor deactivated.
    pub fn is_live(&self) -> bool {
        let deleted = self.deleted_at.as_ref().is_some_and(|v| !v.is_null());
        let active = self.active.as_ref().and_then(value_as_u64) == Some(1)
            || self.active.as_ref().and_then(Value::as_bool) == Some(true);
        !deleted && active
    }
}

fn names(entries: Option<Vec<RawNamed>>) -> Vec<String> {
    entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| entry.name)
        .filter(|name| !name.trim().is_empty())
        .collect()
}

pub(super) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_year(value: &Value) -> Option<i32> {
    let year: Option<i32> = match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    };
    year.filter(|year| *year > 0)
}

fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > f64::EPSILON),
        Value::String(s) => !matches!(s.trim(), "" | "0" | "false"),
        _ => false,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Datelike;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_raw_title_conversion_normalizes_kind_and_flags() {
        let raw: RawTitle = serde_json::from_value(json!({
            "id": 12,
            "name": "Show",
            "type": "animes",
            "year": "2021",
            "tmdb_id": "555",
            "have_link": 1
        }))
        .unwrap();
        let title = raw.into_title().unwrap();
        assert_eq!(title.kind, MediaKind::Series);
        assert_eq!(title.year, Some(2021));
        assert_eq!(title.tmdb_id, Some(555));
        assert!(title.has_link);
    }

    #[test]
    fn test_raw_title_unknown_kind_dropped() {
        let raw: RawTitle =
            serde_json::from_value(json!({"id": 1, "name": "Book", "type": "ebook"})).unwrap();
        assert!(raw.into_title().is_none());
    }

    #[test]
    fn test_raw_link_conversion_full_record() {
        let raw: RawLink = serde_json::from_value(json!({
            "id": 99,
            "qual": {"qual": "ULTRA HD (x265)"},
            "host": {"name": "1fichier"},
            "langues_compact": [{"name": "French"}, {"name": "English"}],
            "subs_compact": null,
            "taille": "0",
            "nfo": [{"nfo": "File size : 12 GiB"}],
            "saison": 1,
            "episode": null,
            "created_at": "2024-03-01T10:00:00.000000Z"
        }))
        .unwrap();
        let info = RawTitleInfo {
            name: Some("Test Movie".to_string()),
            year: Some(json!(2024)),
        };
        let link = raw.into_link(7, &info, &CatalogLookups::default());
        assert_eq!(link.id, 99);
        assert_eq!(link.title_id, 7);
        assert_eq!(link.title_name, "Test Movie");
        assert_eq!(link.year, Some(2024));
        assert_eq!(link.quality, "ULTRA HD (x265)");
        assert_eq!(link.host, "1fichier");
        assert_eq!(link.audio_languages, ["French", "English"]);
        assert!(link.subtitle_languages.is_empty());
        assert_eq!(link.size, 0);
        assert_eq!(link.notes.as_deref(), Some("File size : 12 GiB"));
        assert_eq!(link.episode, None);
        assert_eq!(link.created_at.unwrap().year(), 2024);
    }

    #[test]
    fn test_raw_link_names_resolved_from_lookups() {
        let raw: RawLink =
            serde_json::from_value(json!({"id": 1, "qualite": 3, "id_host": "8"})).unwrap();
        let lookups = CatalogLookups::from_pairs([(3, "HDLight 1080p")], [(8, "send.now")]);
        let link = raw.into_link(1, &RawTitleInfo::default(), &lookups);
        assert_eq!(link.quality, "HDLight 1080p");
        assert_eq!(link.host, "send.now");
    }

    #[test]
    fn test_raw_lien_liveness_rules() {
        let live: RawLien = serde_json::from_value(json!({
            "deleted_at": null, "active": 1, "directDL": "", "lien": "https://host/x"
        }))
        .unwrap();
        assert!(live.is_live());
        assert_eq!(live.url(), Some("https://host/x"));

        let deleted: RawLien = serde_json::from_value(json!({
            "deleted_at": "2024-01-01", "active": 1, "lien": "https://host/x"
        }))
        .unwrap();
        assert!(!deleted.is_live());

        let inactive: RawLien =
            serde_json::from_value(json!({"active": 0, "lien": "https://host/x"})).unwrap();
        assert!(!inactive.is_live());
    }

    #[test]
    fn test_parse_timestamp_accepts_sql_format() {
        let parsed = parse_timestamp("2023-11-05 08:15:00").unwrap();
        assert_eq!(parsed.year(), 2023);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
