//! Newznab indexer facade.

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Deserialize;
use tracing::{info, warn};

use super::{AppState, param, parse_query, sabnzbd};
use crate::media::MediaKind;
use crate::metadata::ExternalId;
use crate::payload::{LinkPayload, nzb_document, nzb_url};
use crate::search::{IndexedRelease, SearchRequest};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;
const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S +0000";
const NEWZNAB_NAMESPACE: &str = "http://www.newznab.com/DTD/2010/feeds/attributes/";

const MOVIE_SUBCATEGORIES: &[(u32, &str)] = &[
    (2010, "Movies/Foreign"),
    (2020, "Movies/Other"),
    (2030, "Movies/SD"),
    (2040, "Movies/HD"),
    (2045, "Movies/UHD"),
    (2050, "Movies/BluRay"),
    (2060, "Movies/3D"),
];

const TV_SUBCATEGORIES: &[(u32, &str)] = &[
    (5010, "TV/WEB-DL"),
    (5020, "TV/Foreign"),
    (5030, "TV/SD"),
    (5040, "TV/HD"),
    (5045, "TV/UHD"),
    (5070, "TV/Anime"),
];

const AUDIO_SUBCATEGORIES: &[(u32, &str)] = &[(3010, "Audio/MP3"), (3040, "Audio/Lossless")];

#[derive(Debug, Default, Deserialize)]
pub(super) struct NewznabParams {
    t: Option<String>,
    apikey: Option<String>,
    q: Option<String>,
    cat: Option<String>,
    imdbid: Option<String>,
    tmdbid: Option<String>,
    tvdbid: Option<String>,
    season: Option<String>,
    ep: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    offset: Option<String>,
    limit: Option<String>,
    mode: Option<String>,
}

/// One `<item>` of the RSS feed.
#[derive(Debug, Clone, PartialEq)]
struct FeedItem {
    title: String,
    guid: String,
    link: String,
    size: u64,
    category: u32,
    published_at: DateTime<Utc>,
    season: Option<u32>,
    episode: Option<u32>,
}

/// `GET|POST /api`.
pub(super) async fn api(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> Response {
    let params: NewznabParams = parse_query(raw.as_deref());
    if param(params.mode.as_ref()).is_some() {
        return sabnzbd::dispatch(&state, raw.as_deref(), body).await;
    }

    let function = param(params.t.as_ref()).unwrap_or("caps").to_ascii_lowercase();
    if function == "caps" {
        return xml(caps_xml());
    }

    if !state.key_matches(param(params.apikey.as_ref())) {
        warn!("Newznab request with invalid API key");
        return xml(error_xml(100, "Incorrect API Key"));
    }
    let api_key = state.settings.api_key.clone();

    let media_kind = media_kind_for(&function, param(params.cat.as_ref()));
    let offset = parse_number(params.offset.as_ref()).unwrap_or(0);
    let limit = parse_number(params.limit.as_ref())
        .unwrap_or(DEFAULT_LIMIT)
        .min(MAX_LIMIT);

    let Some(query) = search_query(&state, &params, media_kind).await else {
        let items = test_items(&function, &state.settings.public_url, &api_key);
        info!(function = %function, count = items.len(), "Newznab connectivity check answered with test items");
        let total = items.len();
        return xml(rss(&items, media_kind, 0, total));
    };

    let request = SearchRequest {
        query,
        media_kind,
        season: parse_number(params.season.as_ref()),
        episode: parse_number(params.ep.as_ref()),
    };
    let releases = state.search.search(&request).await;
    let total = releases.len();
    let items: Vec<FeedItem> = releases
        .iter()
        .skip(offset)
        .take(limit)
        .map(|release| feed_item(release, &state.settings.public_url, &api_key))
        .collect();

    info!(function = %function, kind = %media_kind, total, returned = items.len(), "Newznab search answered");
    xml(rss(&items, media_kind, offset, total))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct NzbParams {
    id: Option<String>,
    apikey: Option<String>,
}

/// `GET /nzb?id=TOKEN&apikey=KEY`.
pub(super) async fn nzb(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let params: NzbParams = parse_query(raw.as_deref());
    if !state.key_matches(param(params.apikey.as_ref())) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(token) = param(params.id.as_ref()) else {
        return (StatusCode::BAD_REQUEST, "missing id").into_response();
    };

    match LinkPayload::decode(token) {
        Ok(payload) => info!(title = %payload.download_title(), "NZB requested"),
        Err(_) => info!("NZB requested for an opaque token"),
    }

    (
        [
            (header::CONTENT_TYPE, "application/x-nzb"),
            (
                header::CONTENT_DISPOSITION,
                r#"attachment; filename="linkarr-download.nzb""#,
            ),
        ],
        nzb_document(token),
    )
        .into_response()
}

/// Media kind from the function name, else from requested category ranges.
fn media_kind_for(function: &str, categories: Option<&str>) -> MediaKind {
    match function {
        "movie" => return MediaKind::Movie,
        "tvsearch" | "tv" => return MediaKind::Series,
        "music" | "audio" => return MediaKind::Music,
        _ => {}
    }
    let codes: Vec<u32> = categories
        .unwrap_or_default()
        .split(',')
        .filter_map(|code| code.trim().parse().ok())
        .collect();
    if codes.iter().any(|c| (3000..4000).contains(c)) {
        MediaKind::Music
    } else if codes.iter().any(|c| (5000..6000).contains(c)) {
        MediaKind::Series
    } else {
        MediaKind::Movie
    }
}

/// Free-text query for a request, resolving external ids when no text was
/// given. `None` means the request is a connectivity check.
async fn search_query(state: &AppState, params: &NewznabParams, kind: MediaKind) -> Option<String> {
    if let Some(q) = param(params.q.as_ref()) {
        return Some(q.to_string());
    }
    if let Some(imdb) = param(params.imdbid.as_ref()) {
        let resolved = state.tmdb.resolve(&ExternalId::Imdb(imdb.to_string())).await;
        if resolved.is_none() {
            warn!(imdb, "IMDB id unresolved; searching for the id itself");
        }
        return Some(resolved.unwrap_or_else(|| imdb.to_string()));
    }
    if let Some(tmdb) = param(params.tmdbid.as_ref()) {
        let kind = if kind == MediaKind::Movie {
            MediaKind::Movie
        } else {
            MediaKind::Series
        };
        return state
            .tmdb
            .resolve(&ExternalId::Tmdb {
                id: tmdb.to_string(),
                kind,
            })
            .await;
    }
    if let Some(tvdb) = param(params.tvdbid.as_ref()) {
        return state.tmdb.resolve(&ExternalId::Tvdb(tvdb.to_string())).await;
    }
    if let Some(artist) = param(params.artist.as_ref()) {
        let album = param(params.album.as_ref()).unwrap_or_default();
        return Some(format!("{artist} {album}").trim().to_string());
    }
    None
}

fn parse_number<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
    param(value).and_then(|v| v.parse().ok())
}

fn feed_item(release: &IndexedRelease, public_url: &str, api_key: &str) -> FeedItem {
    FeedItem {
        title: release.title.clone(),
        guid: release.guid.clone(),
        link: nzb_url(public_url, &release.payload.encode(), api_key),
        size: release.size,
        category: release.category,
        published_at: release.published_at,
        season: release.season,
        episode: release.episode,
    }
}

/// Fixed items answering empty queries, so clients can validate the indexer.
fn test_items(function: &str, public_url: &str, api_key: &str) -> Vec<FeedItem> {
    let now = Utc::now();
    let item = |title: &str, guid: &str, size: u64, category: u32| FeedItem {
        title: title.to_string(),
        guid: guid.to_string(),
        link: nzb_url(public_url, guid, api_key),
        size,
        category,
        published_at: now,
        season: None,
        episode: None,
    };
    match function {
        "movie" | "m" => vec![
            item("Test Movie (2024) BluRay-1080p TrueFrench", "test-1", 8_589_934_592, 2040),
            item("Test Movie (2024) UHD-2160p TrueFrench", "test-2", 32_212_254_720, 2045),
        ],
        "tvsearch" | "tv" => vec![item("Test Show S01E01 WEBDL-1080p", "test-tv-1", 2_147_483_648, 5040)],
        "music" | "audio" => vec![item("Test Album (2024) FLAC", "test-music-1", 524_288_000, 3040)],
        _ => vec![item("Test Result (2024)", "test-1", 8_589_934_592, 2040)],
    }
}

fn channel_title(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Movie => "linkarr (Movies)",
        MediaKind::Series => "linkarr (TV)",
        MediaKind::Music => "linkarr (Music)",
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn xml_writer() -> anyhow::Result<XmlWriter> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    Ok(writer)
}

fn finish(writer: XmlWriter) -> anyhow::Result<String> {
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(String::from_utf8(bytes)?)
}

fn error_xml(code: u16, description: &str) -> anyhow::Result<String> {
    let mut writer = xml_writer()?;
    writer
        .create_element("error")
        .with_attribute(("code", code.to_string().as_str()))
        .with_attribute(("description", description))
        .write_empty()?;
    finish(writer)
}

fn rss(items: &[FeedItem], kind: MediaKind, offset: usize, total: usize) -> anyhow::Result<String> {
    let mut writer = xml_writer()?;
    writer.write_event(Event::Start(BytesStart::new("rss").with_attributes([
        ("version", "2.0"),
        ("xmlns:atom", "http://www.w3.org/2005/Atom"),
        ("xmlns:newznab", NEWZNAB_NAMESPACE),
    ])))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;
    writer
        .create_element("title")
        .write_text_content(BytesText::new(channel_title(kind)))?;
    writer
        .create_element("description")
        .write_text_content(BytesText::new("linkarr Newznab feed"))?;
    writer
        .create_element("newznab:response")
        .with_attribute(("offset", offset.to_string().as_str()))
        .with_attribute(("total", total.to_string().as_str()))
        .write_empty()?;
    for item in items {
        write_item(&mut writer, item)?;
    }
    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;
    finish(writer)
}

fn write_item(writer: &mut XmlWriter, item: &FeedItem) -> anyhow::Result<()> {
    let size = item.size.to_string();
    let pub_date = item.published_at.format(PUB_DATE_FORMAT).to_string();

    writer.write_event(Event::Start(BytesStart::new("item")))?;
    writer
        .create_element("title")
        .write_text_content(BytesText::new(&item.title))?;
    writer
        .create_element("guid")
        .with_attribute(("isPermaLink", "false"))
        .write_text_content(BytesText::new(&item.guid))?;
    writer
        .create_element("link")
        .write_text_content(BytesText::new(&item.link))?;
    writer
        .create_element("pubDate")
        .write_text_content(BytesText::new(&pub_date))?;
    writer
        .create_element("enclosure")
        .with_attributes([
            ("url", item.link.as_str()),
            ("length", size.as_str()),
            ("type", "application/x-nzb"),
        ])
        .write_empty()?;

    let mut attributes = vec![
        ("category", item.category.to_string()),
        ("size", size.clone()),
        ("guid", item.guid.clone()),
        ("grabs", "100".to_string()),
    ];
    if let Some(season) = item.season {
        attributes.push(("season", format!("S{season:02}")));
    }
    if let Some(episode) = item.episode {
        attributes.push(("episode", format!("E{episode:02}")));
    }
    for (name, value) in &attributes {
        writer
            .create_element("newznab:attr")
            .with_attributes([("name", *name), ("value", value.as_str())])
            .write_empty()?;
    }

    writer.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

fn caps_xml() -> anyhow::Result<String> {
    let mut writer = xml_writer()?;
    writer.write_event(Event::Start(BytesStart::new("caps")))?;
    writer
        .create_element("server")
        .with_attributes([
            ("version", env!("CARGO_PKG_VERSION")),
            ("title", "linkarr"),
            ("strapline", "Direct-download indexer"),
        ])
        .write_empty()?;
    writer
        .create_element("limits")
        .with_attribute(("max", MAX_LIMIT.to_string().as_str()))
        .with_attribute(("default", DEFAULT_LIMIT.to_string().as_str()))
        .write_empty()?;
    writer
        .create_element("retention")
        .with_attribute(("days", "9999"))
        .write_empty()?;
    writer
        .create_element("registration")
        .with_attributes([("available", "no"), ("open", "no")])
        .write_empty()?;

    writer.write_event(Event::Start(BytesStart::new("searching")))?;
    for (function, params) in [
        ("search", "q"),
        ("tv-search", "q,tvdbid,imdbid,season,ep"),
        ("movie-search", "q,imdbid,tmdbid"),
        ("music-search", "q,artist,album"),
        ("audio-search", "q,artist,album"),
    ] {
        writer
            .create_element(function)
            .with_attributes([("available", "yes"), ("supportedParams", params)])
            .write_empty()?;
    }
    writer.write_event(Event::End(BytesEnd::new("searching")))?;

    writer.write_event(Event::Start(BytesStart::new("categories")))?;
    for (id, name, subcategories) in [
        (2000, "Movies", MOVIE_SUBCATEGORIES),
        (5000, "TV", TV_SUBCATEGORIES),
        (3000, "Audio", AUDIO_SUBCATEGORIES),
    ] {
        let id = id.to_string();
        writer.write_event(Event::Start(
            BytesStart::new("category").with_attributes([("id", id.as_str()), ("name", name)]),
        ))?;
        for (sub_id, sub_name) in subcategories {
            writer
                .create_element("subcat")
                .with_attribute(("id", sub_id.to_string().as_str()))
                .with_attribute(("name", *sub_name))
                .write_empty()?;
        }
        writer.write_event(Event::End(BytesEnd::new("category")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("categories")))?;

    writer.write_event(Event::End(BytesEnd::new("caps")))?;
    finish(writer)
}

fn xml(body: anyhow::Result<String>) -> Response {
    match body {
        Ok(body) => ([(header::CONTENT_TYPE, "application/xml")], body).into_response(),
        Err(error) => {
            warn!(error = %error, "Rendering XML reply failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
