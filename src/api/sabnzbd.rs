//! SABnzbd download-client facade.
//!
//! Every reply is HTTP 200 JSON except an API key mismatch, which is a 401.

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use super::{AppState, param, parse_query};
use crate::downloads::{DeleteScope, Download, DownloadStatus, NewDownload};
use crate::payload::{LinkPayload, token_from_nzb, token_from_url};

/// Version reported to clients; they gate features on it.
const SAB_VERSION: &str = "4.2.1";

const DEFAULT_SLOT_LIMIT: usize = 100;

const CATEGORIES: &[&str] = &["*", "radarr", "sonarr", "lidarr", "radarr-anime", "sonarr-anime"];

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Default, Deserialize)]
pub(super) struct SabParams {
    mode: Option<String>,
    apikey: Option<String>,
    cat: Option<String>,
    category: Option<String>,
    name: Option<String>,
    value: Option<String>,
    start: Option<String>,
    limit: Option<String>,
}

/// `GET|POST /sabnzbd/api`.
pub(super) async fn api(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> Response {
    dispatch(&state, raw.as_deref(), body).await
}

/// Routes one download-client call by its `mode`.
pub(super) async fn dispatch(state: &AppState, raw: Option<&str>, body: Bytes) -> Response {
    let params: SabParams = parse_query(raw);
    let mode = param(params.mode.as_ref())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if mode == "version" {
        return Json(json!({"version": SAB_VERSION})).into_response();
    }
    if !state.key_matches(param(params.apikey.as_ref())) {
        warn!(mode = %mode, "Download-client request with invalid API key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": false, "error": "API Key Incorrect"})),
        )
            .into_response();
    }

    let category = param(params.category.as_ref())
        .or_else(|| param(params.cat.as_ref()))
        .unwrap_or_default()
        .to_string();
    let name = param(params.name.as_ref());
    let start = param(params.start.as_ref())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let limit = param(params.limit.as_ref())
        .and_then(|s| s.parse().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_SLOT_LIMIT);
    debug!(mode = %mode, category = %category, "Download-client request");

    let reply = match mode.as_str() {
        "queue" | "history" if name == Some("delete") => {
            delete(state, &mode, param(params.value.as_ref())).await
        }
        "queue" => queue(state, &category, start, limit).await,
        "history" => history(state, &category, start, limit).await,
        "addurl" => match name {
            Some(name) => add_url(state, name, &category).await,
            None => failure("No link data found"),
        },
        "addfile" => add_file(state, &body, &category).await,
        "config" | "get_config" => config(state),
        "fullstatus" => fullstatus(state).await,
        other => {
            debug!(mode = other, "Unsupported download-client mode");
            json!({"status": true})
        }
    };
    Json(reply).into_response()
}

fn failure(message: impl Into<String>) -> Value {
    json!({"status": false, "error": message.into()})
}

// ==================== Accept ====================

async fn add_url(state: &AppState, name: &str, category: &str) -> Value {
    let token = match token_from_url(name) {
        Some(token) => Some(token),
        None => fetch_token(state, name).await,
    };
    let Some(token) = token else {
        warn!("No payload token in submitted URL");
        return failure("No link data found");
    };
    accept_token(state, &token, category).await
}

async fn add_file(state: &AppState, body: &Bytes, category: &str) -> Value {
    // Raw NZB or a multipart upload: the token is found in either.
    let text = String::from_utf8_lossy(body);
    let Some(token) = token_from_nzb(&text) else {
        warn!("No payload token in uploaded NZB");
        return failure("No link_data in NZB");
    };
    accept_token(state, token, category).await
}

/// Downloads an NZB document and extracts its token.
///
/// Only URLs served by this service are fetched.
async fn fetch_token(state: &AppState, url: &str) -> Option<String> {
    if !is_served_by(&state.settings.public_url, url) {
        warn!("Refusing to fetch NZB outside the public URL");
        return None;
    }
    let response = match state.http.get(url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!(status = response.status().as_u16(), "NZB fetch rejected");
            return None;
        }
        Err(error) => {
            warn!(error = %error, "NZB fetch failed");
            return None;
        }
    };
    let text = response.text().await.ok()?;
    token_from_nzb(&text).map(str::to_string)
}

/// True when `url` shares scheme, host and port with `public_url` and sits
/// under its path.
fn is_served_by(public_url: &str, url: &str) -> bool {
    let (Ok(base), Ok(target)) = (Url::parse(public_url.trim()), Url::parse(url.trim())) else {
        return false;
    };
    let prefix = base.path().trim_end_matches('/');
    base.scheme() == target.scheme()
        && base.host_str() == target.host_str()
        && base.port_or_known_default() == target.port_or_known_default()
        && (target.path() == prefix
            || target
                .path()
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/')))
}

async fn accept_token(state: &AppState, token: &str, category: &str) -> Value {
    let payload = match LinkPayload::decode(token) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(error = %error, "Undecodable payload token");
            return failure("Invalid link data");
        }
    };

    let mut url = payload.url.clone().filter(|u| !u.trim().is_empty());
    if url.is_none()
        && let Some(link_id) = payload.link_id
    {
        info!(link_id, "Payload carries no URL; resolving from the catalog");
        url = state.catalog.resolve_download_url(link_id).await;
    }
    let Some(url) = url else {
        return failure("No download URL in data");
    };

    let request = NewDownload {
        title: payload.download_title(),
        category: category.to_string(),
        urls: vec![url],
        link_id: payload.link_id,
    };
    match state.downloads.accept(request).await {
        Ok(download) => json!({"status": true, "nzo_ids": [download.queue_id]}),
        Err(error) => {
            warn!(error = %error, "Accepting download failed");
            failure(error.to_string())
        }
    }
}

// ==================== Queue & History ====================

async fn queue(state: &AppState, category: &str, start: usize, limit: usize) -> Value {
    if let Err(error) = state.downloads.reconcile_all().await {
        warn!(error = %error, "Reconciliation before queue listing failed");
    }
    let downloads: Vec<Download> = state
        .downloads
        .active()
        .await
        .into_iter()
        .filter(|d| in_category(d, category))
        .collect();

    let total_size: u64 = downloads.iter().map(|d| d.bytes_total).sum();
    let total_left: u64 = downloads.iter().map(Download::bytes_remaining).sum();
    let total_speed: u64 = downloads.iter().map(|d| d.speed).sum();
    let downloading = downloads
        .iter()
        .any(|d| d.status == DownloadStatus::Downloading);
    let slots: Vec<Value> = downloads.iter().skip(start).take(limit).map(queue_slot).collect();

    json!({
        "queue": {
            "status": if downloading { "Downloading" } else { "Idle" },
            "paused": false,
            "speedlimit": "0",
            "speedlimit_abs": "0",
            "speed": format_speed(total_speed),
            "kbpersec": if total_speed == 0 { "0".to_string() } else { format!("{:.2}", to_f64(total_speed) / KIB) },
            "mb": format!("{:.2}", to_f64(total_size) / MIB),
            "mbleft": format!("{:.2}", to_f64(total_left) / MIB),
            "sizeleft": format!("{:.2} GB", to_f64(total_left) / GIB),
            "noofslots_total": downloads.len(),
            "noofslots": slots.len(),
            "start": start,
            "limit": limit,
            "slots": slots,
        }
    })
}

async fn history(state: &AppState, category: &str, start: usize, limit: usize) -> Value {
    let mut downloads: Vec<Download> = state
        .downloads
        .history()
        .await
        .into_iter()
        .filter(|d| in_category(d, category))
        .collect();
    downloads.reverse();

    let manager = state.downloads.clone();
    tokio::spawn(async move {
        if let Err(error) = manager.cleanup_stale().await {
            warn!(error = %error, "Stale download cleanup failed");
        }
    });

    let slots: Vec<Value> = downloads.iter().skip(start).take(limit).map(history_slot).collect();
    json!({
        "history": {
            "noofslots": downloads.len(),
            "slots": slots,
        }
    })
}

async fn delete(state: &AppState, mode: &str, value: Option<&str>) -> Value {
    let Some(value) = value else {
        return failure("No id given");
    };
    if value.eq_ignore_ascii_case("all") {
        let scope = if mode == "queue" {
            DeleteScope::Active
        } else {
            DeleteScope::History
        };
        return match state.downloads.delete_all(scope).await {
            Ok(_) => json!({"status": true}),
            Err(error) => failure(error.to_string()),
        };
    }
    for id in value.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if let Err(error) = state.downloads.delete(id).await {
            return failure(error.to_string());
        }
    }
    json!({"status": true})
}

fn in_category(download: &Download, category: &str) -> bool {
    category.is_empty() || category == "*" || download.category == category
}

fn sab_status(status: DownloadStatus) -> &'static str {
    match status {
        DownloadStatus::Queued => "Queued",
        DownloadStatus::Downloading => "Downloading",
        DownloadStatus::Paused => "Paused",
        DownloadStatus::Extracting => "Extracting",
        DownloadStatus::Completed => "Completed",
        DownloadStatus::Failed => "Failed",
    }
}

fn queue_slot(download: &Download) -> Value {
    let timeleft = format_time(download.eta);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percentage = download.percent() as u64;
    json!({
        "nzo_id": download.queue_id,
        "filename": download.title,
        "cat": download.category,
        "status": sab_status(download.status),
        "percentage": percentage.to_string(),
        "mb": format!("{:.2}", to_f64(download.bytes_total) / MIB),
        "mbleft": format!("{:.2}", to_f64(download.bytes_remaining()) / MIB),
        "size": format_size(download.bytes_total),
        "sizeleft": format_size(download.bytes_remaining()),
        "timeleft": timeleft,
        "eta": timeleft,
    })
}

fn history_slot(download: &Download) -> Value {
    json!({
        "nzo_id": download.queue_id,
        "name": download.title,
        "category": download.category,
        "status": sab_status(download.status),
        "bytes": download.bytes_total,
        "size": format_size(download.bytes_total),
        "completed": download.completed_at.map_or(0, |at| at.timestamp()),
        "storage": download.output_path.clone().unwrap_or_default(),
        "fail_message": download.error.clone().unwrap_or_default(),
    })
}

// ==================== Config & Status ====================

fn config(state: &AppState) -> Value {
    let categories: Vec<Value> = CATEGORIES
        .iter()
        .enumerate()
        .map(|(order, name)| {
            json!({
                "name": name,
                "order": order,
                "pp": "",
                "script": "None",
                "dir": if *name == "*" { "" } else { name },
                "priority": -100,
            })
        })
        .collect();
    let complete_dir = state.downloads.download_dir().to_string_lossy().into_owned();
    json!({
        "config": {
            "misc": {
                "complete_dir": complete_dir,
                "download_dir": complete_dir,
            },
            "categories": categories,
        }
    })
}

async fn fullstatus(state: &AppState) -> Value {
    let speed: u64 = state.downloads.active().await.iter().map(|d| d.speed).sum();
    json!({
        "status": {
            "paused": false,
            "diskspace1": "100.00",
            "diskspace2": "100.00",
            "speedlimit": "0",
            "speed": format_speed(speed),
        }
    })
}

// ==================== Formatting ====================

#[allow(clippy::cast_precision_loss)]
fn to_f64(bytes: u64) -> f64 {
    bytes as f64
}

fn format_size(bytes: u64) -> String {
    let value = to_f64(bytes);
    if value < KIB {
        format!("{bytes} B")
    } else if value < MIB {
        format!("{:.2} KB", value / KIB)
    } else if value < GIB {
        format!("{:.2} MB", value / MIB)
    } else {
        format!("{:.2} GB", value / GIB)
    }
}

fn format_speed(bytes_per_sec: u64) -> String {
    if bytes_per_sec == 0 {
        "0 B/s".to_string()
    } else {
        format!("{:.2} MB/s", to_f64(bytes_per_sec) / MIB)
    }
}

/// Seconds as `H:MM:SS`.
fn format_time(seconds: Option<u64>) -> String {
    let seconds = seconds.unwrap_or(0);
    let (hours, rest) = (seconds / 3600, seconds % 3600);
    format!("{hours}:{:02}:{:02}", rest / 60, rest % 60)
}
