//! HTTP facades.
//!
//! # Overview
//!
//! One axum router serves both client-facing protocols:
//!
//! - `GET /api` speaks the Newznab indexer protocol (capabilities, searches)
//!   and forwards `mode=` requests to the download-client protocol
//! - `GET /nzb` hands out the NZB document wrapping a payload token
//! - `GET|POST /sabnzbd/api` speaks the SABnzbd download-client protocol
//! - `GET /` and `GET /health` report service status
//!
//! Both protocols authenticate with the shared API key passed as `apikey`.

mod newznab;
mod sabnzbd;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::response::Json;
use axum::routing::get;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::catalog::CatalogClient;
use crate::config::Settings;
use crate::downloads::DownloadManager;
use crate::http_client::{HttpClientError, build_http_client};
use crate::metadata::TmdbClient;
use crate::search::SearchService;
use crate::user_agent;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub search: SearchService,
    pub tmdb: Arc<TmdbClient>,
    pub downloads: Arc<DownloadManager>,
    pub catalog: Arc<CatalogClient>,
    /// Fetches NZB documents for `addurl` requests that carry no token.
    http: reqwest::Client,
}

impl AppState {
    /// Bundles the services behind the facades.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] when the NZB fetch client cannot be built.
    pub fn new(
        settings: Arc<Settings>,
        search: SearchService,
        tmdb: Arc<TmdbClient>,
        downloads: Arc<DownloadManager>,
        catalog: Arc<CatalogClient>,
    ) -> Result<Self, HttpClientError> {
        let http = build_http_client(
            "nzb-fetch",
            user_agent::default_api_user_agent(),
            settings.http_options(),
            None,
        )?;
        Ok(Self {
            settings,
            search,
            tmdb,
            downloads,
            catalog,
            http,
        })
    }

    fn key_matches(&self, provided: Option<&str>) -> bool {
        provided == Some(self.settings.api_key.as_str())
    }
}

/// Builds the facade router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api", get(newznab::api).post(newznab::api))
        .route("/nzb", get(newznab::nzb))
        .route("/sabnzbd/api", get(sabnzbd::api).post(sabnzbd::api))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves `app` until `shutdown` resolves; in-flight requests finish first.
///
/// # Errors
///
/// Returns the listener's I/O error.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn index() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "newznab": "/api?t=caps",
            "sabnzbd": "/api?mode=version",
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Decodes a raw query string; malformed input decodes as no parameters.
fn parse_query<T: DeserializeOwned + Default>(raw: Option<&str>) -> T {
    let raw = raw.unwrap_or_default();
    serde_urlencoded::from_str(raw).unwrap_or_else(|error| {
        debug!(error = %error, "Ignoring malformed query string");
        T::default()
    })
}

/// Trims a parameter, treating blank values as absent.
fn param(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
