//! Upstream catalog client.
//!
//! # Overview
//!
//! [`CatalogClient`] authenticates against the direct-download catalog with
//! a remember-me cookie, searches titles, pages through per-title link
//! listings and resolves direct-download URLs.
//!
//! The public operations never fail: every error is logged and the caller
//! gets an empty result. Without configured credentials the client fails
//! closed and issues no catalog requests at all.
//!
//! # Example
//!
//! ```no_run
//! use linkarr_core::catalog::{CatalogClient, CatalogCredentials};
//! use linkarr_core::http_client::HttpClientOptions;
//! use linkarr_core::media::MediaKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = CatalogCredentials::new("remember_web", "token");
//! let client = CatalogClient::new(
//!     "https://catalog.example",
//!     Some(credentials),
//!     HttpClientOptions::default(),
//! )?;
//! let titles = client.search("Test Movie", Some(MediaKind::Movie), 10).await;
//! # Ok(())
//! # }
//! ```

mod error;
mod session;
mod wire;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, REFERER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use error::CatalogError;
pub use session::{CatalogLookups, SESSION_TTL};

use crate::http_client::{HttpClientOptions, build_http_client};
use crate::media::{Link, MediaKind, Title};
use crate::user_agent;
use crate::verify::LinkProbe;

use session::Session;

/// Default upstream catalog.
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://darkiworld.com";

/// Records per page the upstream actually returns; a shorter page is the last.
pub const LINKS_PAGE_CAP: usize = 42;

/// Hard ceiling on listing pages fetched per title.
pub const MAX_LINK_PAGES: u32 = 50;

/// Page size requested (the upstream caps it at [`LINKS_PAGE_CAP`]).
const REQUESTED_PAGE_SIZE: u32 = 100;

/// Retired mirror domains and their live replacements.
const MIRROR_DOMAIN_REWRITES: &[(&str, &str)] = &[("send.cm/", "send.now/")];

/// Remember-me cookie used to open catalog sessions.
#[derive(Clone)]
pub struct CatalogCredentials {
    cookie_name: String,
    cookie_value: String,
}

impl CatalogCredentials {
    /// Creates credentials from a cookie name and value.
    #[must_use]
    pub fn new(cookie_name: impl Into<String>, cookie_value: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            cookie_value: cookie_value.into(),
        }
    }
}

impl fmt::Debug for CatalogCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogCredentials")
            .field("cookie_name", &self.cookie_name)
            .field("cookie_value", &"<redacted>")
            .finish()
    }
}

/// Applies the known mirror-domain rewrites to a resolved URL.
#[must_use]
pub fn rewrite_mirror_domain(url: &str) -> String {
    MIRROR_DOMAIN_REWRITES
        .iter()
        .fold(url.to_string(), |acc, (retired, live)| acc.replace(retired, live))
}

/// Client for the upstream catalog.
pub struct CatalogClient {
    options: HttpClientOptions,
    base_url: Url,
    credentials: Option<CatalogCredentials>,
    session: RwLock<Option<Arc<Session>>>,
    session_ttl: Duration,
}

impl CatalogClient {
    /// Creates a catalog client.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidUrl`] for an unparseable base URL and
    /// [`CatalogError::Client`] when the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        credentials: Option<CatalogCredentials>,
        options: HttpClientOptions,
    ) -> Result<Self, CatalogError> {
        let mut base = Url::parse(base_url).map_err(|e| CatalogError::invalid_url(base_url, e))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        // Fail at construction rather than at the first login.
        session_client(options)?;

        if credentials.is_none() {
            warn!("Catalog credentials not configured; catalog lookups will return nothing");
        }

        Ok(Self {
            options,
            base_url: base,
            credentials,
            session: RwLock::new(None),
            session_ttl: SESSION_TTL,
        })
    }

    /// Overrides the session validity window.
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Returns the catalog base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns true when credentials are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Searches catalog titles, optionally restricted to one media kind.
    #[instrument(skip(self), fields(kind = ?media_kind))]
    pub async fn search(
        &self,
        query: &str,
        media_kind: Option<MediaKind>,
        limit: usize,
    ) -> Vec<Title> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        match self.try_search(query, media_kind, limit).await {
            Ok(titles) => {
                info!(count = titles.len(), "Catalog search complete");
                titles
            }
            Err(error) => {
                warn!(error = %error, "Catalog search failed");
                Vec::new()
            }
        }
    }

    /// Fetches every link of a title for one season.
    #[instrument(skip(self))]
    pub async fn fetch_links(&self, title_id: u64, season: u32) -> Vec<Link> {
        match self.try_fetch_links(title_id, season).await {
            Ok(links) => {
                info!(count = links.len(), "Catalog links fetched");
                links
            }
            Err(error) => {
                warn!(error = %error, "Catalog link listing failed");
                Vec::new()
            }
        }
    }

    /// Resolves the direct-download URL of a link.
    ///
    /// Unlike [`CatalogClient::probe_link`] this does not require the link to
    /// be flagged active.
    #[instrument(skip(self))]
    pub async fn resolve_download_url(&self, link_id: u64) -> Option<String> {
        match self.request_download(link_id).await {
            Ok(Some(record)) => record.url().map(rewrite_mirror_domain),
            Ok(None) => {
                debug!("Catalog returned no download record");
                None
            }
            Err(error) => {
                warn!(error = %error, "Download URL resolution failed");
                None
            }
        }
    }

    /// Checks that a link is live and returns its direct URL as reported.
    ///
    /// Returns `None` for inactive, soft-deleted or unresolvable links.
    /// Mirror-domain rewriting is left to the verifier.
    pub async fn probe_link(&self, link_id: u64) -> Option<String> {
        match self.request_download(link_id).await {
            Ok(Some(record)) if record.is_live() => record.url().map(str::to_string),
            Ok(_) => {
                debug!(link_id, "Link inactive, deleted or unresolvable");
                None
            }
            Err(error) => {
                debug!(link_id, error = %error, "Link probe failed");
                None
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        media_kind: Option<MediaKind>,
        limit: usize,
    ) -> Result<Vec<Title>, CatalogError> {
        let session = self.session().await?;
        let mut url = self.endpoint(&format!("api/v1/search/{}", urlencoding::encode(query)))?;
        url.query_pairs_mut()
            .append_pair("loader", "searchPage")
            .append_pair("limit", &limit.to_string());

        let response: wire::SearchResponse = self
            .send_json(self.api_request(session.client.get(url), &session), "search")
            .await?;

        let titles = response
            .results
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<wire::RawTitle>(record) {
                Ok(raw) => raw.into_title(),
                Err(error) => {
                    debug!(error = %error, "Skipping malformed search record");
                    None
                }
            })
            .filter(|title| media_kind.is_none_or(|kind| title.kind == kind))
            .take(limit)
            .collect();
        Ok(titles)
    }

    async fn try_fetch_links(&self, title_id: u64, season: u32) -> Result<Vec<Link>, CatalogError> {
        let session = self.session().await?;
        let mut info = wire::RawTitleInfo::default();
        let mut links = Vec::new();

        for page in 1..=MAX_LINK_PAGES {
            let mut url = self.endpoint("api/v1/liens")?;
            url.query_pairs_mut()
                .append_pair("perPage", &REQUESTED_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string())
                .append_pair("title_id", &title_id.to_string())
                .append_pair("loader", "linksdl")
                .append_pair("season", &season.to_string())
                .append_pair("filters", "")
                .append_pair("paginate", "preferLengthAware");

            let response: wire::LinksResponse = self
                .send_json(self.api_request(session.client.get(url), &session), "fetch_links")
                .await?;
            if response.status.as_deref() != Some("success") {
                return Err(CatalogError::payload(
                    "fetch_links",
                    format!("listing status {:?}", response.status),
                ));
            }

            if info.name.is_none()
                && let Some(title) = response.title
                && let Ok(parsed) = serde_json::from_value::<wire::RawTitleInfo>(title)
            {
                info = parsed;
            }

            let records = response.pagination.map(|p| p.data).unwrap_or_default();
            let record_count = records.len();
            if record_count == 0 {
                debug!(page, "Empty listing page");
                break;
            }

            for record in records {
                match serde_json::from_value::<wire::RawLink>(record) {
                    Ok(raw) => links.push(raw.into_link(title_id, &info, &session.lookups)),
                    Err(error) => debug!(page, error = %error, "Skipping malformed link record"),
                }
            }

            if record_count < LINKS_PAGE_CAP {
                break;
            }
            if page == MAX_LINK_PAGES {
                warn!(title_id, pages = MAX_LINK_PAGES, "Link listing hit the page ceiling");
            }
        }

        Ok(links)
    }

    async fn request_download(&self, link_id: u64) -> Result<Option<wire::RawLien>, CatalogError> {
        let session = self.session().await?;
        let url = self.endpoint(&format!("api/v1/liens/{link_id}/download"))?;
        let request = self
            .api_request(session.client.post(url), &session)
            .json(&serde_json::json!({}));
        let response: wire::DownloadResponse = self.send_json(request, "download").await?;
        Ok(response.lien)
    }

    /// Returns a fresh session, authenticating when needed.
    ///
    /// Concurrent callers may both re-authenticate; the last one wins.
    async fn session(&self) -> Result<Arc<Session>, CatalogError> {
        {
            let guard = self.session.read().await;
            if let Some(session) = guard.as_ref()
                && session.is_fresh(self.session_ttl)
            {
                return Ok(Arc::clone(session));
            }
        }

        let session = Arc::new(self.authenticate().await?);
        *self.session.write().await = Some(Arc::clone(&session));
        Ok(session)
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn authenticate(&self) -> Result<Session, CatalogError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(CatalogError::MissingCredentials)?;

        // A fresh jar per login: cookies left by an earlier session must not
        // satisfy the session cookie check below.
        let jar = Arc::new(Jar::default());
        let client = session_client_with_jar(self.options, Arc::clone(&jar))?;
        jar.add_cookie_str(
            &format!(
                "{}={}; Path=/",
                credentials.cookie_name, credentials.cookie_value
            ),
            &self.base_url,
        );

        let response = client
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|e| CatalogError::network("authenticate", e))?;
        let status = response.status();

        let mut cookies: Vec<(String, String)> = response
            .cookies()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();
        if let Some(header) = jar.cookies(&self.base_url)
            && let Ok(header) = header.to_str()
        {
            cookies.extend(session::cookie_pairs(header));
        }

        if status != StatusCode::OK {
            return Err(CatalogError::AuthenticationRejected {
                status: status.as_u16(),
                reason: "landing page did not load".to_string(),
            });
        }
        if !session::has_session_cookie(&cookies) {
            return Err(CatalogError::AuthenticationRejected {
                status: status.as_u16(),
                reason: "no session cookie was set".to_string(),
            });
        }

        let xsrf_token = session::find_xsrf_token(&cookies);
        if xsrf_token.is_none() {
            warn!("Catalog session has no anti-forgery token");
        }

        let body = response.text().await.unwrap_or_default();
        let lookups = CatalogLookups::from_landing_page(&body);

        info!("Catalog session established");
        Ok(Session::new(client, xsrf_token, lookups))
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base_url
            .join(path)
            .map_err(|e| CatalogError::invalid_url(path, e))
    }

    fn api_request(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        let builder = builder
            .header(ACCEPT, "application/json")
            .header(REFERER, self.base_url.as_str())
            .header("X-Requested-With", "XMLHttpRequest");
        match session.xsrf_token.as_deref() {
            Some(token) => builder.header("X-XSRF-TOKEN", token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, CatalogError> {
        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::network(operation, e))?;
        let status = response.status();
        if !status.is_success() {
            // 401/419: session expired upstream before our window did.
            if matches!(status.as_u16(), 401 | 419) {
                *self.session.write().await = None;
            }
            return Err(CatalogError::HttpStatus {
                operation,
                status: status.as_u16(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::payload(operation, e.to_string()))
    }
}

fn session_client(options: HttpClientOptions) -> Result<Client, CatalogError> {
    session_client_with_jar(options, Arc::new(Jar::default()))
}

fn session_client_with_jar(
    options: HttpClientOptions,
    jar: Arc<Jar>,
) -> Result<Client, CatalogError> {
    Ok(build_http_client(
        "catalog",
        user_agent::catalog_user_agent(),
        options,
        Some(jar),
    )?)
}

#[async_trait]
impl LinkProbe for CatalogClient {
    async fn probe(&self, link_id: u64) -> Option<String> {
        self.probe_link(link_id).await
    }
}
