//! Authenticated catalog session state.
//!
//! A session is the anti-forgery token plus the id-to-name lookup tables
//! scraped from the landing page, together with the HTTP client whose
//! cookie jar holds that login's cookies. Every login starts from an empty
//! jar.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::wire::value_as_u64;

/// How long an authenticated session is reused before re-authenticating.
pub const SESSION_TTL: Duration = Duration::from_secs(3600);

/// Suffix of the upstream session cookie name.
pub(super) const SESSION_COOKIE_SUFFIX: &str = "_session";

#[allow(clippy::expect_used)]
static BOOTSTRAP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\.bootstrapData\s*=\s*(\{.*?\});\s*</script>")
        .expect("bootstrap regex is valid")
});

/// Quality and host names keyed by upstream id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogLookups {
    qualities: HashMap<u64, String>,
    hosts: HashMap<u64, String>,
}

impl CatalogLookups {
    /// Builds lookups from explicit id/name pairs.
    pub fn from_pairs<'a>(
        qualities: impl IntoIterator<Item = (u64, &'a str)>,
        hosts: impl IntoIterator<Item = (u64, &'a str)>,
    ) -> Self {
        Self {
            qualities: qualities
                .into_iter()
                .map(|(id, name)| (id, name.to_string()))
                .collect(),
            hosts: hosts
                .into_iter()
                .map(|(id, name)| (id, name.to_string()))
                .collect(),
        }
    }

    /// Quality name for an id.
    #[must_use]
    pub fn quality(&self, id: u64) -> Option<String> {
        self.qualities.get(&id).cloned()
    }

    /// Host name for an id.
    #[must_use]
    pub fn host(&self, id: u64) -> Option<String> {
        self.hosts.get(&id).cloned()
    }

    /// Extracts lookups from the `window.bootstrapData` blob of a landing page.
    ///
    /// Returns empty lookups when the blob is missing or malformed.
    #[must_use]
    pub fn from_landing_page(html: &str) -> Self {
        let Some(blob) = BOOTSTRAP_PATTERN
            .captures(html)
            .and_then(|captures| captures.get(1))
        else {
            return Self::default();
        };

        let data: Value = match serde_json::from_str(blob.as_str()) {
            Ok(data) => data,
            Err(error) => {
                warn!(error = %error, "Landing page bootstrap data is not valid JSON");
                return Self::default();
            }
        };

        let lookups = Self {
            qualities: id_name_pairs(data.get("qualities")),
            hosts: id_name_pairs(data.get("hosts")),
        };
        debug!(
            qualities = lookups.qualities.len(),
            hosts = lookups.hosts.len(),
            "Catalog lookups extracted"
        );
        lookups
    }
}

/// Collects `{id, name}` entries from a JSON array or an object of entries.
fn id_name_pairs(value: Option<&Value>) -> HashMap<u64, String> {
    let entries: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(value_as_u64)?;
            let name = entry
                .get("name")
                .or_else(|| entry.get("qual"))
                .and_then(Value::as_str)?;
            Some((id, name.to_string()))
        })
        .collect()
}

/// An authenticated catalog session.
#[derive(Debug, Clone)]
pub(super) struct Session {
    pub client: Client,
    pub xsrf_token: Option<String>,
    pub lookups: CatalogLookups,
    established_at: Instant,
}

impl Session {
    pub fn new(client: Client, xsrf_token: Option<String>, lookups: CatalogLookups) -> Self {
        Self {
            client,
            xsrf_token,
            lookups,
            established_at: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.established_at.elapsed() < ttl
    }
}

/// Splits a `Cookie` header value into name/value pairs.
pub(super) fn cookie_pairs(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Finds the anti-forgery token among cookies, URL-decoded.
pub(super) fn find_xsrf_token(cookies: &[(String, String)]) -> Option<String> {
    cookies
        .iter()
        .find(|(name, _)| name.to_ascii_lowercase().contains("xsrf"))
        .map(|(_, value)| {
            urlencoding::decode(value).map_or_else(|_| value.clone(), |decoded| decoded.into_owned())
        })
}

/// True when a session cookie is present.
pub(super) fn has_session_cookie(cookies: &[(String, String)]) -> bool {
    cookies
        .iter()
        .any(|(name, _)| name.ends_with(SESSION_COOKIE_SUFFIX))
}
