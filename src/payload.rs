//! Opaque payload tokens handed out with search results.
//!
//! A token is URL-safe base64 over a small JSON object carrying the resolved
//! direct URL, both title renderings and the link id. The download-client
//! side decodes it on accept, so accepting never needs another catalog
//! round trip unless the URL is missing.
//!
//! Tokens travel either as the `id` query parameter of an `/nzb` URL or
//! inside an NZB document's `<meta type="link_data">` element.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use quick_xml::escape::escape;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[allow(clippy::expect_used)]
static LINK_DATA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+type="link_data"\s*>([^<]+)</meta>"#).expect("link_data regex is valid")
});

/// Payload token decoding failures.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("payload token is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no payload token found in {0}")]
    Missing(&'static str),
}

/// Everything needed to accept a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPayload {
    /// Direct-download URL, when verification resolved one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Display title (with host tag).
    #[serde(default)]
    pub title: String,
    /// Clean title (no host tag).
    #[serde(default)]
    pub clean_title: String,
    /// Catalog link id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<u64>,
}

impl LinkPayload {
    /// Encodes the payload as a URL-safe token.
    #[must_use]
    pub fn encode(&self) -> String {
        // Serializing a struct of strings and integers cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE.encode(json)
    }

    /// Decodes a token, with or without base64 padding.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when the token is not base64 JSON.
    pub fn decode(token: &str) -> Result<Self, PayloadError> {
        let token = token.trim();
        let bytes = URL_SAFE
            .decode(token)
            .or_else(|_| URL_SAFE_NO_PAD.decode(token.trim_end_matches('=')))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Title to name the download after: clean title, else display title,
    /// else a placeholder built from the link id.
    #[must_use]
    pub fn download_title(&self) -> String {
        [self.clean_title.trim(), self.title.trim()]
            .into_iter()
            .find(|t| !t.is_empty())
            .map_or_else(
                || format!("download-{}", self.link_id.unwrap_or_default()),
                str::to_string,
            )
    }
}

/// Builds the `/nzb` URL for a token.
#[must_use]
pub fn nzb_url(public_url: &str, token: &str, api_key: &str) -> String {
    let base = public_url.trim_end_matches('/');
    match Url::parse(&format!("{base}/nzb")) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("id", token)
                .append_pair("apikey", api_key);
            url.into()
        }
        Err(_) => format!("{base}/nzb?id={token}&apikey={}", urlencoding::encode(api_key)),
    }
}

/// Pulls a token out of an `/nzb?id=...` URL.
#[must_use]
pub fn token_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Pulls a token out of an NZB document.
#[must_use]
pub fn token_from_nzb(document: &str) -> Option<&str> {
    LINK_DATA_PATTERN
        .captures(document)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim())
        .filter(|token| !token.is_empty())
}

/// Renders the NZB document that carries a token.
#[must_use]
pub fn nzb_document(token: &str) -> String {
    let token = escape(token);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head>
    <meta type="link_data">{token}</meta>
  </head>
  <file poster="linkarr" date="0" subject="linkarr download">
    <groups><group>linkarr.ddl</group></groups>
    <segments>
      <segment bytes="1" number="1">{token}</segment>
    </segments>
  </file>
</nzb>
"#
    )
}
