//! Shared User-Agent strings for outbound HTTP clients.
//!
//! The catalog rejects non-browser agents, so catalog traffic uses a browser
//! string. Metadata and agent traffic identifies the tool.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/linkarr";

/// Browser User-Agent for catalog requests.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default User-Agent for metadata and agent requests (identifies the tool).
#[must_use]
pub(crate) fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("linkarr/{version} (+{PROJECT_UA_URL})")
}

/// User-Agent for catalog requests.
#[must_use]
pub(crate) fn catalog_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}
