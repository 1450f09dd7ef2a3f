//! Runtime settings.
//!
//! The binary builds [`Settings`] from command-line flags and environment
//! variables; the library only consumes the resulting value.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use url::Url;

use crate::agent::DEFAULT_AGENT_URL;
use crate::catalog::{CatalogCredentials, DEFAULT_CATALOG_BASE_URL};
use crate::http_client::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpClientOptions};
use crate::metadata::DEFAULT_TMDB_BASE_URL;
use crate::search::SearchLimits;

/// Database file created inside the data directory.
pub const DATABASE_FILE_NAME: &str = "linkarr.db";

pub const DEFAULT_API_KEY: &str = "linkarr";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9117;
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:9117";
pub const DEFAULT_DOWNLOAD_DIR: &str = "/output";
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_FAILED_RETENTION_HOURS: u64 = 24;

const MAX_TIMEOUT_SECS: u64 = 300;

/// Fully resolved service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Shared secret for both facades.
    pub api_key: String,
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used in payload links.
    pub public_url: String,
    pub catalog_base_url: String,
    pub catalog_cookie_name: Option<String>,
    pub catalog_cookie_value: Option<String>,
    pub agent_url: String,
    pub download_dir: PathBuf,
    pub data_dir: PathBuf,
    pub tmdb_api_key: Option<String>,
    pub tmdb_base_url: String,
    pub reconcile_interval_secs: u64,
    pub failed_retention_hours: u64,
    pub title_limit: usize,
    pub max_links_per_title: usize,
    pub verify_batch_size: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let limits = SearchLimits::default();
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            catalog_cookie_name: None,
            catalog_cookie_value: None,
            agent_url: DEFAULT_AGENT_URL.to_string(),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            tmdb_api_key: None,
            tmdb_base_url: DEFAULT_TMDB_BASE_URL.to_string(),
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            failed_retention_hours: DEFAULT_FAILED_RETENTION_HOURS,
            title_limit: limits.title_limit,
            max_links_per_title: limits.max_links_per_title,
            verify_batch_size: limits.verify_batch_size,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Rejects settings the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("API key must not be empty");
        }
        if self.port == 0 {
            bail!("Port must be between 1 and 65535");
        }
        if self.reconcile_interval_secs == 0 {
            bail!("Reconcile interval must be at least 1 second");
        }
        if self.title_limit == 0 {
            bail!("Title limit must be at least 1");
        }
        if self.verify_batch_size == 0 {
            bail!("Verification batch size must be at least 1");
        }
        for (name, secs) in [
            ("Connect timeout", self.connect_timeout_secs),
            ("Read timeout", self.read_timeout_secs),
        ] {
            if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
                bail!("{name} must be between 1 and {MAX_TIMEOUT_SECS} seconds (got {secs})");
            }
        }
        for (name, raw) in [
            ("Public URL", &self.public_url),
            ("Catalog base URL", &self.catalog_base_url),
            ("Agent URL", &self.agent_url),
            ("TMDB base URL", &self.tmdb_base_url),
        ] {
            if let Err(error) = Url::parse(raw) {
                bail!("{name} '{raw}' is not a valid URL: {error}");
            }
        }
        Ok(())
    }

    /// Catalog credentials, when both cookie parts are configured.
    #[must_use]
    pub fn catalog_credentials(&self) -> Option<CatalogCredentials> {
        let name = self.catalog_cookie_name.as_deref().map(str::trim)?;
        let value = self.catalog_cookie_value.as_deref().map(str::trim)?;
        if name.is_empty() || value.is_empty() {
            return None;
        }
        Some(CatalogCredentials::new(name, value))
    }

    #[must_use]
    pub fn http_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            connect_timeout_secs: self.connect_timeout_secs,
            read_timeout_secs: self.read_timeout_secs,
        }
    }

    #[must_use]
    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            title_limit: self.title_limit,
            max_links_per_title: self.max_links_per_title,
            verify_batch_size: self.verify_batch_size,
        }
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    #[must_use]
    pub fn failed_retention(&self) -> Duration {
        Duration::from_secs(self.failed_retention_hours.saturating_mul(3600))
    }

    /// Address the HTTP facades bind to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
