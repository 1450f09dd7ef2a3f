//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use linkarr_core::agent::DEFAULT_AGENT_URL;
use linkarr_core::catalog::DEFAULT_CATALOG_BASE_URL;
use linkarr_core::config::{
    DEFAULT_API_KEY, DEFAULT_DATA_DIR, DEFAULT_DOWNLOAD_DIR, DEFAULT_FAILED_RETENTION_HOURS,
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PUBLIC_URL, DEFAULT_RECONCILE_INTERVAL_SECS, Settings,
};
use linkarr_core::http_client::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS};
use linkarr_core::metadata::DEFAULT_TMDB_BASE_URL;

/// Serve a direct-download catalog as a Newznab indexer and SABnzbd client.
///
/// Linkarr searches the catalog, verifies its links and hands accepted
/// releases to a download agent, reporting progress back to the media
/// managers that requested them.
#[derive(Parser, Debug)]
#[command(name = "linkarr")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// API key shared by the indexer and download-client endpoints
    #[arg(long, env = "LINKARR_API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    pub api_key: String,

    /// Address to bind
    #[arg(long, env = "LINKARR_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on (1-65535)
    #[arg(short, long, env = "LINKARR_PORT", default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Externally reachable base URL used in NZB links
    #[arg(long, env = "LINKARR_PUBLIC_URL", default_value = DEFAULT_PUBLIC_URL)]
    pub public_url: String,

    /// Catalog base URL
    #[arg(long, env = "CATALOG_BASE_URL", default_value = DEFAULT_CATALOG_BASE_URL)]
    pub catalog_url: String,

    /// Name of the catalog remember-me cookie
    #[arg(long, env = "CATALOG_REMEMBER_COOKIE_NAME")]
    pub catalog_cookie_name: Option<String>,

    /// Value of the catalog remember-me cookie
    #[arg(long, env = "CATALOG_REMEMBER_COOKIE_VALUE", hide_env_values = true)]
    pub catalog_cookie_value: Option<String>,

    /// Download agent API URL
    #[arg(long, env = "AGENT_URL", default_value = DEFAULT_AGENT_URL)]
    pub agent_url: String,

    /// Folder completed downloads are written to
    #[arg(short, long, env = "DOWNLOAD_FOLDER", default_value = DEFAULT_DOWNLOAD_DIR)]
    pub download_dir: PathBuf,

    /// Folder holding the database
    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// TMDB API key for id-based searches
    #[arg(long, env = "TMDB_KEY", hide_env_values = true)]
    pub tmdb_key: Option<String>,

    /// TMDB API base URL
    #[arg(long, env = "TMDB_BASE_URL", default_value = DEFAULT_TMDB_BASE_URL, hide = true)]
    pub tmdb_url: String,

    /// Seconds between agent polls (1-3600)
    #[arg(long, env = "RECONCILE_INTERVAL", default_value_t = DEFAULT_RECONCILE_INTERVAL_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub reconcile_interval: u64,

    /// Hours a failed download stays in history
    #[arg(long, env = "FAILED_RETENTION_HOURS", default_value_t = DEFAULT_FAILED_RETENTION_HOURS)]
    pub failed_retention: u64,

    /// Catalog titles considered per search (1-50)
    #[arg(long, env = "TITLE_LIMIT", default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..=50))]
    pub title_limit: u16,

    /// Links verified per title (1-100)
    #[arg(long, env = "MAX_LINKS_PER_TITLE", default_value_t = 15, value_parser = clap::value_parser!(u16).range(1..=100))]
    pub max_links: u16,

    /// Concurrent link checks per batch (1-20)
    #[arg(long, env = "VERIFY_BATCH_SIZE", default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub verify_batch: u8,

    /// Connect timeout for outbound requests, in seconds (1-300)
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub connect_timeout: u64,

    /// Read timeout for outbound requests, in seconds (1-300)
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub read_timeout: u64,
}

impl Args {
    /// Converts parsed flags into service settings.
    pub fn into_settings(self) -> Settings {
        Settings {
            api_key: self.api_key,
            host: self.host,
            port: self.port,
            public_url: self.public_url,
            catalog_base_url: self.catalog_url,
            catalog_cookie_name: self.catalog_cookie_name,
            catalog_cookie_value: self.catalog_cookie_value,
            agent_url: self.agent_url,
            download_dir: self.download_dir,
            data_dir: self.data_dir,
            tmdb_api_key: self.tmdb_key.filter(|k| !k.trim().is_empty()),
            tmdb_base_url: self.tmdb_url,
            reconcile_interval_secs: self.reconcile_interval,
            failed_retention_hours: self.failed_retention,
            title_limit: usize::from(self.title_limit),
            max_links_per_title: usize::from(self.max_links),
            verify_batch_size: usize::from(self.verify_batch),
            connect_timeout_secs: self.connect_timeout,
            read_timeout_secs: self.read_timeout,
        }
    }
}
