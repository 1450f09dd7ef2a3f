//! Shared HTTP client construction policy.
//!
//! Every outbound client (catalog, agent, metadata) is built here so they
//! stay consistent on timeouts, compression, proxy compatibility and cookie
//! support. Timeouts come from [`HttpClientOptions`], supplied by the
//! composition root.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::{ClientBuilder, Proxy};
use thiserror::Error;
use tracing::warn;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Timeout policy applied to outbound clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpClientOptions {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

/// Client construction failure.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The builder rejected the configuration.
    #[error("HTTP client construction failed for {client}: {message}")]
    Build {
        /// Which client was being built.
        client: String,
        /// Builder error text.
        message: String,
    },

    /// System proxy lookup panicked twice.
    #[error("HTTP client construction panicked for {client} while initializing networking")]
    Panicked {
        /// Which client was being built.
        client: String,
    },
}

/// Builds an HTTP client using the shared policy.
///
/// `client_name` is used only for errors and logging.
///
/// # Errors
///
/// Returns [`HttpClientError`] when client construction fails.
pub fn build_http_client(
    client_name: &str,
    user_agent: impl Into<String>,
    options: HttpClientOptions,
    cookie_jar: Option<Arc<Jar>>,
) -> Result<Client, HttpClientError> {
    let user_agent = user_agent.into();

    match try_build_client(&user_agent, options, cookie_jar.clone(), false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; retry with env proxies only.
            warn!(
                client = client_name,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(&user_agent, options, cookie_jar, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(HttpClientError::Panicked {
                    client: client_name.to_string(),
                }),
                Err(BuildClientFailure::Build(error)) => Err(HttpClientError::Build {
                    client: client_name.to_string(),
                    message: error.to_string(),
                }),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(HttpClientError::Build {
            client: client_name.to_string(),
            message: error.to_string(),
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    options: HttpClientOptions,
    cookie_jar: Option<Arc<Jar>>,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(user_agent, options, cookie_jar);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(
    user_agent: String,
    options: HttpClientOptions,
    cookie_jar: Option<Arc<Jar>>,
) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(options.connect_timeout_secs))
        .timeout(Duration::from_secs(options.read_timeout_secs))
        .user_agent(user_agent)
        .gzip(true);

    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }

    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
