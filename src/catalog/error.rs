//! Catalog client error types.
//!
//! These never reach callers of [`super::CatalogClient`]'s public
//! operations, which log and degrade to empty results. They exist so the
//! internal request helpers can use `?`.

use thiserror::Error;

use crate::http_client::HttpClientError;

/// Errors raised inside the catalog client.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No remember-me cookie is configured.
    #[error("catalog credentials are not configured")]
    MissingCredentials,

    /// The landing page did not establish a session.
    #[error("catalog authentication rejected (HTTP {status}): {reason}")]
    AuthenticationRejected {
        /// HTTP status of the landing page response.
        status: u16,
        /// What was missing.
        reason: String,
    },

    /// Transport-level failure.
    #[error("catalog request failed during {operation}: {source}")]
    Network {
        /// Operation being performed.
        operation: &'static str,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("catalog returned HTTP {status} during {operation}")]
    HttpStatus {
        /// Operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// Response body could not be decoded or reported an API failure.
    #[error("catalog returned a malformed payload during {operation}: {message}")]
    Payload {
        /// Operation being performed.
        operation: &'static str,
        /// What went wrong.
        message: String,
    },

    /// A request URL could not be built.
    #[error("invalid catalog URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL text.
        url: String,
        /// Parser error.
        reason: String,
    },

    /// HTTP client construction failed.
    #[error(transparent)]
    Client(#[from] HttpClientError),
}

impl CatalogError {
    /// Creates a `Network` error.
    #[must_use]
    pub fn network(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Network { operation, source }
    }

    /// Creates a `Payload` error.
    #[must_use]
    pub fn payload(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Payload {
            operation,
            message: message.into(),
        }
    }

    /// Creates an `InvalidUrl` error.
    #[must_use]
    pub fn invalid_url(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for failures caused by missing or rejected credentials.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials | Self::AuthenticationRejected { .. }
        )
    }
}
