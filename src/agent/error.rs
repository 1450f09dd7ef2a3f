//! Agent adapter error types.

use thiserror::Error;

use crate::http_client::HttpClientError;

/// Errors raised while talking to the download agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Transport-level failure (connection refused, timeout, ...).
    #[error("agent request failed during {operation}: {source}")]
    Network {
        /// Operation being performed.
        operation: &'static str,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("agent returned HTTP {status} during {operation}")]
    HttpStatus {
        /// Operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// Response body could not be decoded.
    #[error("agent returned a malformed payload during {operation}: {message}")]
    Payload {
        /// Operation being performed.
        operation: &'static str,
        /// What went wrong.
        message: String,
    },

    /// Submission succeeded at the transport level but returned no package id.
    #[error("agent accepted the links but returned no package identifier")]
    NoIdentifier,

    /// A request URL could not be built.
    #[error("invalid agent URL '{url}': {reason}")]
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

impl AgentError {
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

    /// True when the failure happened before the agent answered.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}
