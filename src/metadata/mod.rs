//! External-id to title resolution.
//!
//! Clients often search by IMDB, TMDB or TVDB id while the catalog only
//! understands free text. [`TmdbClient`] turns such ids into a title.

mod tmdb;

use std::fmt;

use thiserror::Error;

pub use tmdb::{DEFAULT_TMDB_BASE_URL, TmdbClient};

use crate::http_client::HttpClientError;
use crate::media::MediaKind;

/// An identifier from an external metadata database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalId {
    /// IMDB id, with or without the `tt` prefix.
    Imdb(String),
    /// TMDB id; the kind selects the movie or TV namespace.
    Tmdb { id: String, kind: MediaKind },
    /// TVDB series id.
    Tvdb(String),
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imdb(id) => write!(f, "imdb:{id}"),
            Self::Tmdb { id, kind } => write!(f, "tmdb:{kind}:{id}"),
            Self::Tvdb(id) => write!(f, "tvdb:{id}"),
        }
    }
}

/// Metadata lookup failures. Callers of [`TmdbClient::resolve`] only see
/// them in logs.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("metadata service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("invalid metadata URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Client(#[from] HttpClientError),
}
