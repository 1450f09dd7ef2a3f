//! Linkarr Core Library
//!
//! Bridges a direct-download (DDL) link catalog to clients that speak the
//! Newznab indexer and SABnzbd download-client protocols. Searches return
//! verified catalog links dressed up as releases; accepted releases are
//! handed to a download agent and tracked until they are imported.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - Authenticated catalog client (titles, links, URLs)
//! - [`verify`] - Link ranking and batched liveness probes
//! - [`quality`] - Quality/language normalization, release titles, sizes
//! - [`search`] - Search orchestration producing indexed releases
//! - [`payload`] - Opaque link tokens and the NZB wrapper around them
//! - [`agent`] - Download agent client and package-name matching
//! - [`downloads`] - Download lifecycle, reconciliation and cleanup
//! - [`metadata`] - External id to title resolution (TMDB)
//! - [`api`] - Newznab and SABnzbd HTTP facades
//! - [`db`] - Database connection and schema management
//! - [`config`] - Runtime settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod downloads;
pub mod http_client;
pub mod media;
pub mod metadata;
pub mod payload;
pub mod quality;
pub mod search;
pub mod verify;

#[cfg(test)]
pub mod test_support;

pub(crate) mod user_agent;

// Re-export commonly used types
pub use agent::{Agent, AgentError, HttpAgentClient};
pub use api::{AppState, router, serve};
pub use catalog::{CatalogClient, CatalogCredentials, CatalogError};
pub use config::Settings;
pub use db::Database;
pub use downloads::{
    DeleteScope, Download, DownloadError, DownloadManager, DownloadRepository, DownloadStatus,
    NewDownload,
};
pub use media::{Link, MediaKind, Title};
pub use metadata::{ExternalId, TmdbClient};
pub use payload::LinkPayload;
pub use search::{IndexedRelease, SearchLimits, SearchRequest, SearchService};
pub use verify::{LinkProbe, LinkVerifier};
