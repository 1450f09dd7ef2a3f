//! Download agent adapter.
//!
//! # Overview
//!
//! The agent is the external program that actually transfers files. This
//! module defines the [`Agent`] capability the download manager depends on,
//! plus the package lookup shared by every caller:
//!
//! - lookup by the agent-assigned package id first
//! - otherwise an exact match on the submitted package name, after applying
//!   the same character substitutions the agent applies ([`normalize_package_name`])
//!
//! [`HttpAgentClient`] implements the capability against the agent's local
//! HTTP API.

mod error;
mod http;
mod names;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

pub use error::AgentError;
pub use http::{DEFAULT_AGENT_URL, HttpAgentClient};
pub use names::normalize_package_name;

/// Links handed to the agent as one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Direct-download URLs.
    pub links: Vec<String>,
    /// Package name, already passed through [`normalize_package_name`].
    pub package_name: String,
    /// Folder the agent should write into.
    pub destination: PathBuf,
}

/// Agent-side state of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageStatus {
    /// Agent-assigned package id.
    pub id: String,
    /// Package name as stored by the agent.
    pub name: String,
    /// Free-form status text ("Extracting", "Paused", ...).
    pub status: Option<String>,
    pub bytes_loaded: u64,
    pub bytes_total: u64,
    /// Bytes per second.
    pub speed: u64,
    /// Seconds remaining, when known.
    pub eta: Option<u64>,
    pub finished: bool,
    pub running: bool,
    /// Folder the agent writes into.
    pub save_to: Option<String>,
}

/// A file inside an agent package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageFile {
    pub name: String,
    pub bytes_total: u64,
    pub finished: bool,
}

/// Which key resolved a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageMatch {
    /// The stored package id matched.
    ById,
    /// The id was absent or stale; the normalized name matched.
    ByName,
}

/// Capability to hand links to a download agent and observe its packages.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Submits links as one package and returns the agent's package id.
    async fn submit(&self, request: &SubmitRequest) -> Result<String, AgentError>;

    /// Lists every package the agent knows about.
    async fn packages(&self) -> Result<Vec<PackageStatus>, AgentError>;

    /// Lists the files of one package.
    async fn package_files(&self, package_id: &str) -> Result<Vec<PackageFile>, AgentError>;

    /// Removes a package (and its links) from the agent.
    async fn remove_package(&self, package_id: &str) -> Result<(), AgentError>;

    /// Looks up one package by id, falling back to its name.
    async fn package_status(
        &self,
        package_id: Option<&str>,
        package_name: Option<&str>,
    ) -> Result<Option<(PackageStatus, PackageMatch)>, AgentError> {
        let packages = self.packages().await?;
        Ok(find_package(&packages, package_id, package_name)
            .map(|(package, matched)| (package.clone(), matched)))
    }
}

/// Finds a package by id, then by exact normalized name.
#[must_use]
pub fn find_package<'a>(
    packages: &'a [PackageStatus],
    package_id: Option<&str>,
    package_name: Option<&str>,
) -> Option<(&'a PackageStatus, PackageMatch)> {
    if let Some(id) = package_id.filter(|id| !id.is_empty())
        && let Some(package) = packages.iter().find(|p| p.id == id)
    {
        return Some((package, PackageMatch::ById));
    }

    let name = normalize_package_name(package_name.filter(|name| !name.is_empty())?);
    packages
        .iter()
        .find(|p| p.name == name)
        .map(|package| (package, PackageMatch::ByName))
}
