//! Agent adapter over the agent's local HTTP API.
//!
//! Every endpoint is a `POST` with a JSON array of positional arguments and
//! answers `{"data": ...}`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{Agent, AgentError, PackageFile, PackageStatus, SubmitRequest};
use crate::http_client::{HttpClientOptions, build_http_client};
use crate::user_agent;

/// Default address of the agent's local API.
pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:3128";

const ADD_LINKS_PATH: &str = "linkgrabberv2/addLinks";
const QUERY_PACKAGES_PATH: &str = "downloadsV2/queryPackages";
const QUERY_LINKS_PATH: &str = "downloadsV2/queryLinks";
const REMOVE_LINKS_PATH: &str = "downloadsV2/removeLinks";

/// Transport failures during submission are retried this many times.
const SUBMIT_RETRIES: u32 = 1;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPackage {
    uuid: Value,
    name: Option<String>,
    status: Option<String>,
    bytes_loaded: Option<u64>,
    bytes_total: Option<u64>,
    speed: Option<u64>,
    eta: Option<i64>,
    finished: Option<bool>,
    running: Option<bool>,
    save_to: Option<String>,
}

impl RawPackage {
    fn into_status(self) -> Option<PackageStatus> {
        Some(PackageStatus {
            id: id_from_value(&self.uuid)?,
            name: self.name.unwrap_or_default(),
            status: self.status.filter(|s| !s.trim().is_empty()),
            bytes_loaded: self.bytes_loaded.unwrap_or(0),
            bytes_total: self.bytes_total.unwrap_or(0),
            speed: self.speed.unwrap_or(0),
            eta: self.eta.and_then(|eta| u64::try_from(eta).ok()),
            finished: self.finished.unwrap_or(false),
            running: self.running.unwrap_or(false),
            save_to: self.save_to,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFile {
    name: Option<String>,
    bytes_total: Option<u64>,
    finished: Option<bool>,
}

/// [`Agent`] implementation backed by the agent's local HTTP API.
pub struct HttpAgentClient {
    client: Client,
    base_url: Url,
}

impl HttpAgentClient {
    /// Creates a client for the agent API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidUrl`] for an unparseable URL and
    /// [`AgentError::Client`] when the HTTP client cannot be built.
    pub fn new(base_url: &str, options: HttpClientOptions) -> Result<Self, AgentError> {
        let mut base = Url::parse(base_url).map_err(|e| AgentError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = build_http_client(
            "agent",
            user_agent::default_api_user_agent(),
            options,
            None,
        )?;
        Ok(Self {
            client,
            base_url: base,
        })
    }

    /// Returns the agent API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &Value,
        operation: &'static str,
    ) -> Result<T, AgentError> {
        let url = self.base_url.join(path).map_err(|e| AgentError::InvalidUrl {
            url: path.to_string(),
            reason: e.to_string(),
        })?;
        let response = self
            .client
            .post(url)
            .json(params)
            .send()
            .await
            .map_err(|e| AgentError::network(operation, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::HttpStatus {
                operation,
                status: status.as_u16(),
            });
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| AgentError::payload(operation, e.to_string()))?;
        Ok(envelope.data)
    }

    async fn submit_once(&self, request: &SubmitRequest) -> Result<String, AgentError> {
        let params = json!([{
            "autostart": true,
            "links": request.links.join("\n"),
            "packageName": request.package_name,
            "destinationFolder": request.destination.to_string_lossy(),
            "overwritePackagizerRules": true,
        }]);
        let data: Value = self.call(ADD_LINKS_PATH, &params, "submit").await?;
        id_from_value(&data).ok_or(AgentError::NoIdentifier)
    }
}

#[async_trait]
impl Agent for HttpAgentClient {
    #[instrument(skip(self, request), fields(package = %request.package_name, links = request.links.len()))]
    async fn submit(&self, request: &SubmitRequest) -> Result<String, AgentError> {
        let mut attempt = 0;
        loop {
            match self.submit_once(request).await {
                Ok(id) => {
                    info!(package_id = %id, "Package submitted to agent");
                    return Ok(id);
                }
                Err(error) if error.is_transport() && attempt < SUBMIT_RETRIES => {
                    attempt += 1;
                    warn!(error = %error, attempt, "Agent submission failed; retrying");
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn packages(&self) -> Result<Vec<PackageStatus>, AgentError> {
        let params = json!([{
            "bytesLoaded": true,
            "bytesTotal": true,
            "eta": true,
            "finished": true,
            "running": true,
            "saveTo": true,
            "speed": true,
            "status": true,
        }]);
        let raw: Vec<RawPackage> = self.call(QUERY_PACKAGES_PATH, &params, "packages").await?;
        let packages: Vec<PackageStatus> =
            raw.into_iter().filter_map(RawPackage::into_status).collect();
        debug!(count = packages.len(), "Agent packages listed");
        Ok(packages)
    }

    async fn package_files(&self, package_id: &str) -> Result<Vec<PackageFile>, AgentError> {
        let params = json!([{
            "packageUUIDs": [id_param(package_id)],
            "bytesTotal": true,
            "finished": true,
        }]);
        let raw: Vec<RawFile> = self.call(QUERY_LINKS_PATH, &params, "package_files").await?;
        Ok(raw
            .into_iter()
            .map(|file| PackageFile {
                name: file.name.unwrap_or_default(),
                bytes_total: file.bytes_total.unwrap_or(0),
                finished: file.finished.unwrap_or(false),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn remove_package(&self, package_id: &str) -> Result<(), AgentError> {
        let params = json!([[], [id_param(package_id)]]);
        let _: Value = self.call(REMOVE_LINKS_PATH, &params, "remove_package").await?;
        info!("Package removed from agent");
        Ok(())
    }
}

/// Package ids are numeric on the agent side; keep them numeric on the wire.
fn id_param(package_id: &str) -> Value {
    package_id
        .parse::<i64>()
        .map_or_else(|_| json!(package_id), |id| json!(id))
}

/// Extracts a package id from a bare id or an object carrying `id`.
fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map.get("id").and_then(id_from_value),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn client_for(server: &MockServer) -> HttpAgentClient {
        HttpAgentClient::new(&server.uri(), HttpClientOptions::default()).unwrap()
    }

    fn request() -> SubmitRequest {
        SubmitRequest {
            links: vec!["https://1fichier.com/?a".to_string()],
            package_name: "[RADARR] Test Movie (2024) Bluray-2160p".to_string(),
            destination: PathBuf::from("/output/radarr/Test Movie (2024) Bluray-2160p"),
        }
    }

    // ==================== Wire Helper Tests ====================

    #[test]
    fn test_id_from_value_shapes() {
        assert_eq!(id_from_value(&json!(1_700_000_000_123_i64)).as_deref(), Some("1700000000123"));
        assert_eq!(id_from_value(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(id_from_value(&json!(" abc ")).as_deref(), Some("abc"));
        assert_eq!(id_from_value(&json!(null)), None);
        assert_eq!(id_from_value(&json!("")), None);
    }

    #[test]
    fn test_id_param_keeps_numeric_ids_numeric() {
        assert_eq!(id_param("42"), json!(42));
        assert_eq!(id_param("pkg-a"), json!("pkg-a"));
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let result = HttpAgentClient::new("not a url", HttpClientOptions::default());
        assert!(matches!(result, Err(AgentError::InvalidUrl { .. })));
    }

    // ==================== HTTP Tests ====================

    #[tokio::test]
    async fn test_submit_returns_package_id() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/linkgrabberv2/addLinks"))
            .and(body_partial_json(json!([{
                "packageName": "[RADARR] Test Movie (2024) Bluray-2160p",
                "autostart": true
            }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 314}})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server).submit(&request()).await.unwrap();
        assert_eq!(id, "314");
    }

    #[tokio::test]
    async fn test_submit_without_identifier_is_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/linkgrabberv2/addLinks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
            .mount(&server)
            .await;

        let result = client_for(&server).submit(&request()).await;
        assert!(matches!(result, Err(AgentError::NoIdentifier)));
    }

    #[tokio::test]
    async fn test_submit_blank_identifier_is_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/linkgrabberv2/addLinks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": " "}})))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).submit(&request()).await;
        assert!(matches!(result, Err(AgentError::NoIdentifier)));
    }

    #[tokio::test]
    async fn test_submit_http_error_is_not_retried() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/linkgrabberv2/addLinks"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).submit(&request()).await;
        assert!(matches!(result, Err(AgentError::HttpStatus { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_submit_unreachable_agent_is_transport_error() {
        let client = HttpAgentClient::new("http://127.0.0.1:9", HttpClientOptions::default()).unwrap();
        let error = client.submit(&request()).await.unwrap_err();
        assert!(error.is_transport());
    }

    #[tokio::test]
    async fn test_packages_parses_progress_fields() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/downloadsV2/queryPackages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
                {
                    "uuid": 1001,
                    "name": "[RADARR] Test Movie (2024) Bluray-2160p",
                    "bytesLoaded": 500,
                    "bytesTotal": 1000,
                    "speed": 250,
                    "eta": 2,
                    "finished": false,
                    "running": true,
                    "saveTo": "/output/radarr/Test Movie (2024) Bluray-2160p"
                },
                {"name": "no id"}
            ]})))
            .mount(&server)
            .await;

        let packages = client_for(&server).packages().await.unwrap();
        assert_eq!(packages.len(), 1);
        let package = &packages[0];
        assert_eq!(package.id, "1001");
        assert_eq!(package.bytes_loaded, 500);
        assert_eq!(package.eta, Some(2));
        assert!(package.running);
        assert!(!package.finished);
        assert_eq!(package.status, None);
    }

    #[tokio::test]
    async fn test_package_files_and_remove() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/downloadsV2/queryLinks"))
            .and(body_partial_json(json!([{"packageUUIDs": [1001]}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
                {"name": "movie.mkv", "bytesTotal": 1000, "finished": true}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/downloadsV2/removeLinks"))
            .and(body_partial_json(json!([[], [1001]])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let files = client.package_files("1001").await.unwrap();
        assert_eq!(files[0].name, "movie.mkv");
        assert!(files[0].finished);
        client.remove_package("1001").await.unwrap();
    }
}
