use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};
use url::Url;

use super::{ExternalId, MetadataError};
use crate::http_client::{HttpClientOptions, build_http_client};
use crate::media::MediaKind;
use crate::user_agent;

/// Default TMDB API root.
pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org";

/// Localized titles are requested in the catalog's language.
const TMDB_LANGUAGE: &str = "fr-FR";

#[derive(Debug, Default, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<Value>,
    #[serde(default)]
    tv_results: Vec<Value>,
}

/// Resolves external ids to titles through the TMDB API.
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl TmdbClient {
    /// Creates a client. Without an API key every lookup returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] for an unparseable base URL or when the
    /// HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        options: HttpClientOptions,
    ) -> Result<Self, MetadataError> {
        let base_url =
            Url::parse(base_url).map_err(|e| MetadataError::InvalidUrl(format!("{base_url}: {e}")))?;
        let client = build_http_client("tmdb", user_agent::default_api_user_agent(), options, None)?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// True when an API key is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolves an external id to a title, preferring the original title.
    ///
    /// Failures are logged and yield `None`.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn resolve(&self, id: &ExternalId) -> Option<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("TMDB API key not configured; cannot resolve external id");
            return None;
        };
        match self.try_resolve(id, api_key).await {
            Ok(Some(title)) => {
                info!(title = %title, "External id resolved");
                Some(title)
            }
            Ok(None) => {
                warn!("External id not found on TMDB");
                None
            }
            Err(error) => {
                warn!(error = %error, "TMDB lookup failed");
                None
            }
        }
    }

    async fn try_resolve(&self, id: &ExternalId, api_key: &str) -> Result<Option<String>, MetadataError> {
        match id {
            ExternalId::Imdb(raw) => {
                let imdb = if raw.starts_with("tt") {
                    raw.clone()
                } else {
                    format!("tt{raw}")
                };
                let found = self.find(&imdb, "imdb_id", api_key).await?;
                Ok(found
                    .movie_results
                    .first()
                    .and_then(|movie| title_of(movie, MediaKind::Movie))
                    .or_else(|| found.tv_results.first().and_then(|show| title_of(show, MediaKind::Series))))
            }
            ExternalId::Tvdb(raw) => {
                let found = self.find(raw, "tvdb_id", api_key).await?;
                Ok(found
                    .tv_results
                    .first()
                    .and_then(|show| title_of(show, MediaKind::Series)))
            }
            ExternalId::Tmdb { id, kind } => {
                let namespace = if *kind == MediaKind::Movie { "movie" } else { "tv" };
                let url = self.endpoint(&format!("3/{namespace}/{id}"), api_key, &[])?;
                let body: Value = self.get_json(url).await?;
                Ok(title_of(&body, *kind))
            }
        }
    }

    async fn find(&self, id: &str, source: &str, api_key: &str) -> Result<FindResponse, MetadataError> {
        let url = self.endpoint(&format!("3/find/{id}"), api_key, &[("external_source", source)])?;
        self.get_json(url).await
    }

    fn endpoint(&self, path: &str, api_key: &str, extra: &[(&str, &str)]) -> Result<Url, MetadataError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| MetadataError::InvalidUrl(format!("{path}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api_key", api_key);
            pairs.append_pair("language", TMDB_LANGUAGE);
            for (key, value) in extra {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, MetadataError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::HttpStatus(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

/// Original title first, then the localized one.
fn title_of(entry: &Value, kind: MediaKind) -> Option<String> {
    let keys: [&str; 2] = if kind == MediaKind::Movie {
        ["original_title", "title"]
    } else {
        ["original_name", "name"]
    };
    keys.iter()
        .filter_map(|key| entry.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn client_for(server: &MockServer) -> TmdbClient {
        TmdbClient::new(&server.uri(), Some("key".to_string()), HttpClientOptions::default()).unwrap()
    }

    #[test]
    fn test_title_of_prefers_original() {
        let movie = json!({"original_title": "Le Film", "title": "The Movie"});
        assert_eq!(title_of(&movie, MediaKind::Movie).as_deref(), Some("Le Film"));
        let show = json!({"original_name": "", "name": "Show"});
        assert_eq!(title_of(&show, MediaKind::Series).as_deref(), Some("Show"));
    }

    #[tokio::test]
    async fn test_resolve_without_key_is_none() {
        let client = TmdbClient::new(DEFAULT_TMDB_BASE_URL, Some("  ".to_string()), HttpClientOptions::default())
            .unwrap();
        assert!(!client.is_configured());
        assert_eq!(client.resolve(&ExternalId::Imdb("tt1".to_string())).await, None);
    }

    #[tokio::test]
    async fn test_resolve_imdb_adds_prefix_and_reads_movie() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/3/find/tt0111161"))
            .and(query_param("external_source", "imdb_id"))
            .and(query_param("api_key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "movie_results": [{"original_title": "The Shawshank Redemption"}],
                "tv_results": []
            })))
            .mount(&server)
            .await;

        let title = client_for(&server)
            .resolve(&ExternalId::Imdb("0111161".to_string()))
            .await;
        assert_eq!(title.as_deref(), Some("The Shawshank Redemption"));
    }

    #[tokio::test]
    async fn test_resolve_tmdb_tv_namespace() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/3/tv/1399"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Game of Thrones"})))
            .mount(&server)
            .await;

        let id = ExternalId::Tmdb {
            id: "1399".to_string(),
            kind: MediaKind::Series,
        };
        assert_eq!(client_for(&server).resolve(&id).await.as_deref(), Some("Game of Thrones"));
    }

    #[tokio::test]
    async fn test_resolve_tvdb_miss_and_error_are_none() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/3/find/81189"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tv_results": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/3/find/500"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.resolve(&ExternalId::Tvdb("81189".to_string())).await, None);
        assert_eq!(client.resolve(&ExternalId::Tvdb("500".to_string())).await, None);
    }
}
