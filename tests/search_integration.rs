//! Integration tests for catalog search through the indexer facade.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use linkarr_core::agent::{PackageFile, PackageStatus, SubmitRequest};
use linkarr_core::{
    Agent, AgentError, AppState, CatalogClient, CatalogCredentials, Database, DownloadManager,
    DownloadRepository, LinkPayload, LinkVerifier, MediaKind, SearchLimits, SearchRequest,
    SearchService, Settings, TmdbClient, router,
};
mod support;
use support::socket_guard::start_mock_server_or_skip;

/// Agent that accepts nothing; search never reaches it.
struct IdleAgent;

#[async_trait]
impl Agent for IdleAgent {
    async fn submit(&self, _request: &SubmitRequest) -> Result<String, AgentError> {
        Ok("1".to_string())
    }

    async fn packages(&self) -> Result<Vec<PackageStatus>, AgentError> {
        Ok(Vec::new())
    }

    async fn package_files(&self, _id: &str) -> Result<Vec<PackageFile>, AgentError> {
        Ok(Vec::new())
    }

    async fn remove_package(&self, _id: &str) -> Result<(), AgentError> {
        Ok(())
    }
}

async fn mount_movie_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "catalog_session=abc; Path=/")
                .append_header("set-cookie", "XSRF-TOKEN=tok; Path=/"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v1/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": 3, "name": "Test Movie", "type": "movie", "year": 2024, "have_link": 1}
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/liens"))
        .and(query_param("title_id", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "title": {"name": "Test Movie", "year": 2024},
            "pagination": {"data": [
                {"id": 9, "qual": {"qual": "ULTRA HD (x265)"}, "host": {"name": "1fichier"},
                 "langues_compact": [{"name": "French"}]},
                {"id": 8, "qual": {"qual": "1080p"}, "host": {"name": "send"},
                 "langues_compact": [{"name": "French"}]}
            ]}
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/liens/9/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lien": {"active": 1, "lien": "https://1fichier.com/?nine"}
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/liens/8/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lien": {"active": 1, "deleted_at": "2024-01-01", "lien": "https://send.cm/eight"}
        })))
        .mount(server)
        .await;
}

fn catalog_for(server: &MockServer) -> Arc<CatalogClient> {
    Arc::new(
        CatalogClient::new(
            &server.uri(),
            Some(CatalogCredentials::new("remember_web", "secret")),
            Settings::default().http_options(),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_search_returns_only_live_links() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_movie_catalog(&server).await;
    let catalog = catalog_for(&server);
    let service = SearchService::new(
        catalog.clone(),
        LinkVerifier::new(catalog),
        SearchLimits::default(),
    );

    let releases = service
        .search(&SearchRequest {
            query: "Test Movie".to_string(),
            media_kind: MediaKind::Movie,
            season: None,
            episode: None,
        })
        .await;

    assert_eq!(releases.len(), 1);
    let release = &releases[0];
    assert_eq!(release.title, "Test Movie (2024) Bluray-2160p");
    assert_eq!(release.display_title, "Test Movie (2024) Bluray-2160p [1fichier]");
    assert_eq!(release.category, 2045);
    assert_eq!(release.guid, "catalog-3-9");
    assert_eq!(release.payload.url.as_deref(), Some("https://1fichier.com/?nine"));
}

#[tokio::test]
async fn test_indexer_feed_links_decode_to_payload() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_movie_catalog(&server).await;
    let catalog = catalog_for(&server);

    let settings = Arc::new(Settings {
        api_key: "k".to_string(),
        catalog_base_url: server.uri(),
        ..Settings::default()
    });
    let search = SearchService::new(
        catalog.clone(),
        LinkVerifier::new(catalog.clone()),
        settings.search_limits(),
    );
    let tmdb = Arc::new(
        TmdbClient::new(&settings.tmdb_base_url, None, settings.http_options()).unwrap(),
    );
    let repository = DownloadRepository::new(Database::new_in_memory().await.unwrap());
    let downloads = Arc::new(
        DownloadManager::new(Arc::new(IdleAgent), repository, "/output")
            .await
            .unwrap(),
    );
    let state = AppState::new(settings, search, tmdb, downloads, catalog).unwrap();

    let response = router(state)
        .oneshot(
            Request::get("/api?t=movie&q=Test%20Movie&apikey=k")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(body.contains("<title>Test Movie (2024) Bluray-2160p</title>"));
    assert!(body.contains(r#"<newznab:attr name="category" value="2045"/>"#));
    assert!(!body.contains("catalog-3-8"));

    let start = body.find("/nzb?id=").unwrap() + "/nzb?id=".len();
    let end = start + body[start..].find("&amp;").unwrap();
    let token = urlencoding::decode(&body[start..end]).unwrap();
    let payload = LinkPayload::decode(&token).unwrap();
    assert_eq!(payload.clean_title, "Test Movie (2024) Bluray-2160p");
    assert_eq!(payload.link_id, Some(9));
}
