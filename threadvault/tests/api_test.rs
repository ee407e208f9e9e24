//! End-to-end tests of the HTTP surface against scripted search endpoints
//! and a temporary SQLite archive.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use threadvault::api::ApiServer;
use threadvault::backend::{
    BackendExecutor, Endpoint, HealthConfig, HealthRegistry, RawBucket, RawHit, RawResponse,
    SearchIndexClient, SqliteStore,
};
use threadvault::query::BackendRequest;
use threadvault::{Error, Gateway, Result};
use tower::ServiceExt;

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Answer,
    Fail,
}

/// Search endpoints keyed by name; each either answers or fails transiently.
struct FakeIndex {
    modes: Mutex<Vec<(String, Mode)>>,
    calls: Mutex<Vec<(String, BackendRequest)>>,
}

impl FakeIndex {
    fn new(modes: &[(&str, Mode)]) -> Arc<Self> {
        Arc::new(Self {
            modes: Mutex::new(modes.iter().map(|(n, m)| (n.to_string(), *m)).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_to(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|(n, _)| n == name).count()
    }
}

#[async_trait]
impl SearchIndexClient for FakeIndex {
    async fn search(&self, endpoint: &Endpoint, request: &BackendRequest) -> Result<RawResponse> {
        self.calls
            .lock()
            .push((endpoint.name.clone(), request.clone()));
        let mode = self
            .modes
            .lock()
            .iter()
            .find(|(n, _)| *n == endpoint.name)
            .map(|(_, m)| *m)
            .unwrap_or(Mode::Fail);
        if mode == Mode::Fail {
            return Err(Error::BackendTransient("connection refused".into()));
        }

        let mut response = RawResponse {
            took_ms: 7,
            total: 1,
            ..Default::default()
        };
        if request.size > 0 && !request.is_exact_lookup() {
            response.hits.push(RawHit {
                id: 36,
                source: json!({
                    "author": "spez",
                    "body": "hello",
                    "link_id": 35,
                    "parent_id": 35,
                    "score": 3,
                    "retrieved_on": 1
                })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            });
        }
        for agg in &request.aggregations {
            response.aggregations.insert(
                agg.name.clone(),
                vec![RawBucket {
                    key: json!("rust"),
                    doc_count: 1,
                }],
            );
        }
        Ok(response)
    }

    async fn probe(&self, _: &Endpoint) -> bool {
        false
    }
}

struct Harness {
    router: Router,
    index: Arc<FakeIndex>,
    _temp: TempDir,
}

fn seed_archive(path: &std::path::Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE comment (json TEXT NOT NULL);
         CREATE TABLE submission (json TEXT NOT NULL);",
    )
    .unwrap();
    for (id, link) in [(100u64, 35u64), (101, 35), (102, 99)] {
        conn.execute(
            "INSERT INTO comment (json) VALUES (?1)",
            rusqlite::params![
                json!({"id": id, "link_id": link, "body": "archived", "author": "a"}).to_string()
            ],
        )
        .unwrap();
    }
}

fn harness(modes: &[(&str, Mode)]) -> Harness {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("archive.db");
    seed_archive(&db_path);

    let index = FakeIndex::new(modes);
    let endpoints = modes
        .iter()
        .map(|(name, _)| Endpoint::new(*name, format!("http://{name}:9200")))
        .collect();
    let registry = Arc::new(HealthRegistry::new(endpoints, HealthConfig::default()));
    let store = SqliteStore::open(&db_path, 2, Duration::from_millis(200)).unwrap();
    let executor = BackendExecutor::new(index.clone(), registry, Duration::from_secs(1))
        .with_relational(Arc::new(store));
    let gateway = Arc::new(Gateway::new(Arc::new(executor), Duration::from_secs(2)));

    Harness {
        router: ApiServer::new(gateway).router(),
        index,
        _temp: temp,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let cache = response
        .headers()
        .get(header::CACHE_CONTROL)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, cache, body)
}

#[tokio::test]
async fn test_search_comments() {
    let h = harness(&[("primary", Mode::Answer)]);

    let (status, cache, body) = get(&h.router, "/search/comment?q=hello&aggs=subreddit").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("public, max-age=2, s-maxage=2"));
    assert_eq!(body["hits"][0]["id"], "10");
    assert_eq!(body["hits"][0]["parent_id"], "t3_z");
    assert!(body["hits"][0].get("retrieved_on").is_none());
    assert_eq!(body["total"], json!({"value": 1, "relation": "exact"}));
    assert_eq!(body["aggregations"]["subreddit"][0]["key"], "rust");
    assert_eq!(body["backend_used"], "primary");
    assert_eq!(body["took_ms"], 7);
}

#[tokio::test]
async fn test_legacy_routes_match() {
    let h = harness(&[("primary", Mode::Answer)]);
    for uri in [
        "/reddit/search?q=a",
        "/reddit/search/comment?q=a",
        "/reddit/comment/search?q=a",
        "/reddit/search/submission?q=a",
        "/reddit/submission/search?q=a",
        "/reddit/analyze/user/spez",
        "/reddit/submission/comment_ids/z",
        "/get/comment_ids/z",
    ] {
        let (status, _, _) = get(&h.router, uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }
}

#[tokio::test]
async fn test_validation_errors_are_400_without_backend_calls() {
    let h = harness(&[("primary", Mode::Answer)]);

    for uri in [
        "/search/comment?size=-1",
        "/search/comment?after=abc",
        "/search/comment?after=200&before=100",
        "/search/comment?domain=example.com",
        "/search/comment?offset=9990&size=20",
        "/search/comment?size=%ff",
        "/search/post?q=a",
        "/analyze/user/not%20valid",
        "/submission/comment_ids/$$$",
    ] {
        let (status, _, body) = get(&h.router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "validation_error", "{uri}");
        assert!(body["message"].is_string());
    }
    assert!(h.index.calls.lock().is_empty());
}

#[tokio::test]
async fn test_failover_to_second_endpoint() {
    let h = harness(&[("primary", Mode::Fail), ("fallback", Mode::Answer)]);

    let (status, _, body) = get(&h.router, "/search/submission?q=rust").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend_used"], "fallback");

    let (_, _, health) = get(&h.router, "/health").await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["endpoints"][0]["state"], "degraded");
    assert_eq!(health["endpoints"][1]["state"], "healthy");
}

#[tokio::test]
async fn test_full_text_search_never_uses_relational_store() {
    let h = harness(&[("primary", Mode::Fail), ("fallback", Mode::Fail)]);

    let (status, _, body) = get(&h.router, "/search/comment?q=archived").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "backend_unavailable");
}

#[tokio::test]
async fn test_id_lookup_falls_back_to_relational() {
    let h = harness(&[("primary", Mode::Fail)]);

    let (status, _, body) = get(&h.router, "/search/comment?ids=2s,2t&fields=body").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend_used"], "relational");
    let ids: Vec<_> = body["hits"].as_array().unwrap().iter().map(|h| h["id"].clone()).collect();
    assert_eq!(ids, vec![json!("2s"), json!("2t")]);
    assert_eq!(body["hits"][0]["body"], "archived");
}

#[tokio::test]
async fn test_comment_ids_from_archive() {
    let h = harness(&[("primary", Mode::Answer)]);

    let (status, cache, body) = get(&h.router, "/submission/comment_ids/t3_z").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("public, max-age=5, s-maxage=5"));
    assert_eq!(body["data"], json!(["2s", "2t"]));
    assert_eq!(h.index.calls_to("primary"), 1);
}

#[tokio::test]
async fn test_analyze_user() {
    let h = harness(&[("primary", Mode::Answer)]);

    let (status, _, body) = get(&h.router, "/analyze/user/Spez").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["author"], "spez");
    assert_eq!(body["comment_count"], 1);
    assert_eq!(body["failed_sections"], json!([]));
}

#[tokio::test]
async fn test_health_reports_unavailable() {
    let h = harness(&[("primary", Mode::Fail)]);
    for _ in 0..3 {
        get(&h.router, "/search/comment?q=a").await;
    }

    let (status, _, body) = get(&h.router, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
    assert_eq!(body["relational"], true);
}

#[tokio::test]
async fn test_metrics_disabled_is_404() {
    let h = harness(&[("primary", Mode::Answer)]);
    let (status, _, _) = get(&h.router, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
