use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sift_core::{Engine, EngineConfig, IndexerConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn engine() -> Arc<Engine> {
    let config = EngineConfig {
        indexer: IndexerConfig { extensions: None, ..IndexerConfig::default() },
        ..EngineConfig::default()
    };
    Engine::open(config).unwrap()
}

fn tiny_folder() -> TempDir {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "const foo").unwrap();
    fs::write(dir.path().join("b.txt"), "var bar").unwrap();
    dir
}

async fn indexed_engine(dir: &Path) -> Arc<Engine> {
    let engine = engine();
    engine.start_indexing(dir).unwrap().wait().await.unwrap();
    engine
}

async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, body)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(app, Method::GET, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tiny_folder();
    let app = sift_server::build_app(indexed_engine(dir.path()).await);

    let (status, json) = get_json(app.clone(), "/search?query=const").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert!(arr[0]["path"].as_str().unwrap().ends_with("a.txt"));
    assert!(arr[0]["snippet"].as_str().unwrap().contains("<em>const</em>"));

    let (status, json) = get_json(app, "/search?query=const%20OR%20bar&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn bad_queries_are_client_errors() {
    let app = sift_server::build_app(engine());

    let (status, _) = get_json(app.clone(), "/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = get_json(app.clone(), "/search?query=%28unclosed").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["position"], 0);

    let nested = "%28".repeat(5_000);
    let (status, json) = get_json(app, &format!("/search?query={nested}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "query nested too deeply");
}

#[tokio::test]
async fn search_without_limit_returns_every_hit() {
    let dir = tiny_folder();
    let app = sift_server::build_app(indexed_engine(dir.path()).await);

    let (status, json) = get_json(app, "/search?query=const%20OR%20bar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["query"], "const OR bar");
    assert_eq!(json["total_hits"], 2);
    assert_eq!(json["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn index_endpoint_validates_path_and_runs_job() {
    let dir = tiny_folder();
    let app = sift_server::build_app(engine());

    let (status, _) = call(app.clone(), Method::POST, "/index").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let missing = format!("/index?path={}/missing", dir.path().display());
    let (status, _) = call(app.clone(), Method::POST, &missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/index?path={}", dir.path().display());
    let (status, _) = call(app.clone(), Method::POST, &uri).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut json = Value::Null;
    for _ in 0..200 {
        json = get_json(app.clone(), "/status").await.1;
        if json["indexingInProgress"] == false {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(json["indexingInProgress"], false);
    assert_eq!(json["count"], 2);
    assert!(json["currentFile"].is_null());
}

#[tokio::test]
async fn delete_empties_the_index() {
    let dir = tiny_folder();
    let app = sift_server::build_app(indexed_engine(dir.path()).await);

    let (status, _) = call(app.clone(), Method::DELETE, "/index").await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = get_json(app, "/status").await;
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn file_endpoint_serves_only_indexed_files() {
    let dir = tiny_folder();
    let app = sift_server::build_app(indexed_engine(dir.path()).await);

    let uri = format!("/file?path={}/a.txt", dir.path().display());
    let (status, body) = call(app.clone(), Method::GET, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"const foo");

    let (status, _) = call(app, Method::GET, "/file?path=/etc/hostname").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn progress_stream_ends_when_idle() {
    let app = sift_server::build_app(engine());
    let (status, body) = call(app, Method::GET, "/progress").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!String::from_utf8_lossy(&body).contains("data:"));
}

#[tokio::test]
async fn config_echo_endpoints() {
    let app = sift_server::build_app(engine());
    let (status, json) = get_json(app.clone(), "/skippablefolders").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().iter().any(|d| d == "node_modules"));
    let (_, json) = get_json(app, "/indexableextensions").await;
    assert!(json.is_null());
}
