//! HTTP API against a live listener.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use booksing::config::ScanConfig;
use booksing::ingest::Scanner;
use booksing::library::Library;
use booksing::refresh::RefreshController;
use booksing::server::router;
use booksing::storage::LocalStorage;
use booksing::store::MemoryBackend;
use booksing::traits::{AssetStorage, SearchBackend};
use serde_json::Value;

use common::{write_epub, InstrumentedExtractor};

struct TestServer {
    base: String,
    _dir: tempfile::TempDir,
}

async fn start(delay: Duration) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let import = dir.path().join("import");
    seed(&import);

    let scan = ScanConfig {
        import_dir: import,
        fail_dir: dir.path().join("failed"),
        concurrency: 2,
        ..ScanConfig::default()
    };
    let backend: Arc<dyn SearchBackend> = Arc::new(MemoryBackend::new());
    let storage: Arc<dyn AssetStorage> = Arc::new(LocalStorage::new(None));
    let scanner = Scanner::new(
        scan,
        Arc::new(InstrumentedExtractor::new(delay)),
        backend.clone(),
        storage.clone(),
    );
    let controller = Arc::new(RefreshController::new(scanner, Duration::from_secs(3600)));
    let library = Library::new(backend, storage, "cp");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(controller, library))
            .await
            .unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        _dir: dir,
    }
}

fn seed(import: &Path) {
    write_epub(import, "road.epub", "The Road", "Cormac McCarthy", "en");
    write_epub(import, "suttree.epub", "Suttree", "Cormac McCarthy", "en");
    write_epub(import, "hobbit.epub", "The Hobbit", "Tolkien, J.R.R.", "en");
}

async fn get_json(url: &str) -> (u16, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn refresh_and_wait(server: &TestServer) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/refresh", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);

    for _ in 0..300 {
        let (_, status) = get_json(&format!("{}/api/status", server.base)).await;
        if status["state"] == "idle" && !status["last"].is_null() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("refresh did not finish");
}

#[tokio::test]
async fn health_and_idle_status() {
    let server = start(Duration::ZERO).await;

    let (status, body) = get_json(&format!("{}/health", server.base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (_, body) = get_json(&format!("{}/api/status", server.base)).await;
    assert_eq!(body["state"], "idle");
    assert!(body["last"].is_null());
}

#[tokio::test]
async fn refresh_then_search_count_and_get() {
    let server = start(Duration::ZERO).await;
    refresh_and_wait(&server).await;

    let (_, status) = get_json(&format!("{}/api/status", server.base)).await;
    assert_eq!(status["last"]["added"], 3);

    let (_, count) = get_json(&format!("{}/api/count", server.base)).await;
    assert_eq!(count["count"], 3);

    let (status, page) = get_json(&format!("{}/api/search?q=mccarthy", server.base)).await;
    assert_eq!(status, 200);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let (_, page) = get_json(&format!("{}/api/search?q=mccarthy&limit=1&offset=1", server.base)).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let (_, exists) = get_json(&format!(
        "{}/api/exists/Cormac%20McCarthy/The%20Road",
        server.base
    ))
    .await;
    assert_eq!(exists["exists"], true);
    let hash = exists["identity_hash"].as_str().unwrap().to_string();

    let (status, book) = get_json(&format!("{}/api/books/{}", server.base, hash)).await;
    assert_eq!(status, 200);
    assert_eq!(book["title"], "The Road");

    let (_, history) = get_json(&format!("{}/api/refreshes", server.base)).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delete_and_missing_book() {
    let server = start(Duration::ZERO).await;
    refresh_and_wait(&server).await;

    let (_, exists) = get_json(&format!("{}/api/exists/Cormac%20McCarthy/Suttree", server.base)).await;
    let hash = exists["identity_hash"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let resp = client
        .delete(format!("{}/api/books/{}", server.base, hash))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let (status, body) = get_json(&format!("{}/api/books/{}", server.base, hash)).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (_, count) = get_json(&format!("{}/api/count", server.base)).await;
    assert_eq!(count["count"], 2);
}

#[tokio::test]
async fn bad_limit_is_rejected() {
    let server = start(Duration::ZERO).await;
    let (status, body) = get_json(&format!("{}/api/search?q=road&limit=0", server.base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn concurrent_refresh_is_a_conflict() {
    let server = start(Duration::from_millis(200)).await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{}/api/refresh", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 202);

    let second = client
        .post(format!("{}/api/refresh", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 409);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"]["code"], "already_running");
}
