use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;

use gallerist::auth::{encode_token, SharedSecret, USERNAME};
use gallerist::catalog::FolderScanner;
use gallerist::client::{
    CredentialStore, Credentials, GallerySession, ImageLoader, MemorySettingsStore,
    ScrollViewport, SlotState, TransportClient,
};
use gallerist::config::ClientConfig;
use gallerist::error::ErrorKind;
use gallerist::models::page::DEFAULT_PAGE_SIZE;
use gallerist::server::{build_router, AppState};
use image::{ImageFormat, Rgba, RgbaImage};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

const SECRET: &str = "olimpic_carrot";

fn image_bytes(format: ImageFormat) -> Vec<u8> {
    let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let grill = dir.path().join("thegrill");
    std::fs::create_dir(&grill).unwrap();
    std::fs::write(grill.join("b.png"), image_bytes(ImageFormat::Png)).unwrap();
    std::fs::write(grill.join("a.jpg"), image_bytes(ImageFormat::Png)).unwrap();
    std::fs::write(grill.join("C.GIF"), image_bytes(ImageFormat::Gif)).unwrap();
    std::fs::write(grill.join("notes.txt"), b"not an image").unwrap();
    std::fs::create_dir(dir.path().join("empty")).unwrap();
    dir
}

async fn start(root: &Path) -> SocketAddr {
    let state = AppState::new(FolderScanner::new(root), SharedSecret::new(SECRET), DEFAULT_PAGE_SIZE);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

fn transport(addr: SocketAddr, secret: &str, page_size: u32) -> TransportClient {
    let mut store = CredentialStore::load(Box::new(MemorySettingsStore::new())).unwrap();
    store
        .update(&Credentials::new(format!("http://{addr}"), secret))
        .unwrap();
    let config = ClientConfig {
        page_size,
        ..ClientConfig::default()
    };
    TransportClient::new(store, &config).unwrap()
}

fn url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).unwrap()
}

fn with_query_token(mut url: Url, secret: &str) -> Url {
    url.query_pairs_mut()
        .append_pair("auth", &encode_token(USERNAME, secret));
    url
}

#[tokio::test]
async fn test_header_auth_lists_folders() {
    let root = fixture();
    let addr = start(root.path()).await;

    let resp = reqwest::Client::new()
        .get(url(addr, "/api/folders"))
        .basic_auth(USERNAME, Some(SECRET))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "folders": ["empty", "thegrill"] }));
}

#[tokio::test]
async fn test_missing_credentials_challenge() {
    let root = fixture();
    let addr = start(root.path()).await;

    let resp = reqwest::get(url(addr, "/api/folders")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge = resp.headers()["www-authenticate"].to_str().unwrap().to_string();
    assert!(challenge.starts_with("Basic realm="));
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_query_token_only_accepted_for_images() {
    let root = fixture();
    let addr = start(root.path()).await;

    let folders = with_query_token(url(addr, "/api/folders"), SECRET);
    assert_eq!(reqwest::get(folders).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    let listing = with_query_token(url(addr, "/api/folders/thegrill"), SECRET);
    assert_eq!(reqwest::get(listing).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    let image = with_query_token(url(addr, "/api/images/thegrill/b.png"), SECRET);
    let resp = reqwest::get(image).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.bytes().await.unwrap().to_vec(), image_bytes(ImageFormat::Png));
}

#[tokio::test]
async fn test_wrong_secret_rejected_everywhere() {
    let root = fixture();
    let addr = start(root.path()).await;
    let http = reqwest::Client::new();

    for path in ["/api/folders", "/api/folders/thegrill", "/api/images/thegrill/a.jpg"] {
        let resp = http
            .get(url(addr, path))
            .basic_auth(USERNAME, Some("wrong"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{path}");
    }

    let image = with_query_token(url(addr, "/api/images/thegrill/a.jpg"), "wrong");
    assert_eq!(reqwest::get(image).await.unwrap().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_query_token_falls_back_to_header() {
    let root = fixture();
    let addr = start(root.path()).await;

    let mut image = url(addr, "/api/images/thegrill/a.jpg");
    image.query_pairs_mut().append_pair("auth", "%%%not-base64");
    let resp = reqwest::Client::new()
        .get(image)
        .basic_auth(USERNAME, Some(SECRET))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_folder_is_json_404() {
    let root = fixture();
    let addr = start(root.path()).await;

    let resp = reqwest::Client::new()
        .get(url(addr, "/api/folders/nope"))
        .basic_auth(USERNAME, Some(SECRET))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Folder not found" }));

    let client = transport(addr, SECRET, 2);
    let err = client.list_images("nope", 1, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = client.fetch_image(&client.image_url("thegrill", "notes.txt").unwrap()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_paging_through_transport() {
    let root = fixture();
    let addr = start(root.path()).await;
    let client = transport(addr, SECRET, 2);

    let first = client.list_images("thegrill", 1, 2).await.unwrap();
    assert_eq!(first.folder_name, "thegrill");
    assert_eq!(first.images, vec!["a.jpg", "b.png"]);
    assert_eq!(first.pagination.total_images, 3);
    assert_eq!(first.pagination.total_pages, 2);

    let second = client.list_images("thegrill", 2, 2).await.unwrap();
    assert_eq!(second.images, vec!["C.GIF"]);

    let past_end = client.list_images("thegrill", 5, 2).await.unwrap();
    assert!(past_end.images.is_empty());
    assert_eq!(past_end.pagination.total_pages, 2);

    let empty = client.list_images("empty", 1, 2).await.unwrap();
    assert!(empty.images.is_empty());
    assert_eq!(empty.pagination.total_images, 0);
    assert_eq!(empty.pagination.total_pages, 0);
}

#[tokio::test]
async fn test_malformed_paging_uses_defaults() {
    let root = fixture();
    let addr = start(root.path()).await;

    let resp = reqwest::Client::new()
        .get(url(addr, "/api/folders/thegrill?page=abc&pageSize=-3"))
        .basic_auth(USERNAME, Some(SECRET))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["pageSize"], 20);
    assert_eq!(body["images"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_image_url_works_without_headers() {
    let root = fixture();
    let addr = start(root.path()).await;
    let client = transport(addr, SECRET, 2);

    let image_url = client.image_url("thegrill", "C.GIF").unwrap();
    let resp = reqwest::get(&image_url).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/gif");
    assert!(client.test_connection().await);
}

#[tokio::test]
async fn test_wrong_secret_is_auth_failure() {
    let root = fixture();
    let addr = start(root.path()).await;
    let client = transport(addr, "wrong", 2);

    let err = client.list_folders().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthFailure);
    assert!(!client.test_connection().await);
}

#[tokio::test]
async fn test_session_loads_visible_images() {
    let root = fixture();
    let addr = start(root.path()).await;
    let config = ClientConfig {
        page_size: 2,
        ..ClientConfig::default()
    };
    let client = transport(addr, SECRET, 2);
    let loader = ImageLoader::new(client.clone(), config.max_downloads);
    let mut session = GallerySession::new(client, config);

    session.refresh_folders().await.unwrap();
    session.open_folder("thegrill").await.unwrap();
    assert!(!session.view().unwrap().from_cache);
    assert_eq!(
        session.status_line().as_deref(),
        Some("3 image(s) - Showing 2 of 3")
    );

    let started = session.poll_viewport(&ScrollViewport::new(1000.0, 600.0), &loader);
    assert_eq!(started, 2);
    for _ in 0..started {
        let outcome = loader.next_result().await.unwrap();
        assert!(session.apply_load(&outcome));
    }
    assert!(session
        .scheduler()
        .slots()
        .iter()
        .all(|slot| slot.state == SlotState::VisibleLoaded && slot.image_size == Some((3, 2))));

    assert!(session.next_page().await.unwrap());
    assert_eq!(session.view().unwrap().pagination.page, 2);
    assert!(!session.next_page().await.unwrap());

    // The landing page comes back from the cache.
    session.open_folder("thegrill").await.unwrap();
    let view = session.view().unwrap();
    assert!(view.from_cache);
    assert_eq!(view.images.len(), 2);

    let url = view.images[1].clone();
    let bytes = session.download(&url).await.unwrap();
    assert_eq!(bytes, image_bytes(ImageFormat::Png));
}

#[tokio::test]
async fn test_image_is_streamed_with_length() {
    let root = fixture();
    let large = root.path().join("large");
    std::fs::create_dir(&large).unwrap();
    let payload: Vec<u8> = (0..2 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(large.join("big.jpg"), &payload).unwrap();
    let addr = start(root.path()).await;
    let client = transport(addr, SECRET, 2);

    let image = with_query_token(url(addr, "/api/images/thegrill/b.png"), SECRET);
    let resp = reqwest::get(image).await.unwrap();
    let expected = image_bytes(ImageFormat::Png);
    assert_eq!(resp.content_length(), Some(expected.len() as u64));
    assert_eq!(resp.bytes().await.unwrap().to_vec(), expected);

    let big_url = client.image_url("large", "big.jpg").unwrap();
    let resp = reqwest::get(&big_url).await.unwrap();
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    assert_eq!(resp.content_length(), Some(payload.len() as u64));
    assert_eq!(client.fetch_image(&big_url).await.unwrap(), payload);
}

#[tokio::test]
async fn test_session_opens_full_size_image() {
    let root = fixture();
    let addr = start(root.path()).await;
    let config = ClientConfig {
        page_size: 2,
        ..ClientConfig::default()
    };
    let mut session = GallerySession::new(transport(addr, SECRET, 2), config);

    session.load_page("thegrill", 2).await.unwrap();
    let selected = session.open_image(0).await.unwrap().unwrap();
    assert_eq!(selected.index, 0);
    assert_eq!(selected.image.size(), (3, 2));
    assert!(selected.url.contains("/api/images/thegrill/C.GIF?auth="));
    assert!(session.banner().is_none());

    session.close_image();
    assert!(session.selected().is_none());
    assert_eq!(session.view().unwrap().images.len(), 1);
}

#[tokio::test]
async fn test_session_rejected_image_keeps_selection() {
    let root = fixture();
    let addr = start(root.path()).await;
    let mut session = GallerySession::new(transport(addr, SECRET, 2), ClientConfig::default());

    session.load_page("thegrill", 1).await.unwrap();
    session.open_image(0).await.unwrap().unwrap();
    let opened = session.selected().unwrap().url.clone();

    std::fs::remove_file(root.path().join("thegrill").join("C.GIF")).unwrap();
    let err = session.open_image(2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(session.banner().unwrap().kind, ErrorKind::NotFound);
    assert_eq!(session.selected().unwrap().url, opened);
    assert_eq!(session.view().unwrap().images.len(), 3);
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct CapturedLogs(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_request_logs_leave_out_query_token() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("tower_http=debug,gallerist=debug"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    // The test runtime is single-threaded, so the server task logs here too.
    let _guard = tracing::subscriber::set_default(subscriber);

    let root = fixture();
    let addr = start(root.path()).await;
    let image = with_query_token(url(addr, "/api/images/thegrill/b.png"), SECRET);
    let resp = reqwest::get(image).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    resp.bytes().await.unwrap();

    let output = String::from_utf8(logs.0.lock().clone()).unwrap();
    assert!(output.contains("path=/api/images/thegrill/b.png"), "{output}");
    assert!(!output.contains("auth="), "{output}");
    assert!(!output.contains(&encode_token(USERNAME, SECRET)), "{output}");
}
