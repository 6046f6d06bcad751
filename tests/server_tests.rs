//! End-to-end tests against the real router on an ephemeral port

use imageflow::server::{self, AppState, ServiceConfig};
use imageflow::RenderConfig;
use serde_json::{json, Value};

const TEST_KEY: &str = "test-key";

/// Spin up the service on an ephemeral port and return its base URL
async fn spawn_app() -> String {
    let config = ServiceConfig {
        api_key: TEST_KEY.to_string(),
        render: RenderConfig {
            no_sandbox: std::env::var("CI").is_ok(),
            ..Default::default()
        },
        render_workers: 1,
    };
    let state = AppState::new(&config).expect("failed to build app state");
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn root_returns_metadata_without_auth() {
    let base = spawn_app().await;
    let response = reqwest::get(format!("{}/", base)).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "ImageFlow");
    assert_eq!(body["endpoint"], "POST /convert");
    assert_eq!(body["health"], "/health");
}

#[tokio::test]
async fn health_returns_healthy_without_auth() {
    let base = spawn_app().await;
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn convert_without_token_is_unauthorized() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/convert", base))
        .json(&json!({ "html": "<h1>Hello</h1>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn convert_with_wrong_token_is_unauthorized() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/convert", base))
        .bearer_auth("wrong-key")
        .json(&json!({ "html": "<h1>Hello</h1>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn convert_rejects_malformed_body() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/convert", base))
        .bearer_auth(TEST_KEY)
        .body("this is not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Malformed"));
}

#[tokio::test]
async fn convert_rejects_unknown_format() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/convert", base))
        .bearer_auth(TEST_KEY)
        .json(&json!({ "html": "<p>x</p>", "format": "gif" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn convert_rejects_out_of_range_quality() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/convert", base))
        .bearer_auth(TEST_KEY)
        .json(&json!({ "html": "<p>x</p>", "format": "jpeg", "quality": 150 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn convert_rejects_disallowed_external_image() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    // Extension check fires before any fetch, so no server needs to exist
    let response = client
        .post(format!("{}/convert", base))
        .bearer_auth(TEST_KEY)
        .json(&json!({ "html": r#"<img src="https://example.invalid/payload.exe">"# }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("https://example.invalid/payload.exe"));
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn convert_renders_png_with_requested_dimensions() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/convert", base))
        .bearer_auth(TEST_KEY)
        .json(&json!({
            "html": "<h1>Hello</h1>",
            "width": 800,
            "height": 600,
            "format": "png",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "image/png"
    );

    let bytes = response.bytes().await.unwrap();
    assert_eq!(&bytes[0..8], b"\x89PNG\r\n\x1a\n");
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    assert_eq!(width, 800);
    assert_eq!(height, 600);
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn convert_renders_jpeg() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/convert", base))
        .bearer_auth(TEST_KEY)
        .json(&json!({
            "html": "<p>jpeg please</p>",
            "width": 400,
            "height": 300,
            "format": "jpeg",
            "quality": 80,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "image/jpeg"
    );

    let bytes = response.bytes().await.unwrap();
    assert_eq!(&bytes[0..3], &[0xFF, 0xD8, 0xFF]);
}
