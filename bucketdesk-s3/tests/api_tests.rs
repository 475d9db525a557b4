//! Proxy API integration tests
//!
//! These tests serve the API router against the in-memory backend and drive
//! it over HTTP with reqwest.

use bucketdesk_s3::{
    api_router, model::ConfigDefaults, storage::BackendCall, storage::EphemeralBackend,
    EphemeralBackendFactory, ProxyService, ProxyState, UploadLimits,
};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

struct TestApp {
    base_url: String,
    backend: Arc<EphemeralBackend>,
    client: reqwest::Client,
}

impl TestApp {
    async fn start() -> Self {
        Self::start_with_limits(UploadLimits::default()).await
    }

    async fn start_with_limits(limits: UploadLimits) -> Self {
        let backend = Arc::new(EphemeralBackend::new());
        let factory = Arc::new(EphemeralBackendFactory::new(backend.clone()));
        let service = ProxyService::new(factory).with_upload_limits(limits);
        let state = Arc::new(ProxyState::new(service).with_defaults(ConfigDefaults {
            region: Some("eu-west-1".to_string()),
            endpoint: None,
            access_key_id: Some("AKIDEXAMPLE".to_string()),
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = axum::Router::new().nest("/api", api_router(state));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/api", addr),
            backend,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn upload(&self, form: Form) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

fn config() -> Value {
    json!({"region": "us-east-1", "accessKeyId": "AKIDEXAMPLE", "secretAccessKey": "secret"})
}

fn upload_form(bucket: &str, path: &str) -> Form {
    Form::new()
        .text("config", config().to_string())
        .text("bucket", bucket.to_string())
        .text("path", path.to_string())
}

fn file_part(name: &str, data: Vec<u8>) -> Part {
    Part::bytes(data).file_name(name.to_string())
}

// =============================================================================
// CONNECT / BUCKETS
// =============================================================================

#[tokio::test]
async fn test_connect_success() {
    let app = TestApp::start().await;
    let (status, body) = app.post("/connect", json!({"config": config()})).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Connected successfully");
}

#[tokio::test]
async fn test_connect_missing_config() {
    let app = TestApp::start().await;
    let (status, body) = app
        .post("/connect", json!({"config": {"region": "us-east-1"}}))
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "MissingConfiguration");
    assert!(body["error"].as_str().unwrap().contains("accessKeyId"));
    assert!(body["requestId"].is_string());
    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_list_buckets_missing_config() {
    let app = TestApp::start().await;
    let (status, body) = app.post("/buckets", json!({})).await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "MissingConfiguration");
}

#[tokio::test]
async fn test_malformed_json() {
    let app = TestApp::start().await;
    let response = app
        .client
        .post(format!("{}/buckets", app.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "InvalidRequest");
}

#[tokio::test]
async fn test_create_bucket_with_region() {
    let app = TestApp::start().await;
    let (status, body) = app
        .post(
            "/buckets/create",
            json!({"config": config(), "bucketName": "demo", "region": "eu-west-1"}),
        )
        .await;

    assert_eq!(status, 200);
    assert!(body["message"].as_str().unwrap().contains("demo"));
    assert_eq!(app.backend.bucket_location("demo").as_deref(), Some("eu-west-1"));

    let (status, body) = app.post("/buckets", json!({"config": config()})).await;
    assert_eq!(status, 200);
    assert_eq!(body["buckets"][0]["name"], "demo");
}

#[tokio::test]
async fn test_create_bucket_us_east_1_has_no_constraint() {
    let app = TestApp::start().await;
    let (status, _) = app
        .post("/buckets/create", json!({"config": config(), "bucketName": "plain"}))
        .await;

    assert_eq!(status, 200);
    assert!(app.backend.bucket_exists("plain"));
    assert_eq!(app.backend.bucket_location("plain"), None);
}

#[tokio::test]
async fn test_create_bucket_backend_error() {
    let app = TestApp::start().await;
    let body = json!({"config": config(), "bucketName": "dup"});
    app.post("/buckets/create", body.clone()).await;
    let (status, body) = app.post("/buckets/create", body).await;

    assert_eq!(status, 500);
    assert_eq!(body["code"], "BackendFailure");
}

// =============================================================================
// OBJECTS / FOLDERS
// =============================================================================

#[tokio::test]
async fn test_list_objects_empty_bucket() {
    let app = TestApp::start().await;
    app.post("/buckets/create", json!({"config": config(), "bucketName": "b"}))
        .await;

    let (status, body) = app
        .post("/objects", json!({"config": config(), "bucket": "b", "prefix": ""}))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["contents"], json!([]));
    assert_eq!(body["commonPrefixes"], json!([]));
    assert_eq!(body["isTruncated"], false);
}

#[tokio::test]
async fn test_list_objects_missing_bucket_field() {
    let app = TestApp::start().await;
    let (status, body) = app.post("/objects", json!({"config": config()})).await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "InvalidRequest");
    assert_eq!(body["resource"], "bucket");
}

#[tokio::test]
async fn test_create_folder_then_list() {
    let app = TestApp::start().await;
    app.post("/buckets/create", json!({"config": config(), "bucketName": "b"}))
        .await;

    let (status, _) = app
        .post(
            "/folders/create",
            json!({"config": config(), "bucket": "b", "key": "docs/"}),
        )
        .await;
    assert_eq!(status, 200);

    let (_, body) = app
        .post("/objects", json!({"config": config(), "bucket": "b", "prefix": ""}))
        .await;
    assert_eq!(body["commonPrefixes"], json!(["docs/"]));
    assert_eq!(body["contents"], json!([]));

    let (_, body) = app
        .post("/objects", json!({"config": config(), "bucket": "b", "prefix": "docs/"}))
        .await;
    assert_eq!(body["contents"][0]["key"], "docs/");
    assert_eq!(body["contents"][0]["size"], 0);
}

// =============================================================================
// UPLOAD
// =============================================================================

#[tokio::test]
async fn test_upload_files_skips_empty() {
    let app = TestApp::start().await;
    app.post("/buckets/create", json!({"config": config(), "bucketName": "b"}))
        .await;

    let form = upload_form("b", "photos/")
        .part("files", file_part("a.txt", b"hello".to_vec()))
        .part("files", file_part("empty.txt", Vec::new()))
        .part("files", file_part("b.png", vec![1, 2, 3]));
    let (status, body) = app.upload(form).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (data, content_type) = app.backend.object("b", "photos/a.txt").unwrap();
    assert_eq!(&data[..], b"hello");
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    let (_, content_type) = app.backend.object("b", "photos/b.png").unwrap();
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert!(app.backend.object("b", "photos/empty.txt").is_none());
}

#[tokio::test]
async fn test_upload_oversize_file_named() {
    let app = TestApp::start_with_limits(UploadLimits {
        max_file_size: 1024,
        ..UploadLimits::default()
    })
    .await;
    app.post("/buckets/create", json!({"config": config(), "bucketName": "b"}))
        .await;

    let form = upload_form("b", "")
        .part("files", file_part("small.txt", b"ok".to_vec()))
        .part("files", file_part("huge.bin", vec![0u8; 4096]));
    let (status, body) = app.upload(form).await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "EntityTooLarge");
    assert!(body["error"].as_str().unwrap().contains("huge.bin"));
    assert!(app.backend.object("b", "huge.bin").is_none());
}

#[tokio::test]
async fn test_upload_spooled_file() {
    let app = TestApp::start_with_limits(UploadLimits {
        spool_threshold: 16,
        ..UploadLimits::default()
    })
    .await;
    app.post("/buckets/create", json!({"config": config(), "bucketName": "b"}))
        .await;

    let data: Vec<u8> = (0..200u8).collect();
    let form = upload_form("b", "").part("files", file_part("data.bin", data.clone()));
    let (status, _) = app.upload(form).await;

    assert_eq!(status, 200);
    let (stored, _) = app.backend.object("b", "data.bin").unwrap();
    assert_eq!(&stored[..], &data[..]);
}

#[tokio::test]
async fn test_upload_without_files() {
    let app = TestApp::start().await;
    let (status, body) = app.upload(upload_form("b", "")).await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "InvalidRequest");
}

#[tokio::test]
async fn test_upload_missing_bucket_fails() {
    let app = TestApp::start().await;
    let form = upload_form("nope", "").part("files", file_part("a.txt", b"x".to_vec()));
    let (status, body) = app.upload(form).await;

    assert_eq!(status, 500);
    assert_eq!(body["code"], "UploadFailed");
    assert_eq!(body["resource"], "a.txt");
}

#[tokio::test]
async fn test_upload_requires_multipart() {
    let app = TestApp::start().await;
    let (status, body) = app.post("/upload", json!({})).await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "InvalidRequest");
}

// =============================================================================
// DELETE
// =============================================================================

#[tokio::test]
async fn test_delete_objects_without_bucket() {
    let app = TestApp::start().await;
    let (status, body) = app
        .post(
            "/delete",
            json!({"config": config(), "items": [{"key": "a.txt", "isBucket": false}]}),
        )
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "MissingBucket");
    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_delete_empty_items() {
    let app = TestApp::start().await;
    let (status, body) = app
        .post("/delete", json!({"config": config(), "bucket": "b", "items": []}))
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "InvalidRequest");
}

#[tokio::test]
async fn test_delete_mixed_items_order() {
    let app = TestApp::start().await;
    for name in ["data", "old-1", "old-2"] {
        app.post("/buckets/create", json!({"config": config(), "bucketName": name}))
            .await;
    }
    let form = upload_form("data", "")
        .part("files", file_part("a.txt", b"a".to_vec()))
        .part("files", file_part("b.txt", b"b".to_vec()));
    app.upload(form).await;
    app.backend.clear_calls();

    let (status, body) = app
        .post(
            "/delete",
            json!({
                "config": config(),
                "bucket": "data",
                "items": [
                    {"bucketName": "old-2", "isBucket": true},
                    {"key": "a.txt", "isBucket": false},
                    {"bucketName": "old-1", "isBucket": true},
                    {"key": "b.txt", "isBucket": false}
                ]
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(
        app.backend.calls(),
        vec![
            BackendCall::DeleteObjects {
                bucket: "data".to_string(),
                keys: vec!["a.txt".to_string(), "b.txt".to_string()],
            },
            BackendCall::DeleteBucket {
                bucket: "old-2".to_string(),
            },
            BackendCall::DeleteBucket {
                bucket: "old-1".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_delete_non_empty_bucket_fails() {
    let app = TestApp::start().await;
    app.post("/buckets/create", json!({"config": config(), "bucketName": "full"}))
        .await;
    app.post(
        "/folders/create",
        json!({"config": config(), "bucket": "full", "key": "x/"}),
    )
    .await;

    let (status, body) = app
        .post(
            "/delete",
            json!({"config": config(), "items": [{"bucketName": "full", "isBucket": true}]}),
        )
        .await;

    assert_eq!(status, 500);
    assert_eq!(body["code"], "BackendFailure");
    assert!(body["error"].as_str().unwrap().contains("not empty"));
}

// =============================================================================
// DEFAULTS
// =============================================================================

#[tokio::test]
async fn test_defaults_hide_secret() {
    let app = TestApp::start().await;
    let body: Value = app
        .client
        .get(format!("{}/defaults", app.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["region"], "eu-west-1");
    assert_eq!(body["accessKeyId"], "AKIDEXAMPLE");
    assert!(body.get("secretAccessKey").is_none());
}
