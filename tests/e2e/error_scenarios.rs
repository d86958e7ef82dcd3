//! E2E Error Scenario Tests
//!
//! ## Test Coverage
//!
//! - Missing or empty file field
//! - Non-multipart requests
//! - Storage failures
//! - Unknown routes and wrong methods
//! - Client disconnects while the upload is in flight

use super::common::{MemoryStore, MockStore, TestEnv};
use async_trait::async_trait;
use form_uploadr::s3::{ObjectStore, PutObjectOutput, PutObjectRequest, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;

fn error_text(body: &str) -> Option<&str> {
    let start = body.find("<p id=\"error\">")? + "<p id=\"error\">".len();
    let end = body[start..].find("</p>")? + start;
    Some(&body[start..end])
}

/// Test: a form without the `image` field is rejected before storage is called
#[tokio::test]
async fn test_missing_field_never_calls_storage() {
    let mut store = MockStore::new();
    store.expect_put_object().times(0);
    let env = TestEnv::start(Arc::new(store)).await;

    let response = env.upload("document", "cat.png", b"meow".to_vec()).await;

    assert_eq!(response.status(), 400);
    let body = response.text().await.unwrap();
    assert_eq!(error_text(&body), Some("Failed to upload file"));
}

#[tokio::test]
async fn test_empty_file_name_is_rejected() {
    let store = Arc::new(MemoryStore::default());
    let env = TestEnv::start(store.clone()).await;

    let form = reqwest::multipart::Form::new().text("image", "just text, no file");
    let response = env
        .client
        .post(format!("{}/", env.base_url()))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_non_multipart_body_is_rejected() {
    let store = Arc::new(MemoryStore::default());
    let env = TestEnv::start(store.clone()).await;

    let response = env
        .client
        .post(format!("{}/", env.base_url()))
        .header("Content-Type", "application/json")
        .body(r#"{"image":"cat.png"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body = response.text().await.unwrap();
    assert_eq!(error_text(&body), Some("Failed to upload file"));
    assert_eq!(store.put_count(), 0);
}

/// Test: any storage failure shows the same generic message
#[tokio::test]
async fn test_storage_failure_shows_generic_message() {
    let mut store = MockStore::new();
    store
        .expect_put_object()
        .times(1)
        .returning(|_| Err(StorageError::RequestError("AccessDenied: bucket policy".into())));
    let env = TestEnv::start(Arc::new(store)).await;

    let response = env.upload("image", "cat.png", b"meow".to_vec()).await;

    assert_eq!(response.status(), 400);
    let body = response.text().await.unwrap();
    assert_eq!(error_text(&body), Some("Failed to upload file to aws"));
    assert!(!body.contains("AccessDenied"));
}

#[tokio::test]
async fn test_storage_receives_key_and_bucket() {
    let mut store = MockStore::new();
    store
        .expect_put_object()
        .withf(|request| {
            request.bucket == "go-test-projects" && request.key == "cat.png" && request.body.len() == 4
        })
        .times(1)
        .returning(|request| {
            Ok(form_uploadr::s3::PutObjectOutput {
                location: format!("https://{}.s3.amazonaws.com/{}", request.bucket, request.key),
                etag: None,
            })
        });
    let env = TestEnv::start(Arc::new(store)).await;

    let response = env.upload("image", "cat.png", b"meow".to_vec()).await;

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let env = TestEnv::start(Arc::new(MemoryStore::default())).await;

    let response = env.get("/upload").await;

    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "Not Found");
}

#[tokio::test]
async fn test_asset_traversal_returns_404() {
    let env = TestEnv::start(Arc::new(MemoryStore::default())).await;

    assert_eq!(env.get("/assets/missing.css").await.status(), 404);
    assert_eq!(env.get("/assets/%2e%2e/templates/index.html").await.status(), 404);
}

#[tokio::test]
async fn test_wrong_methods_return_405() {
    let env = TestEnv::start(Arc::new(MemoryStore::default())).await;

    let response = env
        .client
        .post(format!("{}/ping", env.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
    assert_eq!(response.headers().get("allow").unwrap(), "GET");

    let response = env
        .client
        .delete(format!("{}/", env.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
    assert_eq!(response.headers().get("allow").unwrap(), "GET, POST");
}

/// Sets its flag when dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Store whose writes never complete
#[derive(Default)]
struct StalledStore {
    started: Arc<Notify>,
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl ObjectStore for StalledStore {
    async fn put_object(
        &self,
        _request: PutObjectRequest,
    ) -> Result<PutObjectOutput, StorageError> {
        let _flag = DropFlag(self.dropped.clone());
        self.started.notify_one();
        std::future::pending::<Result<PutObjectOutput, StorageError>>().await
    }
}

/// Test: a client hanging up mid-upload drops the storage call and counts a cancellation
#[tokio::test]
async fn test_client_disconnect_cancels_upload() {
    let store = Arc::new(StalledStore::default());
    let started = store.started.clone();
    let dropped = store.dropped.clone();
    let env = TestEnv::start(store).await;

    let cancelled = || {
        form_uploadr::metrics::ERRORS_TOTAL
            .with_label_values(&["cancelled"])
            .get()
    };
    let before = cancelled();

    let boundary = "disconnect-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"slow.png\"\r\n\
         Content-Type: image/png\r\n\r\nstalled\r\n--{b}--\r\n",
        b = boundary
    );
    let request = format!(
        "POST / HTTP/1.1\r\nHost: {}\r\nContent-Type: multipart/form-data; boundary={}\r\n\
         Content-Length: {}\r\n\r\n{}",
        env.server_addr,
        boundary,
        body.len(),
        body
    );

    let mut stream = tokio::net::TcpStream::connect(env.server_addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .expect("upload should reach storage");
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) || cancelled() <= before {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("disconnect should cancel the in-flight upload");

    assert!(dropped.load(Ordering::SeqCst));
    assert!(cancelled() > before);
}
