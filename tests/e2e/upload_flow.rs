//! E2E Upload Flow Tests
//!
//! ## Test Coverage
//!
//! - Form page and static assets
//! - Single file upload stored under its file name
//! - Overwrite on repeated file names
//! - Uploads larger than the multipart memory ceiling
//! - Concurrent uploads

use super::common::{payload, MemoryStore, TestEnv, STYLESHEET, SUCCESS_TEXT};
use form_uploadr::config::ObjectAcl;
use std::sync::Arc;

#[tokio::test]
async fn test_ping_returns_pong() {
    let env = TestEnv::start(Arc::new(MemoryStore::default())).await;

    let response = env.get("/ping").await;

    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    assert_eq!(response.text().await.unwrap(), r#"{"message":"pong"}"#);
}

#[tokio::test]
async fn test_form_page_renders_without_message() {
    let env = TestEnv::start(Arc::new(MemoryStore::default())).await;

    let response = env.get("/").await;

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("<form"));
    assert!(!body.contains("id=\"success\""));
    assert!(!body.contains("id=\"error\""));
}

#[tokio::test]
async fn test_static_asset_is_served() {
    let env = TestEnv::start(Arc::new(MemoryStore::default())).await;

    let response = env.get("/assets/style.css").await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("content-type").unwrap(), "text/css");
    assert_eq!(response.text().await.unwrap(), STYLESHEET);
}

/// Test: a valid upload renders the success page and stores exactly one object
#[tokio::test]
async fn test_upload_stores_one_object() {
    let store = Arc::new(MemoryStore::default());
    let env = TestEnv::start(store.clone()).await;

    let response = env.upload("image", "cat.png", b"not really a png".to_vec()).await;

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(
        body.contains(&format!("<p id=\"success\">{}</p>", SUCCESS_TEXT)),
        "Success message missing from: {}",
        body
    );

    assert_eq!(store.put_count(), 1);
    let object = store.get("cat.png").expect("Object should be stored");
    assert_eq!(object.data.as_ref(), b"not really a png");
    assert_eq!(object.content_type.as_deref(), Some("image/png"));
    assert_eq!(object.acl, Some(ObjectAcl::PublicRead));
}

/// Test: uploading the same file name twice keeps the second content
#[tokio::test]
async fn test_same_name_overwrites() {
    let store = Arc::new(MemoryStore::default());
    let env = TestEnv::start(store.clone()).await;

    let first = env.upload("image", "avatar.png", b"first".to_vec()).await;
    assert_eq!(first.status(), 200);
    let second = env.upload("image", "avatar.png", b"second".to_vec()).await;
    assert_eq!(second.status(), 200);

    assert_eq!(store.put_count(), 2);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("avatar.png").unwrap().data.as_ref(), b"second");
}

/// Test: a file larger than the memory ceiling is spilled and still uploaded
#[tokio::test]
async fn test_upload_larger_than_memory_ceiling() {
    let store = Arc::new(MemoryStore::default());
    let env = TestEnv::with_memory_ceiling(store.clone(), 64 * 1024).await;
    let content = payload(1024 * 1024);

    let response = env.upload("image", "large.bin", content.clone()).await;

    assert_eq!(response.status(), 200);
    let stored = store.get("large.bin").expect("Object should be stored");
    assert_eq!(stored.data.len(), content.len());
    assert_eq!(stored.data.as_ref(), content.as_slice());
}

#[tokio::test]
async fn test_other_form_fields_are_ignored() {
    let store = Arc::new(MemoryStore::default());
    let env = TestEnv::start(store.clone()).await;

    let form = reqwest::multipart::Form::new()
        .text("title", "holiday")
        .part(
            "image",
            reqwest::multipart::Part::bytes(b"beach".to_vec()).file_name("beach.jpg"),
        );
    let response = env
        .client
        .post(format!("{}/", env.base_url()))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(store.put_count(), 1);
    assert_eq!(store.get("beach.jpg").unwrap().data.as_ref(), b"beach");
}

#[tokio::test]
async fn test_concurrent_uploads() {
    let store = Arc::new(MemoryStore::default());
    let env = Arc::new(TestEnv::start(store.clone()).await);

    let mut handles = Vec::new();
    for i in 0..8 {
        let env = Arc::clone(&env);
        handles.push(tokio::spawn(async move {
            env.upload("image", &format!("file-{}.png", i), payload(4096 + i))
                .await
                .status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 200);
    }
    assert_eq!(store.len(), 8);
    assert_eq!(store.get("file-3.png").unwrap().data.len(), 4099);
}
