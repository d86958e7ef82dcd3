//! Common E2E Test Infrastructure
//!
//! Provides shared utilities for E2E tests:
//! - Test server management
//! - In-memory and mock object stores
//! - Multipart form helpers

use async_trait::async_trait;
use bytes::Bytes;
use form_uploadr::config::{
    Config, KeyPolicy, MetricsConfig, ObjectAcl, ServerConfig, StorageConfig, WebConfig,
};
use form_uploadr::s3::{ObjectStore, PutObjectOutput, PutObjectRequest, StorageError};
use form_uploadr::server::{AppState, Server};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

/// Bucket used by every test environment
pub const TEST_BUCKET: &str = "go-test-projects";

pub const SUCCESS_TEXT: &str = "Image was saved successfully";

/// Page template used by the test server
///
/// Messages are wrapped in markers so assertions don't depend on markup.
pub const PAGE_TEMPLATE: &str = r#"<html><body>
{% if success %}<p id="success">{{ success }}</p>{% endif %}
{% if error %}<p id="error">{{ error }}</p>{% endif %}
<form action="/" method="post" enctype="multipart/form-data"><input type="file" name="image"></form>
</body></html>"#;

pub const STYLESHEET: &str = "body { margin: 0; }";

mockall::mock! {
    pub Store {}

    #[async_trait]
    impl ObjectStore for Store {
        async fn put_object(
            &self,
            request: PutObjectRequest,
        ) -> Result<PutObjectOutput, StorageError>;
    }
}

/// Object stored by [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub acl: Option<ObjectAcl>,
}

/// Object store that keeps objects in a map, keyed by `bucket/key`
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    puts: Mutex<usize>,
}

impl MemoryStore {
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", TEST_BUCKET, key))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn put_count(&self) -> usize {
        *self.puts.lock().unwrap()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput, StorageError> {
        let data = request
            .body
            .into_bytes()
            .await
            .map_err(|e| StorageError::BodyError(e.to_string()))?;

        let path = format!("{}/{}", request.bucket, request.key);
        *self.puts.lock().unwrap() += 1;
        self.objects.lock().unwrap().insert(
            path.clone(),
            StoredObject {
                data,
                content_type: request.content_type,
                acl: request.acl,
            },
        );

        Ok(PutObjectOutput {
            location: format!("memory://{}", path),
            etag: Some("\"memory\"".to_string()),
        })
    }
}

/// E2E Test Environment
///
/// Manages the test server and provides utilities for making requests.
/// Dropping it stops the accept loop.
pub struct TestEnv {
    pub server_addr: SocketAddr,
    pub client: reqwest::Client,
    _web_dir: TempDir,
    _shutdown: oneshot::Sender<()>,
}

impl TestEnv {
    /// Start a server backed by `store`
    pub async fn start(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_memory_ceiling(store, 8 << 20).await
    }

    /// Start a server with a custom multipart memory ceiling
    pub async fn with_memory_ceiling(store: Arc<dyn ObjectStore>, memory_ceiling: usize) -> Self {
        let web_dir = tempfile::tempdir().expect("Failed to create web dir");
        let templates = web_dir.path().join("templates");
        let assets = web_dir.path().join("assets");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::create_dir_all(&assets).unwrap();
        std::fs::write(templates.join("index.html"), PAGE_TEMPLATE).unwrap();
        std::fs::write(assets.join("style.css"), STYLESHEET).unwrap();

        let config = Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
                max_multipart_memory: memory_ceiling,
                temp_dir: None,
            },
            storage: StorageConfig {
                bucket: TEST_BUCKET.into(),
                region: Some("us-east-1".into()),
                endpoint: None,
                access_key: None,
                secret_key: None,
                acl: Some(ObjectAcl::PublicRead),
                key_policy: KeyPolicy::Basename,
                force_path_style: false,
            },
            web: WebConfig {
                templates_dir: templates,
                page_template: "index.html".into(),
                assets_dir: Some(assets),
                field_name: "image".into(),
            },
            metrics: MetricsConfig::default(),
        };
        config.validate().expect("Test config should be valid");

        let state = AppState::from_config(&config, store).expect("Failed to build state");
        let server = Server::bind(&config.server.address, state)
            .await
            .expect("Failed to bind test server");
        let server_addr = server.local_addr();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = server
                .run_until(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build client");

        Self {
            server_addr,
            client,
            _web_dir: web_dir,
            _shutdown: shutdown_tx,
        }
    }

    /// Get the base URL for the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.server_addr)
    }

    /// Submit a form with one file part named `field`
    pub async fn upload(
        &self,
        field: &str,
        file_name: &str,
        content: impl Into<Vec<u8>>,
    ) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(content.into())
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .unwrap();
        let form = reqwest::multipart::Form::new().part(field.to_string(), part);

        self.client
            .post(format!("{}/", self.base_url()))
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("GET request failed")
    }
}

/// Generate a deterministic test payload
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}
