//! Upload request handler
//!
//! Extracts the form file, opens it, and issues exactly one `PutObject`.
//!
//! # Example
//!
//! ```no_run
//! use form_uploadr::config::Config;
//! use form_uploadr::s3::S3Store;
//! use form_uploadr::upload::{UploadHandler, UploadSettings};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let store = Arc::new(S3Store::from_config(&config.storage).await?);
//! let handler = UploadHandler::new(store, UploadSettings::from(&config));
//! # Ok(())
//! # }
//! ```

use super::form::{self, FormLimits};
use super::{object_key, UploadError, UploadOutcome, UploadReceipt};
use crate::config::{Config, KeyPolicy, ObjectAcl};
use crate::metrics;
use crate::s3::{ObjectStore, PutObjectRequest};
use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;
use std::time::Instant;

/// Per-deployment upload settings
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub bucket: String,
    pub acl: Option<ObjectAcl>,
    pub key_policy: KeyPolicy,
    pub field_name: String,
    pub limits: FormLimits,
}

impl From<&Config> for UploadSettings {
    fn from(config: &Config) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            acl: config.storage.acl,
            key_policy: config.storage.key_policy,
            field_name: config.web.field_name.clone(),
            limits: FormLimits {
                memory_ceiling: config.server.max_multipart_memory,
                temp_dir: config.server.temp_dir.clone(),
            },
        }
    }
}

/// Relays form uploads to an [`ObjectStore`]
///
/// Cheap to share: the store is behind an `Arc` and nothing is mutated per
/// request.
pub struct UploadHandler {
    store: Arc<dyn ObjectStore>,
    settings: UploadSettings,
}

impl UploadHandler {
    /// Create a new handler
    pub fn new(store: Arc<dyn ObjectStore>, settings: UploadSettings) -> Self {
        Self { store, settings }
    }

    /// Handle one upload request body
    ///
    /// `content_type` is the request's `Content-Type` header. The returned
    /// error tells which step failed; no object is written on any error path.
    #[tracing::instrument(
        name = "upload.handle",
        skip_all,
        fields(
            s3.bucket = %self.settings.bucket,
            upload.key = tracing::field::Empty,
            upload.bytes = tracing::field::Empty
        )
    )]
    pub async fn handle<S, O, E>(
        &self,
        content_type: Option<&str>,
        body: S,
    ) -> UploadOutcome
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let start_time = Instant::now();
        let result = self.process(content_type, body).await;
        let duration = start_time.elapsed();

        let bucket = self.settings.bucket.as_str();
        metrics::record_upload_duration(bucket, duration.as_secs_f64());

        match result {
            Ok(ref receipt) => {
                metrics::record_upload_success(bucket, receipt.bytes_written);
                tracing::info!(
                    key = %receipt.key,
                    location = %receipt.location,
                    bytes_written = receipt.bytes_written,
                    duration_ms = duration.as_millis(),
                    "File was uploaded"
                );
            }
            Err(ref e) => {
                metrics::record_upload_failure(bucket);
                metrics::record_error(e.kind());
                tracing::warn!(
                    error = %e,
                    duration_ms = duration.as_millis(),
                    "Upload failed"
                );
            }
        }

        result
    }

    async fn process<S, O, E>(
        &self,
        content_type: Option<&str>,
        body: S,
    ) -> Result<UploadReceipt, UploadError>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let boundary = form::boundary(content_type)?;
        let file = form::extract_file(
            body,
            boundary,
            &self.settings.field_name,
            &self.settings.limits,
        )
        .await?;

        tracing::info!(
            file_name = %file.file_name,
            bytes = file.data.len(),
            spilled = file.data.is_spilled(),
            "Received form file"
        );

        let key = object_key(self.settings.key_policy, &file.file_name)?;
        let span = tracing::Span::current();
        span.record("upload.key", key.as_str());
        span.record("upload.bytes", file.data.len());

        // `file` owns any spilled temp file and must outlive the upload
        let body = file.data.open().await.map_err(UploadError::StreamOpen)?;
        let bytes_written = body.len();

        let output = self
            .store
            .put_object(PutObjectRequest {
                bucket: self.settings.bucket.clone(),
                key: key.clone(),
                body,
                content_type: file.content_type.clone(),
                acl: self.settings.acl,
            })
            .await?;

        Ok(UploadReceipt {
            key,
            location: output.location,
            etag: output.etag,
            bytes_written,
        })
    }
}
