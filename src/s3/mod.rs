//! Object storage module
//!
//! Defines the [`ObjectStore`] seam the upload handler talks to and its
//! production implementation, [`S3Store`], backed by the AWS SDK.
//!
//! # Example
//!
//! ```no_run
//! use form_uploadr::config::Config;
//! use form_uploadr::s3::{ObjectBody, ObjectStore, PutObjectRequest, S3Store};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let store = S3Store::from_config(&config.storage).await?;
//!
//! let output = store
//!     .put_object(PutObjectRequest {
//!         bucket: config.storage.bucket.clone(),
//!         key: "hello.txt".into(),
//!         body: ObjectBody::Memory(Bytes::from("Hello, World!")),
//!         content_type: Some("text/plain".into()),
//!         acl: config.storage.acl,
//!     })
//!     .await?;
//! println!("Stored at {}", output.location);
//! # Ok(())
//! # }
//! ```

pub mod credentials;

use crate::config::{ConfigError, ObjectAcl, StorageConfig};
use async_trait::async_trait;
use aws_sdk_s3::config::RequestChecksumCalculation;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_config::SdkConfig;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Characters left as-is when a key is placed in a URL path
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Body error: {0}")]
    BodyError(String),

    #[error("Request error: {0}")]
    RequestError(String),
}

/// An opened upload payload, ready to be streamed to storage
#[derive(Debug)]
pub enum ObjectBody {
    /// Payload held in memory
    Memory(Bytes),
    /// Payload streamed from a file on disk
    File { file: tokio::fs::File, len: u64 },
}

impl ObjectBody {
    /// Payload size in bytes
    pub fn len(&self) -> u64 {
        match self {
            ObjectBody::Memory(bytes) => bytes.len() as u64,
            ObjectBody::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the whole payload into memory
    ///
    /// Intended for in-process stores and tests; [`S3Store`] streams instead.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            ObjectBody::Memory(bytes) => Ok(bytes),
            ObjectBody::File { mut file, len } => {
                let mut buffer = Vec::with_capacity(len as usize);
                file.read_to_end(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

/// A single object write
#[derive(Debug)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: ObjectBody,
    pub content_type: Option<String>,
    pub acl: Option<ObjectAcl>,
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq)]
pub struct PutObjectOutput {
    /// URL of the stored object
    pub location: String,
    pub etag: Option<String>,
}

/// Storage client used by the upload handler
///
/// One instance is built at startup and shared by every request, so
/// implementations must be safe for concurrent use.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write one object, overwriting any existing object under the same key
    async fn put_object(&self, request: PutObjectRequest)
        -> Result<PutObjectOutput, StorageError>;
}

/// Build the public URL of an object
pub fn object_url(
    endpoint: Option<&str>,
    region: &str,
    bucket: &str,
    key: &str,
    force_path_style: bool,
) -> String {
    let key = utf8_percent_encode(key, KEY_ENCODE_SET);

    match endpoint.map(|e| e.trim_end_matches('/')) {
        Some(endpoint) if force_path_style => format!("{}/{}/{}", endpoint, bucket, key),
        Some(endpoint) => match endpoint.split_once("://") {
            Some((scheme, host)) => format!("{}://{}.{}/{}", scheme, bucket, host, key),
            None => format!("{}/{}/{}", endpoint, bucket, key),
        },
        None if force_path_style => {
            format!("https://s3.{}.amazonaws.com/{}/{}", region, bucket, key)
        }
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

/// S3-backed object store
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    region: String,
    endpoint: Option<String>,
    force_path_style: bool,
}

impl S3Store {
    /// Build a store from configuration, resolving credentials eagerly
    pub async fn from_config(config: &StorageConfig) -> Result<Self, ConfigError> {
        let sdk_config = credentials::load_sdk_config(config).await?;
        Ok(Self::from_sdk_config(&sdk_config, config))
    }

    /// Build a store from an already loaded SDK configuration
    pub fn from_sdk_config(sdk_config: &SdkConfig, config: &StorageConfig) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(config.force_path_style)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);

        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let region = sdk_config
            .region()
            .map(|r| r.as_ref().to_string())
            .or_else(|| config.region.clone())
            .unwrap_or_else(|| "us-east-1".to_string());

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            region,
            endpoint: config.endpoint.clone(),
            force_path_style: config.force_path_style,
        }
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the endpoint override, if any
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, request),
        fields(
            s3.bucket = %request.bucket,
            s3.key = %request.key,
            http.method = "PUT",
            upload.bytes = request.body.len(),
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn put_object(
        &self,
        request: PutObjectRequest,
    ) -> Result<PutObjectOutput, StorageError> {
        let PutObjectRequest {
            bucket,
            key,
            body,
            content_type,
            acl,
        } = request;

        let content_length = i64::try_from(body.len())
            .map_err(|_| StorageError::BodyError("payload too large".into()))?;

        let stream = match body {
            ObjectBody::Memory(bytes) => ByteStream::from(bytes),
            ObjectBody::File { file, .. } => ByteStream::read_from()
                .file(file)
                .build()
                .await
                .map_err(|e| StorageError::BodyError(e.to_string()))?,
        };

        let mut call = self
            .client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .content_length(content_length)
            .body(stream);

        if let Some(content_type) = content_type {
            call = call.content_type(content_type);
        }
        if let Some(acl) = acl {
            call = call.acl(ObjectCannedAcl::from(acl.as_str()));
        }

        let output = call
            .send()
            .await
            .map_err(|e| StorageError::RequestError(DisplayErrorContext(&e).to_string()))?;

        let etag = output.e_tag().map(str::to_string);
        if let Some(ref etag) = etag {
            tracing::Span::current().record("s3.etag", etag.as_str());
        }

        Ok(PutObjectOutput {
            location: object_url(
                self.endpoint.as_deref(),
                &self.region,
                &bucket,
                &key,
                self.force_path_style,
            ),
            etag,
        })
    }
}
