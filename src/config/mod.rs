//! Configuration module for Form Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion, environment overrides and validation.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::{expand_env_vars, ConfigProvider, FileConfigProvider, StaticConfigProvider};

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
///
/// Every variant is fatal: the process does not start serving.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Failed to obtain cloud credentials: {0}")]
    CredentialsError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        FileConfigProvider::new(path.as_ref()).load()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .address
            .parse::<SocketAddr>()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid server address '{}': {}",
                    self.server.address, e
                ))
            })?;

        if self.server.max_multipart_memory == 0 {
            return Err(ConfigError::ValidationError(
                "max_multipart_memory must be greater than zero".into(),
            ));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.bucket cannot be empty".into(),
            ));
        }

        if let Some(ref region) = self.storage.region {
            if region.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "storage.region cannot be empty when set".into(),
                ));
            }
        }

        if let Some(ref endpoint) = self.storage.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid storage endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        match (&self.storage.access_key, &self.storage.secret_key) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::ValidationError(
                    "storage.access_key and storage.secret_key must be set together".into(),
                ))
            }
            _ => {}
        }

        if self.web.field_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "web.field_name cannot be empty".into(),
            ));
        }

        if self.metrics.enabled {
            self.metrics.address.parse::<SocketAddr>().map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid metrics address '{}': {}",
                    self.metrics.address, e
                ))
            })?;
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Bytes of a form file kept in memory before it spills to a temp file
    #[serde(default = "default_max_multipart_memory")]
    pub max_multipart_memory: usize,
    /// Directory for spilled uploads. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            max_multipart_memory: default_max_multipart_memory(),
            temp_dir: None,
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_multipart_memory() -> usize {
    8 << 20 // 8 MiB
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    /// Falls back to the AWS region provider chain when unset
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Canned ACL applied to every object. `null` sends no ACL header.
    #[serde(default = "default_acl")]
    pub acl: Option<ObjectAcl>,
    #[serde(default)]
    pub key_policy: KeyPolicy,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_acl() -> Option<ObjectAcl> {
    Some(ObjectAcl::PublicRead)
}

/// Canned object ACLs understood by S3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl ObjectAcl {
    /// Wire value of the `x-amz-acl` header
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectAcl::Private => "private",
            ObjectAcl::PublicRead => "public-read",
            ObjectAcl::PublicReadWrite => "public-read-write",
            ObjectAcl::AuthenticatedRead => "authenticated-read",
            ObjectAcl::BucketOwnerRead => "bucket-owner-read",
            ObjectAcl::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

/// How the uploaded file name becomes an object key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Use the declared file name unmodified
    Verbatim,
    /// Keep only the last path component of the declared file name
    #[default]
    Basename,
}

/// Page rendering and form configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_page_template")]
    pub page_template: String,
    /// Served under `/assets/`. Disabled when unset.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: Option<PathBuf>,
    #[serde(default = "default_field_name")]
    pub field_name: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            page_template: default_page_template(),
            assets_dir: default_assets_dir(),
            field_name: default_field_name(),
        }
    }
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_page_template() -> String {
    "index.html".to_string()
}

fn default_assets_dir() -> Option<PathBuf> {
    Some(PathBuf::from("assets"))
}

fn default_field_name() -> String {
    "image".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}
