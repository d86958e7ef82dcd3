//! S3 Credentials Module
//!
//! Resolves the AWS SDK configuration used by [`S3Store`](super::S3Store).
//!
//! Static keys from the configuration file win. Without them the AWS default
//! provider chain is used (environment, shared profile, container and
//! instance metadata). Either way credentials are resolved once at startup so
//! that a missing or broken credential source stops the process before it
//! starts serving.

use crate::config::{ConfigError, StorageConfig};
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use tracing::{debug, info};

/// Provider name reported by the SDK for keys taken from the config file
pub const STATIC_PROVIDER_NAME: &str = "form-uploadr-config";

/// Build static credentials from the storage configuration, if both keys are set
pub fn static_credentials(config: &StorageConfig) -> Option<Credentials> {
    match (&config.access_key, &config.secret_key) {
        (Some(access_key), Some(secret_key)) => Some(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            STATIC_PROVIDER_NAME,
        )),
        _ => None,
    }
}

/// Source name logged when the AWS default provider chain is used
pub const DEFAULT_CHAIN_NAME: &str = "default-chain";

/// Name of the credential source `load_sdk_config` will use
pub fn credential_source(config: &StorageConfig) -> &'static str {
    match static_credentials(config) {
        Some(_) => STATIC_PROVIDER_NAME,
        None => DEFAULT_CHAIN_NAME,
    }
}

/// Load the shared SDK configuration and verify credentials can be obtained
///
/// SDK-level retries are disabled: a failed upload is reported to the user
/// right away.
pub async fn load_sdk_config(config: &StorageConfig) -> Result<SdkConfig, ConfigError> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::disabled());

    if let Some(ref region) = config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    match static_credentials(config) {
        Some(credentials) => {
            debug!("Using static credentials from configuration");
            loader = loader.credentials_provider(credentials);
        }
        None => debug!("Using the AWS default credentials provider chain"),
    }

    let sdk_config = loader.load().await;

    let region = sdk_config.region().ok_or_else(|| {
        ConfigError::CredentialsError(
            "no region configured (set storage.region or AWS_REGION)".into(),
        )
    })?;

    let provider = sdk_config.credentials_provider().ok_or_else(|| {
        ConfigError::CredentialsError("no credentials provider available".into())
    })?;

    provider
        .provide_credentials()
        .await
        .map_err(|e| ConfigError::CredentialsError(e.to_string()))?;

    info!(
        region = %region,
        credentials.source = credential_source(config),
        "Resolved AWS credentials"
    );

    Ok(sdk_config)
}
