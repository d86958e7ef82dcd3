//! Form Uploadr Library
//!
//! Serves an HTML upload form and relays the submitted file to an S3 bucket.
//!
//! # Features
//!
//! - **Single File**: One multipart field per request, stored under its file name
//! - **Bounded Memory**: Large files spill to a temporary file before upload
//! - **S3 Compatible**: AWS S3 or any endpoint that speaks `PutObject`
//! - **Templated Pages**: Success and error pages rendered from Jinja templates
//!
//! # Example
//!
//! ```no_run
//! use form_uploadr::{config::Config, s3::S3Store, server::{AppState, Server}};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let store = Arc::new(S3Store::from_config(&config.storage).await?);
//!     let state = AppState::from_config(&config, store)?;
//!     Server::bind(&config.server.address, state).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod s3;
pub mod server;
pub mod upload;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use server::{AppState, Server};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
