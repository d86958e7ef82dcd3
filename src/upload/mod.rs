//! Upload module
//!
//! Relays a single multipart form file to object storage.
//!
//! A request moves through `Received → Parsed → Opened → Uploaded`, and any
//! step can end it with an [`UploadError`]. Nothing is retried.

use crate::config::KeyPolicy;
use thiserror::Error;

pub mod form;
pub mod handler;
pub mod spool;

pub use form::{FormError, FormFile, FormLimits};
pub use handler::{UploadHandler, UploadSettings};

/// Message shown after a successful upload
pub const SUCCESS_MESSAGE: &str = "Image was saved successfully";

/// Upload errors
///
/// Every variant maps to a `400 Bad Request` page. The page only ever shows
/// [`UploadError::user_message`]; the source error goes to the logs.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Form parse error: {0}")]
    FormParse(#[from] FormError),

    #[error("Failed to open uploaded file: {0}")]
    StreamOpen(#[source] std::io::Error),

    #[error("Storage upload failed: {0}")]
    Upload(#[from] crate::s3::StorageError),
}

impl UploadError {
    /// Message rendered on the error page
    pub fn user_message(&self) -> &'static str {
        match self {
            UploadError::FormParse(_) => "Failed to upload file",
            UploadError::StreamOpen(_) => "Failed to open file",
            UploadError::Upload(_) => "Failed to upload file to aws",
        }
    }

    /// Short label used in metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::FormParse(_) => "form_parse",
            UploadError::StreamOpen(_) => "stream_open",
            UploadError::Upload(_) => "upload",
        }
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub key: String,
    pub location: String,
    pub etag: Option<String>,
    pub bytes_written: u64,
}

/// Result of one upload request
pub type UploadOutcome = Result<UploadReceipt, UploadError>;

/// Derive the object key from a declared file name
///
/// Existing objects under the same key are overwritten; no uniqueness suffix
/// is added under either policy.
pub fn object_key(policy: KeyPolicy, file_name: &str) -> Result<String, FormError> {
    let key = match policy {
        KeyPolicy::Verbatim => file_name,
        KeyPolicy::Basename => file_name.rsplit(['/', '\\']).next().unwrap_or_default(),
    };

    if key.is_empty() || key == "." || key == ".." {
        return Err(FormError::InvalidFileName(file_name.to_string()));
    }

    Ok(key.to_string())
}
