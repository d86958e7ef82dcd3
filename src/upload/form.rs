//! Multipart form extraction
//!
//! Pulls one named file field out of a `multipart/form-data` body and spools
//! it through [`SpoolWriter`], so files above the memory ceiling land in a
//! temporary file instead of being rejected.

use super::spool::{SpoolWriter, SpooledFile};
use bytes::Bytes;
use futures::Stream;
use multer::Multipart;
use std::path::PathBuf;
use thiserror::Error;

/// Form parsing errors
#[derive(Error, Debug)]
pub enum FormError {
    #[error("Not a multipart/form-data request: {0}")]
    NotMultipart(String),

    #[error("Missing file field '{0}'")]
    MissingField(String),

    #[error("Malformed multipart body: {0}")]
    Malformed(#[from] multer::Error),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Failed to buffer form file: {0}")]
    Spool(#[from] std::io::Error),
}

/// Buffering limits for form files
#[derive(Debug, Clone)]
pub struct FormLimits {
    /// Bytes kept in memory before spilling to disk
    pub memory_ceiling: usize,
    pub temp_dir: Option<PathBuf>,
}

/// A file extracted from a multipart form
#[derive(Debug)]
pub struct FormFile {
    /// Declared file name, as sent by the client
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: SpooledFile,
}

/// Extract the multipart boundary from a `Content-Type` header value
pub fn boundary(content_type: Option<&str>) -> Result<String, FormError> {
    let content_type =
        content_type.ok_or_else(|| FormError::NotMultipart("missing Content-Type".into()))?;
    multer::parse_boundary(content_type).map_err(|e| FormError::NotMultipart(e.to_string()))
}

/// Read the body until the first file part named `field_name` is fully spooled
///
/// Parts with another name, and parts without a file name, are skipped. An
/// empty `filename=""` counts as no file, which is what browsers send when
/// nothing was selected.
pub async fn extract_file<S, O, E>(
    body: S,
    boundary: String,
    field_name: &str,
    limits: &FormLimits,
) -> Result<FormFile, FormError>
where
    S: Stream<Item = Result<O, E>> + Send + 'static,
    O: Into<Bytes> + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let mut multipart = Multipart::new(body, boundary);

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(field_name) {
            continue;
        }
        let Some(file_name) = field.file_name().filter(|n| !n.is_empty()) else {
            continue;
        };

        let file_name = file_name.to_string();
        let content_type = field.content_type().map(|m| m.to_string());

        let mut writer = SpoolWriter::new(limits.memory_ceiling, limits.temp_dir.clone());
        while let Some(chunk) = field.chunk().await? {
            writer.write(&chunk).await?;
        }

        let data = writer.finish().await?;
        tracing::debug!(
            file_name = %file_name,
            bytes = data.len(),
            spilled = data.is_spilled(),
            "Extracted form file"
        );

        return Ok(FormFile {
            file_name,
            content_type,
            data,
        });
    }

    Err(FormError::MissingField(field_name.to_string()))
}
