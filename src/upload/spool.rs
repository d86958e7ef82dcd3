//! Spooled upload buffer
//!
//! Keeps a form file in memory until it grows past the configured ceiling,
//! then moves it to a temporary file and keeps appending there.
//!
//! # Flow
//!
//! 1. Append incoming chunks with [`SpoolWriter::write`]
//! 2. Seal the buffer with [`SpoolWriter::finish`]
//! 3. Open a readable [`ObjectBody`] with [`SpooledFile::open`]
//!
//! The temporary file is removed when the [`SpooledFile`] is dropped.
//!
//! # Example
//!
//! ```no_run
//! use form_uploadr::upload::spool::SpoolWriter;
//!
//! # async fn example() -> std::io::Result<()> {
//! let mut writer = SpoolWriter::new(8 << 20, None);
//! writer.write(b"Hello, World!").await?;
//! let spooled = writer.finish().await?;
//!
//! assert!(!spooled.is_spilled());
//! let body = spooled.open().await?;
//! assert_eq!(body.len(), 13);
//! # Ok(())
//! # }
//! ```

use crate::s3::ObjectBody;
use bytes::{Bytes, BytesMut};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Prefix of spilled temp files
const TEMP_PREFIX: &str = "form-uploadr-";

enum Buffer {
    Memory(BytesMut),
    Disk {
        file: tokio::fs::File,
        path: TempPath,
    },
}

/// Accumulates a single form file
pub struct SpoolWriter {
    threshold: usize,
    temp_dir: Option<PathBuf>,
    buffer: Buffer,
    len: u64,
}

impl SpoolWriter {
    /// Create a writer that spills once more than `threshold` bytes are written
    pub fn new(threshold: usize, temp_dir: Option<PathBuf>) -> Self {
        Self {
            threshold,
            temp_dir,
            buffer: Buffer::Memory(BytesMut::new()),
            len: 0,
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a chunk, spilling to disk if the ceiling is crossed
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let over_ceiling = matches!(
            self.buffer,
            Buffer::Memory(ref memory) if memory.len() + chunk.len() > self.threshold
        );
        if over_ceiling {
            self.spill().await?;
        }

        match self.buffer {
            Buffer::Memory(ref mut memory) => memory.extend_from_slice(chunk),
            Buffer::Disk { ref mut file, .. } => file.write_all(chunk).await?,
        }

        self.len += chunk.len() as u64;
        Ok(())
    }

    /// Seal the buffer
    pub async fn finish(self) -> io::Result<SpooledFile> {
        match self.buffer {
            Buffer::Memory(memory) => Ok(SpooledFile::Memory(memory.freeze())),
            Buffer::Disk { mut file, path } => {
                file.flush().await?;
                Ok(SpooledFile::Disk {
                    path,
                    len: self.len,
                })
            }
        }
    }

    async fn spill(&mut self) -> io::Result<()> {
        let temp_dir = self.temp_dir.clone();
        let named = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(TEMP_PREFIX).suffix(".part");
            match temp_dir {
                Some(dir) => builder.tempfile_in(dir),
                None => builder.tempfile(),
            }
        })
        .await
        .map_err(io::Error::other)??;

        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        if let Buffer::Memory(ref memory) = self.buffer {
            file.write_all(memory).await?;
        }

        tracing::debug!(
            path = %path.display(),
            buffered = self.len,
            threshold = self.threshold,
            "Form file exceeded memory ceiling, spilling to disk"
        );

        self.buffer = Buffer::Disk { file, path };
        Ok(())
    }
}

/// A fully received form file
pub enum SpooledFile {
    Memory(Bytes),
    Disk { path: TempPath, len: u64 },
}

impl SpooledFile {
    /// Size in bytes
    pub fn len(&self) -> u64 {
        match self {
            SpooledFile::Memory(bytes) => bytes.len() as u64,
            SpooledFile::Disk { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the payload went to a temporary file
    pub fn is_spilled(&self) -> bool {
        matches!(self, SpooledFile::Disk { .. })
    }

    /// Path of the temporary file, if spilled
    pub fn path(&self) -> Option<&Path> {
        match self {
            SpooledFile::Memory(_) => None,
            SpooledFile::Disk { path, .. } => Some(path.as_ref()),
        }
    }

    /// Open a fresh readable body over the payload
    pub async fn open(&self) -> io::Result<ObjectBody> {
        match self {
            SpooledFile::Memory(bytes) => Ok(ObjectBody::Memory(bytes.clone())),
            SpooledFile::Disk { path, len } => {
                let file = tokio::fs::File::open(path).await?;
                Ok(ObjectBody::File { file, len: *len })
            }
        }
    }
}

impl std::fmt::Debug for SpooledFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpooledFile::Memory(bytes) => f
                .debug_struct("SpooledFile::Memory")
                .field("len", &bytes.len())
                .finish(),
            SpooledFile::Disk { path, len } => f
                .debug_struct("SpooledFile::Disk")
                .field("path", &path.display())
                .field("len", len)
                .finish(),
        }
    }
}
