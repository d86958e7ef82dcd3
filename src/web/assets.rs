//! Static asset serving for `/assets/*`

use bytes::Bytes;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Serves files from a base directory
#[derive(Debug, Clone)]
pub struct StaticAssets {
    base_dir: PathBuf,
}

impl StaticAssets {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    /// Map a URL path to a file path, refusing anything that leaves the base directory
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "html" => "text/html; charset=utf-8",
            "css" => "text/css",
            "js" => "application/javascript",
            "json" => "application/json",
            "txt" => "text/plain",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "ico" => "image/x-icon",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        }
    }

    /// Load an asset by its path relative to the assets directory
    pub async fn load(&self, url_path: &str) -> io::Result<(Bytes, &'static str)> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;

        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a file"));
        }

        let bytes = tokio::fs::read(&path).await?;
        Ok((Bytes::from(bytes), Self::content_type(&path)))
    }
}
