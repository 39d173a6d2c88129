//! Local filesystem storage backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use pixmill_core::error::{AppError, ErrorKind};
use pixmill_core::result::AppResult;
use pixmill_core::traits::storage::{ByteStream, StorageBackend};

/// Local filesystem storage backend.
///
/// Paths are resolved relative to the configured root; the kind folders
/// from configuration become plain directories underneath it.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Root directory for all stored files.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local backend rooted at the given path.
    pub async fn new(root_path: &str) -> AppResult<Self> {
        let root = PathBuf::from(root_path);
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Resolve a relative path to an absolute path within the root.
    fn resolve(&self, path: &str) -> PathBuf {
        let clean = path.trim_start_matches('/');
        self.root.join(clean)
    }

    /// Ensure the parent directory of a path exists.
    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn backend_type(&self) -> &str {
        "local"
    }

    async fn open(&self, path: &str) -> AppResult<ByteStream> {
        let full_path = self.resolve(path);
        let file = fs::File::open(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("File not found: {path}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to open file: {path}"),
                    e,
                )
            }
        })?;

        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn put(&self, path: &str, mut data: ByteStream, _content_type: &str) -> AppResult<u64> {
        let full_path = self.resolve(path);
        self.ensure_parent(&full_path).await?;

        let mut file = fs::File::create(&full_path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create file: {path}"),
                e,
            )
        })?;

        // A copy error must win over any subsequent close error, so write
        // failures return before the flush below.
        let mut total_bytes = 0u64;
        while let Some(chunk) = data.next().await {
            let chunk = chunk
                .map_err(|e| AppError::with_source(ErrorKind::Storage, "Stream read error", e))?;
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to write chunk", e)
            })?;
        }

        file.flush()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to flush file", e))?;

        debug!(path, bytes = total_bytes, "Wrote file from stream");
        Ok(total_bytes)
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let full_path = self.resolve(path);
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path, "Local file already absent on delete");
                Ok(())
            }
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete file: {path}"),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pixmill_core::traits::storage::stream_from_bytes;

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_put_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap();

        let data = Bytes::from("hello world");
        let written = backend
            .put("images/test.webp", stream_from_bytes(data.clone()), "image/webp")
            .await
            .unwrap();
        assert_eq!(written, data.len() as u64);

        let read_back = collect(backend.open("images/test.webp").await.unwrap()).await;
        assert_eq!(read_back, data);
    }

    #[tokio::test]
    async fn test_put_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap();

        backend
            .put("a/b/c/deep.bin", stream_from_bytes(Bytes::from_static(b"x")), "application/octet-stream")
            .await
            .unwrap();

        assert!(dir.path().join("a/b/c/deep.bin").is_file());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap();

        backend
            .put("gone.txt", stream_from_bytes(Bytes::from_static(b"bye")), "text/plain")
            .await
            .unwrap();

        backend.delete("gone.txt").await.unwrap();
        // Second delete of the now-missing object must also succeed.
        backend.delete("gone.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap();

        let err = backend.open("nope.jpg").await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
