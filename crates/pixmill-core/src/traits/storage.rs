//! Storage backend trait for pluggable object storage.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::result::AppResult;

/// A byte stream type used for reading and writing object contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn stream_from_bytes(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Trait for object storage backends.
///
/// Implementations exist for the local filesystem and S3-compatible
/// object stores. The trait is defined here in `pixmill-core` and
/// implemented in `pixmill-storage`; the reconciliation sweeps depend
/// only on the [`delete`](StorageBackend::delete) capability.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Return the backend type name (e.g., "local", "s3").
    fn backend_type(&self) -> &str;

    /// Open an object and return its byte stream. Dropping the stream
    /// releases the underlying handle.
    async fn open(&self, path: &str) -> AppResult<ByteStream>;

    /// Write a byte stream to the given path, creating any missing parent
    /// container, and record the content type where the backend supports
    /// it. Returns the number of bytes written.
    async fn put(&self, path: &str, data: ByteStream, content_type: &str) -> AppResult<u64>;

    /// Delete the object at the given path.
    ///
    /// Idempotent: deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> AppResult<()>;
}
