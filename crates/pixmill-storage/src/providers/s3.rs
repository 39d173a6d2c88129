//! S3-compatible object storage backend.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::Client;
use bytes::BytesMut;
use futures::stream::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use pixmill_core::config::S3Config;
use pixmill_core::error::{AppError, ErrorKind};
use pixmill_core::result::AppResult;
use pixmill_core::traits::storage::{ByteStream, StorageBackend};

/// S3-compatible storage backend.
///
/// Uses static credentials from configuration. When a custom endpoint is
/// configured (MinIO and friends) path-style addressing is enabled.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    /// Create a new S3 backend from configuration.
    pub async fn new(config: &S3Config) -> AppResult<Self> {
        info!(
            region = %config.region,
            bucket = %config.bucket,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "Initializing S3 storage backend"
        );

        let credentials = Credentials::from_keys(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    /// Object keys always use forward slashes regardless of platform.
    fn key(path: &str) -> String {
        path.replace('\\', "/")
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn backend_type(&self) -> &str {
        "s3"
    }

    async fn open(&self, path: &str) -> AppResult<ByteStream> {
        let key = Self::key(path);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    AppError::not_found(format!("Object not found: {key}"))
                } else {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to get object: {key}"),
                        service,
                    )
                }
            })?;

        Ok(Box::pin(ReaderStream::new(output.body.into_async_read())))
    }

    async fn put(&self, path: &str, mut data: ByteStream, content_type: &str) -> AppResult<u64> {
        let key = Self::key(path);

        // The SDK needs a sized body for a single put, so the stream is
        // buffered before upload.
        let mut buffer = BytesMut::new();
        while let Some(chunk) = data.next().await {
            let chunk = chunk
                .map_err(|e| AppError::with_source(ErrorKind::Storage, "Stream read error", e))?;
            buffer.extend_from_slice(&chunk);
        }
        let total_bytes = buffer.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(AwsByteStream::from(buffer.freeze()))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to put object: {key}"),
                    e.into_service_error(),
                )
            })?;

        debug!(key, bytes = total_bytes, "Uploaded object");
        Ok(total_bytes)
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let key = Self::key(path);
        // S3 DeleteObject succeeds for missing keys, which gives the
        // idempotence the sweeps rely on.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to delete object: {key}"),
                    e.into_service_error(),
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalization() {
        assert_eq!(S3Backend::key("post_picture\\img.webp"), "post_picture/img.webp");
        assert_eq!(S3Backend::key("post_picture/img.webp"), "post_picture/img.webp");
    }
}
