//! Compression service: claims pending tasks under a row lease, runs
//! them through the pipeline (or sequentially), and commits each outcome.

use std::sync::Arc;

use bytes::BytesMut;
use futures::stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pixmill_core::config::{CompressionConfig, KindFolders};
use pixmill_core::result::AppResult;
use pixmill_core::traits::storage::StorageBackend;
use pixmill_core::AppError;
use pixmill_database::repositories::{FailureOutcome, FileRepository};
use pixmill_entity::{FileKind, FileRecord};

use crate::image::ImageProcessor;
use crate::metrics::RunMetrics;
use crate::pipeline::{upload_with_cleanup, Pipeline};

/// Longest error message persisted before truncation; the column holds 255.
const MAX_ERROR_LEN: usize = 250;

/// The compression service.
pub struct CompressionService {
    files: FileRepository,
    storage: Arc<dyn StorageBackend>,
    processor: Arc<ImageProcessor>,
    folders: KindFolders,
    config: CompressionConfig,
}

impl CompressionService {
    /// Create a new compression service.
    pub fn new(
        files: FileRepository,
        storage: Arc<dyn StorageBackend>,
        config: CompressionConfig,
        folders: KindFolders,
    ) -> Self {
        Self {
            files,
            storage,
            processor: Arc::new(ImageProcessor::new(&config)),
            folders,
            config,
        }
    }

    /// Run one compression batch. Claims up to `batch_size` pending tasks,
    /// processes them, and commits every outcome before returning.
    pub async fn run(&self, cancel: CancellationToken) {
        let mode = if self.config.concurrent {
            "concurrent (pipeline)"
        } else {
            "sequential"
        };
        info!(mode, batch_size = self.config.batch_size, "Compression run started");

        let tasks = match self
            .files
            .claim_pending(
                self.config.batch_size,
                self.config.max_retries,
                !self.config.test_mode,
            )
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to fetch compression tasks");
                return;
            }
        };

        if tasks.is_empty() {
            info!("No pending compression tasks");
            return;
        }

        if self.config.test_mode {
            info!(count = tasks.len(), "Found tasks to process");
        } else {
            info!(count = tasks.len(), "Found and leased tasks to process");
        }

        let metrics = RunMetrics::start();

        let (succeeded, failed) = if self.config.concurrent {
            self.run_pipeline(tasks, &cancel).await
        } else {
            self.run_sequential(tasks, &cancel).await
        };

        metrics.finish().await;
        info!(succeeded, failed, "Compression run finished");
    }

    async fn run_pipeline(&self, tasks: Vec<FileRecord>, cancel: &CancellationToken) -> (u64, u64) {
        let pipeline = Pipeline::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.processor),
            self.folders.clone(),
            self.config.io_workers(),
            self.config.cpu_workers(),
            self.config.test_mode,
        );

        let expected = tasks.len();
        let mut results = pipeline.run(tasks, cancel.clone());

        let mut succeeded = 0u64;
        let mut failed = 0u64;
        while let Some(outcome) = results.recv().await {
            match outcome.result {
                Ok(()) => {
                    succeeded += 1;
                    self.handle_success(&outcome.task).await;
                }
                Err(e) => {
                    failed += 1;
                    self.handle_failure(&outcome.task, &e).await;
                }
            }
        }

        let committed = (succeeded + failed) as usize;
        if committed < expected {
            warn!(
                committed,
                expected,
                "Partial batch: cancelled tasks keep their lease until the janitor rescues them"
            );
        }
        (succeeded, failed)
    }

    async fn run_sequential(&self, tasks: Vec<FileRecord>, cancel: &CancellationToken) -> (u64, u64) {
        let mut succeeded = 0u64;
        let mut failed = 0u64;

        for task in tasks {
            if cancel.is_cancelled() {
                info!(succeeded, failed, "Sequential run cancelled by shutdown; partial results");
                return (succeeded, failed);
            }

            debug!(mode = "sequential", file_name = %task.name, "Processing file");
            match self.execute_task(&task, cancel).await {
                Ok(()) => {
                    succeeded += 1;
                    self.handle_success(&task).await;
                }
                Err(e) => {
                    failed += 1;
                    error!(file = %task.name, error = %e, "Failed to process file");
                    self.handle_failure(&task, &e).await;
                }
            }
        }

        (succeeded, failed)
    }

    /// The full read → process → write sequence for one task, used by the
    /// sequential mode.
    async fn execute_task(&self, task: &FileRecord, cancel: &CancellationToken) -> AppResult<()> {
        let source_path = resolve_path(&self.folders, task.kind, &task.name);
        let mut stream = self
            .storage
            .open(&source_path)
            .await
            .map_err(|e| AppError::storage(format!("failed to open source ({source_path}): {e}")))?;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(AppError::from)?;
            buffer.extend_from_slice(&chunk);
        }
        let data = buffer.freeze();

        let processor = Arc::clone(&self.processor);
        let encoded = tokio::task::spawn_blocking(move || processor.process(&data))
            .await
            .map_err(|e| {
                AppError::with_source(
                    pixmill_core::error::ErrorKind::Internal,
                    "Processor task panicked",
                    e,
                )
            })??;

        if self.config.test_mode {
            debug!(
                file_name = %task.name,
                size_bytes = encoded.len(),
                "TEST MODE: simulated success, derivative not persisted"
            );
            return Ok(());
        }

        let destination = resolve_path(&self.folders, task.kind, &task.webp_name());
        upload_with_cleanup(&self.storage, &destination, encoded.into(), cancel).await
    }

    /// Commit a success: rename to the derivative and enqueue the original
    /// for deletion, atomically.
    async fn handle_success(&self, task: &FileRecord) {
        if self.config.test_mode {
            debug!(task_id = task.id, "TEST MODE: skipping success commit");
            return;
        }

        let new_name = task.webp_name();
        let source_path = resolve_path(&self.folders, task.kind, &task.name);

        if let Err(e) = self
            .files
            .mark_compressed(task.id, &new_name, &source_path)
            .await
        {
            // The derivative exists but the record still says pending; the
            // next run reprocesses and overwrites it by name.
            error!(task_id = task.id, error = %e, "CRITICAL: success transaction failed");
        }
    }

    /// Commit a failure: requeue below the retry ceiling, dead-letter at it.
    async fn handle_failure(&self, task: &FileRecord, err: &AppError) {
        if self.config.test_mode {
            error!(error = %err, "TEST MODE: simulated failure, skipping commit");
            return;
        }

        if err.is_cancelled() {
            // Not a real error: leave the lease in place and let the
            // janitor return the row to pending without burning an attempt.
            warn!(task_id = task.id, "Task interrupted by shutdown; janitor will requeue it");
            return;
        }

        let message = truncate_error(&err.to_string());
        match self
            .files
            .record_failure(task.id, task.failed_attempts, self.config.max_retries, &message)
            .await
        {
            Ok(FailureOutcome::DeadLettered) => {
                error!(file = %task.name, "Task failed permanently, moved to dead-letter queue");
            }
            Ok(FailureOutcome::Requeued) => {
                warn!(
                    file = %task.name,
                    attempts = task.failed_attempts + 1,
                    "Task failed, will retry on a later run"
                );
            }
            Err(e) => {
                error!(task_id = task.id, error = %e, "Failed to commit task failure");
            }
        }
    }
}

/// Compute the storage path for a file: `<kind folder>/<name>`. Unknown
/// kinds fall back to the attachment folder.
pub(crate) fn resolve_path(folders: &KindFolders, kind: FileKind, name: &str) -> String {
    let folder = match kind {
        FileKind::Attachment => &folders.attachment,
        FileKind::Profile => &folders.profile,
        FileKind::Thumbnail => &folders.thumbnail,
    };
    format!("{folder}/{name}")
}

/// Truncate an error message to fit the 255-character column, appending
/// an ellipsis when it was cut.
pub(crate) fn truncate_error(message: &str) -> String {
    if message.chars().count() > MAX_ERROR_LEN {
        let truncated: String = message.chars().take(MAX_ERROR_LEN).collect();
        format!("{truncated}...")
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folders() -> KindFolders {
        KindFolders {
            attachment: "post_picture".into(),
            profile: "profile_picture".into(),
            thumbnail: "thumbnail".into(),
        }
    }

    #[test]
    fn test_resolve_path_per_kind() {
        let f = folders();
        assert_eq!(
            resolve_path(&f, FileKind::Attachment, "a.png"),
            "post_picture/a.png"
        );
        assert_eq!(
            resolve_path(&f, FileKind::Profile, "b.jpg"),
            "profile_picture/b.jpg"
        );
        assert_eq!(
            resolve_path(&f, FileKind::Thumbnail, "c.webp"),
            "thumbnail/c.webp"
        );
    }

    #[test]
    fn test_truncate_error_short_message_untouched() {
        assert_eq!(truncate_error("small"), "small");
    }

    #[test]
    fn test_truncate_error_long_message() {
        let long = "x".repeat(400);
        let out = truncate_error(&long);
        assert_eq!(out.chars().count(), MAX_ERROR_LEN + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_error_respects_char_boundaries() {
        let long = "é".repeat(300);
        let out = truncate_error(&long);
        assert_eq!(out.chars().count(), MAX_ERROR_LEN + 3);
    }
}
