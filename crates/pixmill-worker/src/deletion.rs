//! Deletion queue worker: physically removes source files whose
//! compressed derivative has been committed.

use std::sync::Arc;

use tracing::{error, info};

use pixmill_core::config::DeletionQueueConfig;
use pixmill_core::traits::storage::StorageBackend;
use pixmill_database::repositories::DeletionQueueRepository;

use crate::compressor::truncate_error;

/// Drains the `source_files_to_delete` queue.
///
/// Entries are independent: each gets its own storage delete and its own
/// row update, and a failure never aborts the sweep. The storage backend
/// treats a missing object as a successful delete, so entries for
/// already-gone originals drain cleanly.
pub struct DeletionQueueService {
    queue: DeletionQueueRepository,
    storage: Arc<dyn StorageBackend>,
    config: DeletionQueueConfig,
}

impl DeletionQueueService {
    /// Create a new deletion queue service.
    pub fn new(
        queue: DeletionQueueRepository,
        storage: Arc<dyn StorageBackend>,
        config: DeletionQueueConfig,
    ) -> Self {
        Self {
            queue,
            storage,
            config,
        }
    }

    /// Run one sweep over the queue.
    pub async fn run(&self) {
        info!(batch_size = self.config.batch_size, "Deletion queue worker started");

        let entries = match self
            .queue
            .due_entries(self.config.batch_size, self.config.max_retries)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Deletion queue: failed to fetch entries");
                return;
            }
        };

        if entries.is_empty() {
            return;
        }

        let mut succeeded = 0u64;
        let mut failed = 0u64;

        for entry in &entries {
            match self.storage.delete(&entry.source_path).await {
                Ok(()) => {
                    if let Err(e) = self.queue.remove(entry.id).await {
                        error!(entry_id = entry.id, error = %e, "Deletion queue: failed to remove entry");
                        failed += 1;
                    } else {
                        succeeded += 1;
                    }
                }
                Err(e) => {
                    error!(path = %entry.source_path, error = %e, "Deletion queue: failed to delete file");
                    let message = truncate_error(&e.to_string());
                    if let Err(e) = self.queue.record_failure(entry.id, &message).await {
                        error!(entry_id = entry.id, error = %e, "Deletion queue: failed to record failure");
                    }
                    failed += 1;
                }
            }
        }

        info!(succeeded, failed, "Deletion queue worker finished");
    }
}
