//! Orphan cleanup: removes file records (and their bytes) that no post
//! or user references past the age threshold.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use pixmill_core::config::{CleanupConfig, KindFolders};
use pixmill_core::traits::storage::StorageBackend;
use pixmill_database::repositories::FileRepository;

use crate::compressor::resolve_path;

/// Removes unreferenced file records and their storage objects.
///
/// The whole sweep runs in one database transaction: the orphan selection
/// and the bulk row delete see a consistent snapshot, and ids whose
/// storage delete failed are simply left out of the bulk delete so the
/// next sweep retries them. A missing storage object counts as success —
/// the database is authoritative, not the backend.
pub struct OrphanCleanupService {
    files: FileRepository,
    storage: Arc<dyn StorageBackend>,
    folders: KindFolders,
    config: CleanupConfig,
}

impl OrphanCleanupService {
    /// Create a new orphan cleanup service.
    pub fn new(
        files: FileRepository,
        storage: Arc<dyn StorageBackend>,
        folders: KindFolders,
        config: CleanupConfig,
    ) -> Self {
        Self {
            files,
            storage,
            folders,
            config,
        }
    }

    /// Run one sweep.
    pub async fn run(&self) {
        info!("Orphan cleanup started");

        let cutoff = Utc::now().timestamp() - self.config.threshold.as_secs() as i64;

        let mut tx = match self.files.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(error = %e, "Orphan cleanup: failed to begin transaction");
                return;
            }
        };

        let orphans = match self
            .files
            .find_orphaned(&mut tx, cutoff, self.config.batch_size)
            .await
        {
            Ok(orphans) => orphans,
            Err(e) => {
                error!(error = %e, "Orphan cleanup: failed to select orphans");
                return;
            }
        };

        if orphans.is_empty() {
            info!("Orphan cleanup: nothing to remove");
            return;
        }

        info!(count = orphans.len(), "Found orphaned file records");

        let mut deletable: Vec<i32> = Vec::with_capacity(orphans.len());
        for file in &orphans {
            let path = resolve_path(&self.folders, file.kind, &file.name);
            match self.storage.delete(&path).await {
                Ok(()) => deletable.push(file.id),
                Err(e) => {
                    error!(path = %path, error = %e, "Orphan cleanup: failed to delete object");
                }
            }
        }

        if !deletable.is_empty() {
            if let Err(e) = self.files.delete_by_ids(&mut tx, &deletable).await {
                error!(error = %e, "Orphan cleanup: failed to delete records");
                return;
            }
        }

        if let Err(e) = tx.commit().await {
            error!(error = %e, "Orphan cleanup: failed to commit");
            return;
        }

        info!(removed = deletable.len(), "Orphan cleanup finished");
    }
}
