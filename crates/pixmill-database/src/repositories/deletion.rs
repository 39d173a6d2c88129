//! Deletion queue repository.

use sqlx::PgPool;

use pixmill_core::error::{AppError, ErrorKind};
use pixmill_core::result::AppResult;
use pixmill_entity::SourceFileToDelete;

/// Repository for the `source_files_to_delete` queue.
#[derive(Debug, Clone)]
pub struct DeletionQueueRepository {
    pool: PgPool,
}

impl DeletionQueueRepository {
    /// Create a new deletion queue repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch up to `batch_size` entries still under the retry ceiling.
    pub async fn due_entries(
        &self,
        batch_size: i64,
        max_retries: i32,
    ) -> AppResult<Vec<SourceFileToDelete>> {
        sqlx::query_as(
            "SELECT id, file_id, source_path, failed_attempts, last_error, created_at \
             FROM source_files_to_delete \
             WHERE failed_attempts < $1 \
             ORDER BY id \
             LIMIT $2",
        )
        .bind(max_retries)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to fetch deletion queue", e)
        })
    }

    /// Remove an entry whose object was confirmed gone.
    pub async fn remove(&self, id: i32) -> AppResult<()> {
        sqlx::query("DELETE FROM source_files_to_delete WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to remove deletion entry", e)
            })?;
        Ok(())
    }

    /// Record a failed delete attempt against an entry.
    pub async fn record_failure(&self, id: i32, error_message: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE source_files_to_delete \
             SET failed_attempts = failed_attempts + 1, last_error = $1 \
             WHERE id = $2",
        )
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to record deletion failure", e)
        })?;
        Ok(())
    }
}
