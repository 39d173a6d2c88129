//! File repository: task leasing, lifecycle commits, and the sweeps'
//! queries against the `file` table.

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use pixmill_core::error::{AppError, ErrorKind};
use pixmill_core::result::AppResult;
use pixmill_entity::FileRecord;

const SELECT_COLUMNS: &str = "id, created_at, updated_at, name, type, status, \
     failed_attempts, last_error, used_by_post_id, used_by_user_id";

/// What a failure commit did with the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The task returned to the pending pool for a later retry.
    Requeued,
    /// The task reached its retry ceiling and was dead-lettered.
    DeadLettered,
}

/// Repository for file record lifecycle operations.
#[derive(Debug, Clone)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    /// Create a new file repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a transaction on the underlying pool. Used by the orphan
    /// cleanup, which interleaves storage deletes with its row selection.
    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))
    }

    /// Claim up to `batch_size` pending tasks under a row lease.
    ///
    /// The select takes row-level exclusive locks with `SKIP LOCKED` so a
    /// contending scheduler sees a disjoint batch instead of blocking, and
    /// the same transaction stamps the claimed rows `processing` — either
    /// every claimed row is leased or none is. With `lock` false (test
    /// mode) the rows are returned without being stamped.
    pub async fn claim_pending(
        &self,
        batch_size: i64,
        max_retries: i32,
        lock: bool,
    ) -> AppResult<Vec<FileRecord>> {
        let mut tx = self.begin().await?;

        let tasks: Vec<FileRecord> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM file \
             WHERE status = 'pending' AND failed_attempts < $1 \
             ORDER BY id \
             LIMIT $2 \
             FOR UPDATE SKIP LOCKED"
        ))
        .bind(max_retries)
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to select pending tasks", e))?;

        if tasks.is_empty() || !lock {
            tx.commit().await.map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to commit claim transaction", e)
            })?;
            return Ok(tasks);
        }

        let ids: Vec<i32> = tasks.iter().map(|t| t.id).collect();
        sqlx::query("UPDATE file SET status = 'processing', updated_at = $1 WHERE id = ANY($2)")
            .bind(Utc::now().timestamp())
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to lease claimed tasks", e)
            })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit claim transaction", e)
        })?;

        debug!(count = tasks.len(), "Leased pending tasks");
        Ok(tasks)
    }

    /// Commit a successful compression: flip the record to `compressed`,
    /// clear its error, rewrite its name to the WebP derivative, and
    /// enqueue the original for physical deletion — atomically.
    pub async fn mark_compressed(
        &self,
        file_id: i32,
        new_name: &str,
        source_path: &str,
    ) -> AppResult<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.begin().await?;

        sqlx::query(
            "UPDATE file SET status = 'compressed', last_error = NULL, name = $1, updated_at = $2 \
             WHERE id = $3",
        )
        .bind(new_name)
        .bind(now)
        .bind(file_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark task compressed", e)
        })?;

        sqlx::query(
            "INSERT INTO source_files_to_delete (file_id, source_path, failed_attempts, created_at) \
             VALUES ($1, $2, 0, $3)",
        )
        .bind(file_id)
        .bind(source_path)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to enqueue source deletion", e)
        })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit success transaction", e)
        })
    }

    /// Commit a failed attempt. Below the ceiling the task returns to
    /// `pending`; at the ceiling it moves to `failed` and a dead-letter
    /// entry is written in the same transaction.
    pub async fn record_failure(
        &self,
        file_id: i32,
        previous_attempts: i32,
        max_retries: i32,
        error_message: &str,
    ) -> AppResult<FailureOutcome> {
        let new_attempts = previous_attempts + 1;
        let now = Utc::now().timestamp();
        let mut tx = self.begin().await?;

        if new_attempts >= max_retries {
            sqlx::query(
                "UPDATE file SET status = 'failed', failed_attempts = $1, last_error = $2, \
                 updated_at = $3 WHERE id = $4",
            )
            .bind(new_attempts)
            .bind(error_message)
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to mark task failed", e)
            })?;

            sqlx::query(
                "INSERT INTO dead_letter_queue (file_id, error_message, created_at, updated_at) \
                 VALUES ($1, $2, $3, $3)",
            )
            .bind(file_id)
            .bind(error_message)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to insert dead-letter entry", e)
            })?;

            tx.commit().await.map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to commit failure transaction", e)
            })?;
            Ok(FailureOutcome::DeadLettered)
        } else {
            sqlx::query(
                "UPDATE file SET status = 'pending', failed_attempts = $1, last_error = $2, \
                 updated_at = $3 WHERE id = $4",
            )
            .bind(new_attempts)
            .bind(error_message)
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to requeue task", e)
            })?;

            tx.commit().await.map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to commit failure transaction", e)
            })?;
            Ok(FailureOutcome::Requeued)
        }
    }

    /// Return every `processing` row whose lease started before
    /// `cutoff` (Unix seconds) to `pending`. Idempotent.
    pub async fn release_stuck(&self, cutoff: i64) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE file SET status = 'pending', updated_at = $1 \
             WHERE status = 'processing' AND updated_at < $2",
        )
        .bind(Utc::now().timestamp())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to release stuck tasks", e)
        })?;
        Ok(result.rows_affected())
    }

    /// Select up to `batch_size` unreferenced records older than `cutoff`
    /// (Unix seconds) inside the caller's transaction.
    pub async fn find_orphaned(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cutoff: i64,
        batch_size: i64,
    ) -> AppResult<Vec<FileRecord>> {
        sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM file \
             WHERE used_by_post_id IS NULL AND used_by_user_id IS NULL AND created_at < $1 \
             ORDER BY id \
             LIMIT $2"
        ))
        .bind(cutoff)
        .bind(batch_size)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to select orphaned records", e)
        })
    }

    /// Bulk-delete the given record ids inside the caller's transaction.
    pub async fn delete_by_ids(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i32],
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM file WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete file records", e)
            })?;
        Ok(result.rows_affected())
    }
}
