//! Deletion-queue entry model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A one-shot queue entry for a source file awaiting physical removal
/// after its compression succeeded.
///
/// Created atomically with the success commit; removed when the storage
/// delete is confirmed. An entry exists iff the referenced file record is
/// `compressed` and the original object has not yet been confirmed gone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SourceFileToDelete {
    /// Unique identifier.
    pub id: i32,
    /// The file record whose original this entry retires.
    pub file_id: i32,
    /// Storage path of the original object.
    pub source_path: String,
    /// Number of failed delete attempts.
    pub failed_attempts: i32,
    /// Most recent delete error.
    pub last_error: Option<String>,
    /// Creation time, Unix seconds.
    pub created_at: i64,
}
