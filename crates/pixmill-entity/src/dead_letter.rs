//! Dead-letter queue entry model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A record of a task that exhausted its retries.
///
/// Append-only from the scheduler's side; one entry exists per file
/// record in the `failed` status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeadLetterEntry {
    /// Unique identifier.
    pub id: i32,
    /// The file record that failed permanently.
    pub file_id: i32,
    /// The final error message.
    pub error_message: String,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Last update time, Unix seconds.
    pub updated_at: i64,
}
