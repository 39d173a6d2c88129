//! File record model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{FileKind, FileStatus};

/// A file record as persisted in the `file` table.
///
/// Created by the uploader; the scheduler is the sole mutator of
/// `status`, `failed_attempts`, `last_error`, and (on success) `name`.
/// Timestamps are Unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    /// Unique identifier.
    pub id: i32,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Last update time, Unix seconds. While `status` is `processing`
    /// this is the lease start.
    pub updated_at: i64,
    /// Object name within the kind folder.
    pub name: String,
    /// File kind, selecting the storage folder.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Lifecycle status.
    pub status: FileStatus,
    /// Number of failed compression attempts.
    pub failed_attempts: i32,
    /// Most recent error, truncated to fit the column.
    pub last_error: Option<String>,
    /// Owning post, when referenced.
    pub used_by_post_id: Option<i32>,
    /// Owning user, when referenced.
    pub used_by_user_id: Option<i32>,
}

impl FileRecord {
    /// The derivative name: the current name with its extension rewritten
    /// to `.webp`.
    pub fn webp_name(&self) -> String {
        let stem = match self.name.rfind('.') {
            Some(idx) => &self.name[..idx],
            None => self.name.as_str(),
        };
        format!("{stem}.webp")
    }

    /// Whether both back-references are absent.
    pub fn is_unreferenced(&self) -> bool {
        self.used_by_post_id.is_none() && self.used_by_user_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> FileRecord {
        FileRecord {
            id: 1,
            created_at: 0,
            updated_at: 0,
            name: name.to_string(),
            kind: FileKind::Attachment,
            status: FileStatus::Pending,
            failed_attempts: 0,
            last_error: None,
            used_by_post_id: None,
            used_by_user_id: None,
        }
    }

    #[test]
    fn test_webp_name_rewrites_extension() {
        assert_eq!(record("photo.jpeg").webp_name(), "photo.webp");
        assert_eq!(record("photo.png").webp_name(), "photo.webp");
    }

    #[test]
    fn test_webp_name_uses_last_extension() {
        assert_eq!(record("archive.tar.gz").webp_name(), "archive.tar.webp");
    }

    #[test]
    fn test_webp_name_without_extension() {
        assert_eq!(record("photo").webp_name(), "photo.webp");
    }

    #[test]
    fn test_unreferenced() {
        let mut r = record("a.png");
        assert!(r.is_unreferenced());
        r.used_by_post_id = Some(42);
        assert!(!r.is_unreferenced());
    }
}
