//! File status and kind enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a file record.
///
/// Legal transitions:
/// `pending → processing → compressed`, or back to `pending` on a
/// retryable failure, or to `failed` once the retry ceiling is reached.
/// The janitor also returns stale `processing` rows to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "file_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Waiting to be claimed by a scheduler run.
    Pending,
    /// Claimed under a row lease; `updated_at` is the lease start.
    Processing,
    /// Successfully compressed; the record now names the WebP derivative.
    Compressed,
    /// Exhausted its retries; mirrored in the dead-letter queue.
    Failed,
}

impl FileStatus {
    /// Whether the scheduler will never touch this record again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Compressed | Self::Failed)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Compressed => "compressed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of uploaded file; selects the storage folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "file_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Post attachment.
    Attachment,
    /// Profile picture.
    Profile,
    /// Post thumbnail.
    Thumbnail,
}

impl FileKind {
    /// Return the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Profile => "profile",
            Self::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(FileStatus::Compressed.is_terminal());
        assert!(FileStatus::Failed.is_terminal());
        assert!(!FileStatus::Pending.is_terminal());
        assert!(!FileStatus::Processing.is_terminal());
    }
}
