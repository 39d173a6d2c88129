//! Storage backend configuration.

use std::fmt;

/// Which storage backend holds the image bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Local filesystem, paths relative to the working directory.
    Local,
    /// S3-compatible object store.
    S3,
}

impl StorageMode {
    /// Parse a `STORAGE_MODE` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "s3" => Some(Self::S3),
            _ => None,
        }
    }

    /// Return the mode as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Folder (or key prefix) per file kind.
#[derive(Debug, Clone)]
pub struct KindFolders {
    /// Folder for `attachment` files.
    pub attachment: String,
    /// Folder for `profile` files.
    pub profile: String,
    /// Folder for `thumbnail` files.
    pub thumbnail: String,
}

/// S3-compatible object storage configuration.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Region.
    pub region: String,
    /// Access key ID.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Custom endpoint URL (MinIO and friends). When set, path-style
    /// addressing is used.
    pub endpoint: Option<String>,
}

/// Top-level storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Selected backend.
    pub mode: StorageMode,
    /// Folder per file kind.
    pub folders: KindFolders,
    /// S3 settings, only meaningful when `mode` is [`StorageMode::S3`].
    pub s3: S3Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(StorageMode::parse("local"), Some(StorageMode::Local));
        assert_eq!(StorageMode::parse("S3"), Some(StorageMode::S3));
        assert_eq!(StorageMode::parse("ftp"), None);
    }
}
