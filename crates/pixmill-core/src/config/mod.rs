//! Application configuration schemas.
//!
//! The scheduler is configured entirely through flat environment
//! variables (`DB_HOST`, `APP_SCHEDULE`, `COMPRESSION_BATCH_SIZE`, ...),
//! read via the `config` crate and grouped into the sectioned structs in
//! the sub-modules. [`AppConfig::load`] performs the grouping and the
//! startup validation; a configuration error is fatal.

pub mod compression;
pub mod database;
pub mod logging;
pub mod maintenance;
pub mod storage;

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

pub use self::compression::{CompressionConfig, WEBP_MAX_DIMENSION};
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::maintenance::{CleanupConfig, DeletionQueueConfig, JanitorConfig};
pub use self::storage::{KindFolders, S3Config, StorageConfig, StorageMode};

use crate::error::AppError;
use crate::result::AppResult;

/// Which services a scheduler tick runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// All services, in the fixed janitor → compression → deletion →
    /// cleanup order.
    All,
    /// Only the compression service.
    Compression,
    /// Only the janitor sweep.
    Janitor,
    /// Only the deletion queue worker.
    Deletion,
    /// Only the orphan cleanup.
    Cleanup,
}

impl RunMode {
    /// Parse an `APP_MODE` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "compression" => Some(Self::Compression),
            "janitor" => Some(Self::Janitor),
            "deletion" => Some(Self::Deletion),
            "cleanup" => Some(Self::Cleanup),
            _ => None,
        }
    }

    /// Return the mode as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Compression => "compression",
            Self::Janitor => "janitor",
            Self::Deletion => "deletion",
            Self::Cleanup => "cleanup",
        }
    }

    /// Whether a tick in this mode includes the given service mode.
    pub fn includes(&self, service: RunMode) -> bool {
        *self == Self::All || *self == service
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Root application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Cron expression (standard 5-field) driving the scheduler tick.
    pub schedule: String,
    /// Which services each tick runs.
    pub mode: RunMode,
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Storage backend settings.
    pub storage: StorageConfig,
    /// Compression service settings.
    pub compression: CompressionConfig,
    /// Janitor sweep settings.
    pub janitor: JanitorConfig,
    /// Orphan cleanup settings.
    pub cleanup: CleanupConfig,
    /// Deletion queue settings.
    pub deletion_queue: DeletionQueueConfig,
}

/// Flat deserialization target for the environment source. Field names
/// are the lowercased environment variable names.
#[derive(Debug, Deserialize)]
struct Env {
    #[serde(default = "default_db_host")]
    db_host: String,
    #[serde(default = "default_db_user")]
    db_user: String,
    #[serde(default = "default_db_password")]
    db_password: String,
    #[serde(default = "default_db_name")]
    db_name: String,
    #[serde(default = "default_db_port")]
    db_port: u16,
    #[serde(default = "default_db_ssl_mode")]
    db_ssl_mode: String,

    #[serde(default = "default_log_level")]
    log_level: String,

    #[serde(default)]
    app_schedule: Option<String>,
    #[serde(default = "default_app_mode")]
    app_mode: String,

    #[serde(default = "default_storage_mode")]
    storage_mode: String,
    #[serde(default)]
    s3_bucket: Option<String>,
    #[serde(default)]
    s3_region: Option<String>,
    #[serde(default)]
    s3_access_key: Option<String>,
    #[serde(default)]
    s3_secret_key: Option<String>,
    #[serde(default)]
    s3_endpoint: Option<String>,

    #[serde(default = "default_dir_attachment")]
    dir_attachment: String,
    #[serde(default = "default_dir_profile")]
    dir_profile: String,
    #[serde(default = "default_dir_thumbnail")]
    dir_thumbnail: String,

    #[serde(default = "default_true")]
    compression_is_concurrent: bool,
    #[serde(default)]
    compression_is_test_mode: bool,
    #[serde(default = "default_compression_batch_size")]
    compression_batch_size: i64,
    #[serde(default = "default_num_workers")]
    compression_num_workers: usize,
    #[serde(default = "default_webp_quality")]
    compression_webp_quality: u8,
    #[serde(default = "default_max_dimension")]
    compression_max_width: u32,
    #[serde(default = "default_max_dimension")]
    compression_max_height: u32,
    #[serde(default = "default_compression_max_retries")]
    compression_max_retries: i32,

    #[serde(default = "default_cleanup_threshold")]
    cleanup_threshold: String,
    #[serde(default = "default_cleanup_batch_size")]
    cleanup_batch_size: i64,

    #[serde(default = "default_janitor_stuck_threshold")]
    janitor_stuck_threshold: String,

    #[serde(default = "default_deletion_queue_batch_size")]
    deletion_queue_batch_size: i64,
    #[serde(default = "default_deletion_queue_max_retries")]
    deletion_queue_max_retries: i32,
}

impl AppConfig {
    /// Load configuration from the process environment and validate it.
    pub fn load() -> AppResult<Self> {
        let env: Env = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        let cfg = Self::from_env(env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_env(env: Env) -> AppResult<Self> {
        let schedule = env.app_schedule.ok_or_else(|| {
            AppError::configuration("APP_SCHEDULE is required (standard 5-field cron expression)")
        })?;

        let mode = RunMode::parse(&env.app_mode).ok_or_else(|| {
            AppError::configuration(format!(
                "APP_MODE '{}' is not one of: all, compression, janitor, deletion, cleanup",
                env.app_mode
            ))
        })?;

        let storage_mode = StorageMode::parse(&env.storage_mode).ok_or_else(|| {
            AppError::configuration(format!(
                "STORAGE_MODE '{}' is not one of: local, s3",
                env.storage_mode
            ))
        })?;

        Ok(Self {
            schedule,
            mode,
            database: DatabaseConfig {
                host: env.db_host,
                user: env.db_user,
                password: env.db_password,
                name: env.db_name,
                port: env.db_port,
                ssl_mode: env.db_ssl_mode,
            },
            logging: LoggingConfig {
                level: env.log_level,
            },
            storage: StorageConfig {
                mode: storage_mode,
                folders: KindFolders {
                    attachment: env.dir_attachment,
                    profile: env.dir_profile,
                    thumbnail: env.dir_thumbnail,
                },
                s3: S3Config {
                    bucket: env.s3_bucket.unwrap_or_default(),
                    region: env.s3_region.unwrap_or_default(),
                    access_key: env.s3_access_key.unwrap_or_default(),
                    secret_key: env.s3_secret_key.unwrap_or_default(),
                    endpoint: env.s3_endpoint.filter(|e| !e.is_empty()),
                },
            },
            compression: CompressionConfig {
                concurrent: env.compression_is_concurrent,
                test_mode: env.compression_is_test_mode,
                batch_size: env.compression_batch_size,
                num_workers: env.compression_num_workers,
                webp_quality: env.compression_webp_quality,
                max_width: env.compression_max_width,
                max_height: env.compression_max_height,
                max_retries: env.compression_max_retries,
            },
            janitor: JanitorConfig {
                stuck_threshold: parse_duration("JANITOR_STUCK_THRESHOLD", &env.janitor_stuck_threshold)?,
            },
            cleanup: CleanupConfig {
                threshold: parse_duration("CLEANUP_THRESHOLD", &env.cleanup_threshold)?,
                batch_size: env.cleanup_batch_size,
            },
            deletion_queue: DeletionQueueConfig {
                batch_size: env.deletion_queue_batch_size,
                max_retries: env.deletion_queue_max_retries,
            },
        })
    }

    /// Validate the assembled configuration. Called by [`AppConfig::load`];
    /// any error here must abort startup.
    pub fn validate(&self) -> AppResult<()> {
        if !self.logging.is_valid_level() {
            return Err(AppError::configuration(format!(
                "LOG_LEVEL '{}' is not one of: debug, info, warn, error",
                self.logging.level
            )));
        }

        let c = &self.compression;
        if c.batch_size <= 0 {
            return Err(AppError::configuration(
                "COMPRESSION_BATCH_SIZE must be greater than 0",
            ));
        }
        if c.num_workers == 0 {
            return Err(AppError::configuration(
                "COMPRESSION_NUM_WORKERS must be greater than 0",
            ));
        }
        if !(1..=100).contains(&c.webp_quality) {
            return Err(AppError::configuration(
                "COMPRESSION_WEBP_QUALITY must be between 1 and 100",
            ));
        }
        if c.max_width == 0 || c.max_height == 0 {
            return Err(AppError::configuration(
                "COMPRESSION_MAX_WIDTH and COMPRESSION_MAX_HEIGHT must be greater than 0",
            ));
        }
        if c.max_width > WEBP_MAX_DIMENSION || c.max_height > WEBP_MAX_DIMENSION {
            return Err(AppError::configuration(format!(
                "COMPRESSION_MAX_WIDTH or COMPRESSION_MAX_HEIGHT exceeds the WebP limit ({WEBP_MAX_DIMENSION}px)"
            )));
        }
        if c.max_retries < 0 {
            return Err(AppError::configuration(
                "COMPRESSION_MAX_RETRIES must not be negative",
            ));
        }

        if self.cleanup.threshold.is_zero() {
            return Err(AppError::configuration(
                "CLEANUP_THRESHOLD must be a positive duration",
            ));
        }
        if self.cleanup.batch_size <= 0 {
            return Err(AppError::configuration(
                "CLEANUP_BATCH_SIZE must be greater than 0",
            ));
        }
        if self.janitor.stuck_threshold.is_zero() {
            return Err(AppError::configuration(
                "JANITOR_STUCK_THRESHOLD must be a positive duration",
            ));
        }
        if self.deletion_queue.batch_size <= 0 {
            return Err(AppError::configuration(
                "DELETION_QUEUE_BATCH_SIZE must be greater than 0",
            ));
        }
        if self.deletion_queue.max_retries < 0 {
            return Err(AppError::configuration(
                "DELETION_QUEUE_MAX_RETRIES must not be negative",
            ));
        }

        match self.storage.mode {
            StorageMode::S3 => {
                let s3 = &self.storage.s3;
                for (name, value) in [
                    ("S3_BUCKET", &s3.bucket),
                    ("S3_REGION", &s3.region),
                    ("S3_ACCESS_KEY", &s3.access_key),
                    ("S3_SECRET_KEY", &s3.secret_key),
                ] {
                    if value.is_empty() {
                        return Err(AppError::configuration(format!(
                            "{name} is required when STORAGE_MODE=s3"
                        )));
                    }
                }
            }
            StorageMode::Local => {
                let f = &self.storage.folders;
                for dir in [&f.attachment, &f.profile, &f.thumbnail] {
                    match std::fs::metadata(dir) {
                        Ok(meta) if meta.is_dir() => {}
                        Ok(_) => {
                            return Err(AppError::configuration(format!(
                                "path '{dir}' is not a directory"
                            )));
                        }
                        Err(e) => {
                            return Err(AppError::configuration(format!(
                                "folder '{dir}' is not readable: {e}"
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn parse_duration(var: &str, value: &str) -> AppResult<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        AppError::configuration(format!(
            "env var {var}: invalid duration '{value}' (e.g., '720h', '30m'): {e}"
        ))
    })
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_user() -> String {
    "user".to_string()
}

fn default_db_password() -> String {
    "password".to_string()
}

fn default_db_name() -> String {
    "dbname".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_ssl_mode() -> String {
    "disable".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_app_mode() -> String {
    "all".to_string()
}

fn default_storage_mode() -> String {
    "local".to_string()
}

fn default_dir_attachment() -> String {
    "post_picture".to_string()
}

fn default_dir_profile() -> String {
    "profile_picture".to_string()
}

fn default_dir_thumbnail() -> String {
    "thumbnail".to_string()
}

fn default_true() -> bool {
    true
}

fn default_compression_batch_size() -> i64 {
    50
}

fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_webp_quality() -> u8 {
    75
}

fn default_max_dimension() -> u32 {
    1980
}

fn default_compression_max_retries() -> i32 {
    3
}

fn default_cleanup_threshold() -> String {
    "720h".to_string()
}

fn default_cleanup_batch_size() -> i64 {
    100
}

fn default_janitor_stuck_threshold() -> String {
    "15m".to_string()
}

fn default_deletion_queue_batch_size() -> i64 {
    100
}

fn default_deletion_queue_max_retries() -> i32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            schedule: "*/5 * * * *".into(),
            mode: RunMode::All,
            database: DatabaseConfig {
                host: default_db_host(),
                user: default_db_user(),
                password: default_db_password(),
                name: default_db_name(),
                port: default_db_port(),
                ssl_mode: default_db_ssl_mode(),
            },
            logging: LoggingConfig { level: "info".into() },
            storage: StorageConfig {
                mode: StorageMode::S3,
                folders: KindFolders {
                    attachment: "post_picture".into(),
                    profile: "profile_picture".into(),
                    thumbnail: "thumbnail".into(),
                },
                s3: S3Config {
                    bucket: "media".into(),
                    region: "ap-southeast-1".into(),
                    access_key: "key".into(),
                    secret_key: "secret".into(),
                    endpoint: None,
                },
            },
            compression: CompressionConfig {
                concurrent: true,
                test_mode: false,
                batch_size: 50,
                num_workers: 4,
                webp_quality: 75,
                max_width: 1980,
                max_height: 1980,
                max_retries: 3,
            },
            janitor: JanitorConfig {
                stuck_threshold: Duration::from_secs(15 * 60),
            },
            cleanup: CleanupConfig {
                threshold: Duration::from_secs(720 * 3600),
                batch_size: 100,
            },
            deletion_queue: DeletionQueueConfig {
                batch_size: 100,
                max_retries: 5,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_quality_out_of_range() {
        let mut cfg = base_config();
        cfg.compression.webp_quality = 0;
        assert!(cfg.validate().is_err());
        cfg.compression.webp_quality = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_dimension_exceeds_webp_limit() {
        let mut cfg = base_config();
        cfg.compression.max_width = WEBP_MAX_DIMENSION + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_nonpositive_batch_rejected() {
        let mut cfg = base_config();
        cfg.compression.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_s3_mode_requires_credentials() {
        let mut cfg = base_config();
        cfg.storage.s3.secret_key.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut cfg = base_config();
        cfg.janitor.stuck_threshold = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!(RunMode::parse("all"), Some(RunMode::All));
        assert_eq!(RunMode::parse("Compression"), Some(RunMode::Compression));
        assert_eq!(RunMode::parse("everything"), None);
    }

    #[test]
    fn test_run_mode_includes() {
        assert!(RunMode::All.includes(RunMode::Janitor));
        assert!(RunMode::Deletion.includes(RunMode::Deletion));
        assert!(!RunMode::Deletion.includes(RunMode::Cleanup));
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(
            parse_duration("CLEANUP_THRESHOLD", "720h").unwrap(),
            Duration::from_secs(720 * 3600)
        );
        assert_eq!(
            parse_duration("JANITOR_STUCK_THRESHOLD", "15m").unwrap(),
            Duration::from_secs(900)
        );
        assert!(parse_duration("CLEANUP_THRESHOLD", "soon").is_err());
    }
}
