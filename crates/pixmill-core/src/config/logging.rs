//! Logging configuration.

/// Logging and tracing configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: `"debug"`, `"info"`, `"warn"`, `"error"`.
    pub level: String,
}

impl LoggingConfig {
    /// Whether the configured level is one the scheduler accepts.
    pub fn is_valid_level(&self) -> bool {
        matches!(
            self.level.to_ascii_lowercase().as_str(),
            "debug" | "info" | "warn" | "error"
        )
    }
}
