//! Configuration for the reconciliation sweeps.

use std::time::Duration;

/// Janitor sweep configuration.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Age past which a `processing` lease is considered stale.
    pub stuck_threshold: Duration,
}

/// Orphan cleanup configuration.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Minimum age of an unreferenced file record before it is removed.
    pub threshold: Duration,
    /// Maximum rows per sweep.
    pub batch_size: i64,
}

/// Deletion queue worker configuration.
#[derive(Debug, Clone)]
pub struct DeletionQueueConfig {
    /// Maximum queue entries per sweep.
    pub batch_size: i64,
    /// Ceiling before an entry is abandoned.
    pub max_retries: i32,
}
