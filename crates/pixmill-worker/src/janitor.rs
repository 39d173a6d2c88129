//! Janitor sweep: returns stale `processing` leases to `pending`.

use chrono::Utc;
use tracing::{error, info, warn};

use pixmill_core::config::JanitorConfig;
use pixmill_database::repositories::FileRepository;

/// Rescues tasks whose previous owner crashed mid-run.
///
/// A `processing` row whose `updated_at` is older than the stuck
/// threshold has lost its owner; flipping it back to `pending` lets a
/// later run claim it again. The sweep is idempotent.
pub struct JanitorService {
    files: FileRepository,
    config: JanitorConfig,
}

impl JanitorService {
    /// Create a new janitor service.
    pub fn new(files: FileRepository, config: JanitorConfig) -> Self {
        Self { files, config }
    }

    /// Run one sweep. A database error ends the sweep; the next run retries.
    pub async fn run(&self) {
        info!("Janitor sweep started");

        let cutoff = Utc::now().timestamp() - self.config.stuck_threshold.as_secs() as i64;

        match self.files.release_stuck(cutoff).await {
            Ok(0) => info!("Janitor: no stuck tasks found"),
            Ok(count) => warn!(count, "Janitor: reset stuck tasks"),
            Err(e) => {
                error!(error = %e, "Janitor sweep failed");
                return;
            }
        }

        info!("Janitor sweep finished");
    }
}
