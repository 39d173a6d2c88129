//! Cron harness for the scheduler tick.
//!
//! A single cron job runs the enabled services in a fixed order under a
//! per-run cancellation token that fires on the 30-minute run timeout or
//! on process shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pixmill_core::config::RunMode;
use pixmill_core::error::AppError;
use pixmill_core::result::AppResult;

use crate::cleanup::OrphanCleanupService;
use crate::compressor::CompressionService;
use crate::deletion::DeletionQueueService;
use crate::janitor::JanitorService;

/// Upper bound on one scheduler tick.
const RUN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// The four services a tick may run.
pub struct ServiceSet {
    /// Stuck-lease rescue.
    pub janitor: JanitorService,
    /// The compression batch.
    pub compression: CompressionService,
    /// Source-file deletion queue drain.
    pub deletion: DeletionQueueService,
    /// Orphaned-record removal.
    pub cleanup: OrphanCleanupService,
}

/// Cron-based harness around the service set.
pub struct Scheduler {
    scheduler: JobScheduler,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a new harness.
    pub async fn new() -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self {
            scheduler,
            shutdown: CancellationToken::new(),
        })
    }

    /// Register the single scheduler tick.
    ///
    /// `schedule` is a standard 5-field cron expression; a seconds field
    /// is prepended for the 6-field parser underneath.
    pub async fn register(
        &self,
        schedule: &str,
        mode: RunMode,
        services: Arc<ServiceSet>,
    ) -> AppResult<()> {
        let expression = with_seconds_field(schedule);
        let shutdown = self.shutdown.clone();

        let job = CronJob::new_async(expression.as_str(), move |_uuid, _lock| {
            let services = Arc::clone(&services);
            let shutdown = shutdown.clone();
            Box::pin(async move {
                let run_token = shutdown.child_token();

                let timeout_token = run_token.clone();
                let watchdog = tokio::spawn(async move {
                    tokio::time::sleep(RUN_TIMEOUT).await;
                    warn!("Run timeout reached, cancelling in-flight work");
                    timeout_token.cancel();
                });

                run_services(&services, mode, run_token).await;
                watchdog.abort();
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create cron job: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add cron job: {e}")))?;

        info!(schedule, mode = %mode, "Registered scheduler tick");
        Ok(())
    }

    /// Start the scheduler.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        info!("Cron scheduler started");
        Ok(())
    }

    /// Cancel in-flight work and shut the scheduler down.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.shutdown.cancel();
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        info!("Cron scheduler shut down");
        Ok(())
    }
}

/// Run the services enabled by `mode` in the fixed order: janitor →
/// compression → deletion → cleanup. Once the run token fires, the
/// remaining services are skipped.
async fn run_services(services: &ServiceSet, mode: RunMode, cancel: CancellationToken) {
    info!(mode = %mode, "Cron tick fired");

    if mode.includes(RunMode::Janitor) {
        info!("Starting service: janitor");
        services.janitor.run().await;
        info!("Janitor service finished");
    }

    if cancelled_between_services(&cancel) {
        return;
    }

    if mode.includes(RunMode::Compression) {
        info!("Starting service: compression");
        services.compression.run(cancel.clone()).await;
        info!("Compression service finished");
    }

    if cancelled_between_services(&cancel) {
        return;
    }

    if mode.includes(RunMode::Deletion) {
        info!("Starting service: deletion queue");
        services.deletion.run().await;
        info!("Deletion queue service finished");
    }

    if cancelled_between_services(&cancel) {
        return;
    }

    if mode.includes(RunMode::Cleanup) {
        info!("Starting service: orphan cleanup");
        services.cleanup.run().await;
        info!("Orphan cleanup service finished");
    }

    info!("All services finished");
}

fn cancelled_between_services(cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        warn!("Run cancelled, skipping remaining services");
        return true;
    }
    false
}

/// The scheduler library parses 6-field cron (with seconds); prepend a
/// zero seconds field to a standard 5-field expression.
fn with_seconds_field(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_field_expression_gets_seconds() {
        assert_eq!(with_seconds_field("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(with_seconds_field("0 3 * * 1"), "0 0 3 * * 1");
    }

    #[test]
    fn test_six_field_expression_unchanged() {
        assert_eq!(with_seconds_field("30 */5 * * * *"), "30 */5 * * * *");
    }
}
