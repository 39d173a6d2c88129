//! Pixmill — periodic database-driven image compression scheduler.
//!
//! Main entry point that wires the crates together: configuration →
//! logging → database → storage backend → cron harness, then blocks
//! until a termination signal cancels in-flight work.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pixmill_core::config::AppConfig;
use pixmill_core::error::AppError;
use pixmill_database::repositories::{DeletionQueueRepository, FileRepository};
use pixmill_database::DatabasePool;
use pixmill_worker::{
    CompressionService, DeletionQueueService, JanitorService, OrphanCleanupService, Scheduler,
    ServiceSet,
};

#[tokio::main]
async fn main() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Scheduler error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging from `LOG_LEVEL`, letting `RUST_LOG`
/// override when set.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    fmt().with_env_filter(filter).with_target(true).init();
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    info!(
        schedule = %config.schedule,
        mode = %config.mode,
        storage = %config.storage.mode,
        "Application starting"
    );

    let pool = DatabasePool::connect(&config.database).await?.into_pool();
    let storage = pixmill_storage::build_backend(&config.storage).await?;

    let files = FileRepository::new(pool.clone());
    let deletion_queue = DeletionQueueRepository::new(pool);

    let services = Arc::new(ServiceSet {
        janitor: JanitorService::new(files.clone(), config.janitor.clone()),
        compression: CompressionService::new(
            files.clone(),
            Arc::clone(&storage),
            config.compression.clone(),
            config.storage.folders.clone(),
        ),
        deletion: DeletionQueueService::new(
            deletion_queue,
            Arc::clone(&storage),
            config.deletion_queue.clone(),
        ),
        cleanup: OrphanCleanupService::new(
            files,
            storage,
            config.storage.folders.clone(),
            config.cleanup.clone(),
        ),
    });

    let mut scheduler = Scheduler::new().await?;
    scheduler
        .register(&config.schedule, config.mode, services)
        .await?;
    scheduler.start().await?;

    info!("Scheduler running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    info!("Termination signal received, stopping scheduler...");
    scheduler.shutdown().await?;
    info!("Scheduler stopped.");
    Ok(())
}

/// Block until SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
