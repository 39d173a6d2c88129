//! Per-run resource metrics: wall-clock duration, cumulative process CPU
//! time, and peak resident memory.

use std::time::{Duration, Instant};

use cpu_time::ProcessTime;
use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Collects resource usage over one compression run.
///
/// Peak RSS is sampled every 500 ms on a dedicated task that exits when
/// the run ends; CPU utilization is derived from the user+system process
/// time consumed over the run's wall-clock duration.
pub struct RunMetrics {
    started: Instant,
    cpu_before: Option<ProcessTime>,
    stop: oneshot::Sender<()>,
    sampler: JoinHandle<u64>,
}

impl RunMetrics {
    /// Begin collection and start the RSS sampler.
    pub fn start() -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let sampler = tokio::spawn(async move {
            let pid = match sysinfo::get_current_pid() {
                Ok(pid) => pid,
                Err(_) => return 0,
            };
            let mut system = System::new();
            let mut peak: u64 = 0;
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                        if let Some(process) = system.process(pid) {
                            peak = peak.max(process.memory());
                        }
                    }
                }
            }
            peak
        });

        Self {
            started: Instant::now(),
            cpu_before: ProcessTime::try_now().ok(),
            stop: stop_tx,
            sampler,
        }
    }

    /// Stop the sampler and log the run's resource usage.
    pub async fn finish(self) {
        let _ = self.stop.send(());
        let peak_rss = self.sampler.await.unwrap_or(0);

        let duration = self.started.elapsed();
        let cpu_used = match (self.cpu_before, ProcessTime::try_now().ok()) {
            (Some(before), Some(after)) => after.duration_since(before),
            _ => Duration::ZERO,
        };

        let cpu_percent = if duration.as_secs_f64() > 0.0 {
            cpu_used.as_secs_f64() / duration.as_secs_f64() * 100.0
        } else {
            0.0
        };

        info!(
            total_duration = ?duration,
            cpu_utilization_percent = format!("{cpu_percent:.2}%"),
            peak_ram_mb = format!("{:.2}", peak_rss as f64 / 1024.0 / 1024.0),
            "Run resource usage"
        );
    }
}
