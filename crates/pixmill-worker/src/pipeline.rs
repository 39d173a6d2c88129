//! Concurrent compression pipeline: reader → processor → writer stages
//! connected by bounded channels.
//!
//! Readers and writers are I/O-bound and run with a wider fan-out than
//! the CPU-bound processors. Every stage observes the cancellation token
//! between items, so a shutdown or run timeout drains promptly instead of
//! blocking on a full channel. Outcomes stream back to the caller as
//! tasks finish; no per-task ordering is promised.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use pixmill_core::config::KindFolders;
use pixmill_core::result::AppResult;
use pixmill_core::traits::storage::{stream_from_bytes, StorageBackend};
use pixmill_core::AppError;
use pixmill_entity::FileRecord;

use crate::compressor::resolve_path;
use crate::image::ImageProcessor;

/// The terminal result of one task's trip through the pipeline.
#[derive(Debug)]
pub struct TaskOutcome {
    /// The task as it was claimed.
    pub task: FileRecord,
    /// `Ok` when the derivative was written (or simulated in test mode).
    pub result: AppResult<()>,
}

struct ProcessJob {
    task: FileRecord,
    source: AppResult<Bytes>,
}

struct WriteJob {
    task: FileRecord,
    payload: AppResult<Bytes>,
}

/// The three-stage concurrent pipeline.
pub struct Pipeline {
    storage: Arc<dyn StorageBackend>,
    processor: Arc<ImageProcessor>,
    folders: Arc<KindFolders>,
    io_workers: usize,
    cpu_workers: usize,
    test_mode: bool,
}

impl Pipeline {
    /// Assemble a pipeline over the given storage backend and processor.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        processor: Arc<ImageProcessor>,
        folders: KindFolders,
        io_workers: usize,
        cpu_workers: usize,
        test_mode: bool,
    ) -> Self {
        Self {
            storage,
            processor,
            folders: Arc::new(folders),
            io_workers: io_workers.max(1),
            cpu_workers: cpu_workers.max(1),
            test_mode,
        }
    }

    /// Launch the stages over `tasks` and return the stream of outcomes.
    ///
    /// The receiver yields one outcome per task that made it through the
    /// pipeline and closes when every stage has exited; on cancellation
    /// in-flight tasks simply never surface an outcome and their leases
    /// are rescued by the next janitor pass.
    pub fn run(&self, tasks: Vec<FileRecord>, cancel: CancellationToken) -> mpsc::Receiver<TaskOutcome> {
        let batch = tasks.len().max(1);
        let (read_tx, read_rx) = mpsc::channel::<FileRecord>(batch);
        let (process_tx, process_rx) = mpsc::channel::<ProcessJob>(self.cpu_workers);
        let (write_tx, write_rx) = mpsc::channel::<WriteJob>(self.cpu_workers);
        let (result_tx, result_rx) = mpsc::channel::<TaskOutcome>(batch);

        let read_rx = Arc::new(Mutex::new(read_rx));
        let process_rx = Arc::new(Mutex::new(process_rx));
        let write_rx = Arc::new(Mutex::new(write_rx));

        tokio::spawn(feed_tasks(tasks, read_tx, cancel.clone()));

        for _ in 0..self.io_workers {
            tokio::spawn(reader_worker(
                Arc::clone(&read_rx),
                process_tx.clone(),
                Arc::clone(&self.storage),
                Arc::clone(&self.folders),
                cancel.clone(),
            ));
        }

        for _ in 0..self.cpu_workers {
            tokio::spawn(processor_worker(
                Arc::clone(&process_rx),
                write_tx.clone(),
                Arc::clone(&self.processor),
                cancel.clone(),
            ));
        }

        for _ in 0..self.io_workers {
            tokio::spawn(writer_worker(
                Arc::clone(&write_rx),
                result_tx.clone(),
                Arc::clone(&self.storage),
                Arc::clone(&self.folders),
                self.test_mode,
                cancel.clone(),
            ));
        }

        result_rx
    }
}

async fn feed_tasks(
    tasks: Vec<FileRecord>,
    read_tx: mpsc::Sender<FileRecord>,
    cancel: CancellationToken,
) {
    for task in tasks {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Shutdown requested, no longer feeding tasks into the pipeline");
                break;
            }
            result = read_tx.send(task) => {
                if result.is_err() {
                    break;
                }
            }
        }
    }
}

async fn reader_worker(
    jobs: Arc<Mutex<mpsc::Receiver<FileRecord>>>,
    process_tx: mpsc::Sender<ProcessJob>,
    storage: Arc<dyn StorageBackend>,
    folders: Arc<KindFolders>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            task = async { jobs.lock().await.recv().await } => match task {
                Some(task) => task,
                None => return,
            },
        };

        let source_path = resolve_path(&folders, task.kind, &task.name);
        let source = read_source(&*storage, &source_path).await.map_err(|e| {
            warn!(file_name = %task.name, error = %e, "Reader failed to open source");
            AppError::storage(format!("reader: {e}"))
        });

        let job = ProcessJob { task, source };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = process_tx.send(job) => {
                if result.is_err() {
                    return;
                }
            }
        }
    }
}

async fn read_source(storage: &dyn StorageBackend, path: &str) -> AppResult<Bytes> {
    let mut stream = storage.open(path).await?;
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(AppError::from)?;
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

async fn processor_worker(
    jobs: Arc<Mutex<mpsc::Receiver<ProcessJob>>>,
    write_tx: mpsc::Sender<WriteJob>,
    processor: Arc<ImageProcessor>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            job = async { jobs.lock().await.recv().await } => match job {
                Some(job) => job,
                None => return,
            },
        };

        let payload = match job.source {
            Ok(data) => {
                let processor = Arc::clone(&processor);
                match tokio::task::spawn_blocking(move || processor.process(&data)).await {
                    Ok(Ok(encoded)) => Ok(Bytes::from(encoded)),
                    Ok(Err(e)) => {
                        warn!(file_name = %job.task.name, error = %e, "Processor failed");
                        Err(AppError::image(format!("processor: {e}")))
                    }
                    Err(e) => Err(AppError::with_source(
                        pixmill_core::error::ErrorKind::Internal,
                        "Processor task panicked",
                        e,
                    )),
                }
            }
            Err(e) => Err(e),
        };

        let job = WriteJob {
            task: job.task,
            payload,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = write_tx.send(job) => {
                if result.is_err() {
                    return;
                }
            }
        }
    }
}

async fn writer_worker(
    jobs: Arc<Mutex<mpsc::Receiver<WriteJob>>>,
    result_tx: mpsc::Sender<TaskOutcome>,
    storage: Arc<dyn StorageBackend>,
    folders: Arc<KindFolders>,
    test_mode: bool,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            job = async { jobs.lock().await.recv().await } => match job {
                Some(job) => job,
                None => return,
            },
        };

        let result = match job.payload {
            Ok(encoded) => {
                if test_mode {
                    debug!(
                        file_name = %job.task.name,
                        size_bytes = encoded.len(),
                        "TEST MODE: simulated success, derivative not persisted"
                    );
                    Ok(())
                } else {
                    let destination = resolve_path(&folders, job.task.kind, &job.task.webp_name());
                    upload_with_cleanup(&storage, &destination, encoded, &cancel).await
                }
            }
            Err(e) => Err(e),
        };

        let outcome = TaskOutcome {
            task: job.task,
            result,
        };
        if result_tx.send(outcome).await.is_err() {
            return;
        }
    }
}

/// Upload the derivative, deleting any partially written object when the
/// upload fails or the run is cancelled mid-flight. The delete runs on a
/// detached task so shutdown is never blocked on it.
pub(crate) async fn upload_with_cleanup(
    storage: &Arc<dyn StorageBackend>,
    destination: &str,
    data: Bytes,
    cancel: &CancellationToken,
) -> AppResult<()> {
    let upload = storage.put(destination, stream_from_bytes(data), "image/webp");

    tokio::select! {
        _ = cancel.cancelled() => {
            spawn_cleanup(storage, destination, "run cancelled");
            Err(AppError::cancelled(format!(
                "upload of {destination} interrupted by shutdown"
            )))
        }
        result = upload => match result {
            Ok(_) => Ok(()),
            Err(e) => {
                spawn_cleanup(storage, destination, "upload failed");
                Err(AppError::storage(format!("writer: {e}")))
            }
        },
    }
}

fn spawn_cleanup(storage: &Arc<dyn StorageBackend>, destination: &str, reason: &'static str) {
    let storage = Arc::clone(storage);
    let destination = destination.to_string();
    tokio::spawn(async move {
        if let Err(e) = storage.delete(&destination).await {
            warn!(path = %destination, reason, error = %e, "Failed to clean up partial derivative");
        }
    });
}
