//! Background services for the Pixmill scheduler.
//!
//! This crate provides:
//! - The compression service with its concurrent reader → processor →
//!   writer pipeline and a sequential fallback
//! - The janitor sweep that rescues stuck leases
//! - The deletion queue worker that retires compressed originals
//! - The orphan cleanup that removes unreferenced records and bytes
//! - The cron harness that runs the enabled services on each tick

pub mod cleanup;
pub mod compressor;
pub mod deletion;
pub mod image;
pub mod janitor;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;

pub use cleanup::OrphanCleanupService;
pub use compressor::CompressionService;
pub use deletion::DeletionQueueService;
pub use janitor::JanitorService;
pub use scheduler::{Scheduler, ServiceSet};
