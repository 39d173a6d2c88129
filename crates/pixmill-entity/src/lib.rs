//! # pixmill-entity
//!
//! Persisted entity models: the file record the scheduler shepherds
//! through its lifecycle, the deletion-queue entry for retired originals,
//! and the dead-letter entry for tasks that exhausted their retries.

pub mod dead_letter;
pub mod deletion;
pub mod file;

pub use dead_letter::DeadLetterEntry;
pub use deletion::SourceFileToDelete;
pub use file::model::FileRecord;
pub use file::status::{FileKind, FileStatus};
