//! Repository implementations. All SQL lives here.

pub mod deletion;
pub mod file;

pub use deletion::DeletionQueueRepository;
pub use file::{FailureOutcome, FileRepository};
