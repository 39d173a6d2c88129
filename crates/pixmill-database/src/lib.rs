//! # pixmill-database
//!
//! PostgreSQL connection management and concrete repository
//! implementations for the scheduler's three tables (`file`,
//! `source_files_to_delete`, `dead_letter_queue`).
//!
//! The schema itself is owned by the migration layer of the uploading
//! application; the repositories document the expected columns in their
//! queries.

pub mod connection;
pub mod repositories;

pub use connection::DatabasePool;
