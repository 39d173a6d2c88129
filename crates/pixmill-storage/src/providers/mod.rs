//! Concrete storage backend implementations.

pub mod local;
pub mod s3;
