//! # pixmill-core
//!
//! Core crate for the Pixmill compression scheduler. Contains the storage
//! trait, configuration schemas, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Pixmill crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
