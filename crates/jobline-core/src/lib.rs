//! # jobline-core
//!
//! Core crate for Jobline. Contains configuration schemas, typed
//! identifiers, the in-process job event bus, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Jobline crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
