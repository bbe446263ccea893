//! # jobline-store
//!
//! Job record store implementations for Jobline. Supports two modes:
//!
//! - **memory**: in-process store using [dashmap](https://crates.io/crates/dashmap),
//!   for single-node deployments and tests
//! - **redis**: Redis-backed store using the [redis](https://crates.io/crates/redis)
//!   crate, with Lua scripts for atomic create and compare-and-swap
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod store;

pub use provider::StoreManager;
pub use store::{JobMutation, JobStore};
