//! # jobline-api
//!
//! HTTP API layer for Jobline built on Axum.
//!
//! Provides the job status endpoint with long-poll support, queue
//! statistics, a health check, request logging, CORS, and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;
