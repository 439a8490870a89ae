//! Axum HTTP API server for the render pipeline.
//!
//! This crate provides:
//! - The three pipeline operations as JSON endpoints
//! - Operation status lookup
//! - Locally stored media under /static

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
