//! HTTP server for the darkroom image derivative cache.
//!
//! This crate provides:
//! - The derivative cache coordinator (`images`)
//! - Image, health and statistics endpoints
//! - Prometheus metrics

pub mod error;
pub mod handlers;
pub mod images;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use images::{CacheError, CacheResult, ImageCache};
pub use routes::create_router;
pub use state::AppState;
