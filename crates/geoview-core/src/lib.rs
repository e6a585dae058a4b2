//! Core types shared across the GeoView crates: configuration, the unified
//! application error type, and the in-memory feature model.

pub mod config;
pub mod error;
pub mod models;

pub use config::AppConfig;
pub use error::{AppError, ErrorMetadata, LogLevel};
