// Core modules
pub mod config;
pub mod execution;
pub mod feed;
pub mod models;
pub mod persistence;
pub mod signal;

// Re-export commonly used types
pub use crate::config::AppConfig;
pub use models::*;
