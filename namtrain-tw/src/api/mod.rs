//! HTTP API handlers

pub mod files;
pub mod health;
pub mod runs;

pub use files::file_routes;
pub use health::health_routes;
pub use runs::run_routes;
