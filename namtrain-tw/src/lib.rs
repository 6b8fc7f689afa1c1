//! namtrain-tw library interface for testing
//!
//! Exposes the application state and router so integration tests can drive
//! the service without binding a socket.

pub mod api;
pub mod audio;
pub mod error;
pub mod export;
pub mod files;
pub mod models;
pub mod store;
pub mod trainer;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use crate::files::FileRegistry;
use crate::store::RunStore;
use crate::trainer::Trainer;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers and background tasks
#[derive(Clone)]
pub struct AppState {
    /// Authoritative run index with durable backing
    pub store: Arc<RunStore>,
    /// Uploaded file registry
    pub files: Arc<FileRegistry>,
    /// External trainer seam
    pub trainer: Arc<dyn Trainer>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error message for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(store: Arc<RunStore>, files: Arc<FileRegistry>, trainer: Arc<dyn Trainer>) -> Self {
        Self {
            store,
            files,
            trainer,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .nest("/api", api::file_routes().merge(api::run_routes()))
        .layer(TraceLayer::new_for_http())
        // Local frontend dev servers talk to this API directly
        .layer(CorsLayer::permissive())
        .with_state(state)
}
