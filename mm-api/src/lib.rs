//! mm-api - Measure Master catalog & reconciliation service
//!
//! Multi-tenant garment catalog backed by SQLite. The core of the service
//! is the asynchronous measurement-result path: an external AI inference
//! provider measures garments from photographs and posts a completion
//! webhook here, which is normalized, matched to a stored item, and applied
//! as an idempotent partial update.
//!
//! Library interface exposed for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod recon;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Record an error for the /health diagnostics surface
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
///
/// The API is consumed cross-origin by the scanning web app, so CORS is
/// fully open, matching the original deployment.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::product_routes())
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
