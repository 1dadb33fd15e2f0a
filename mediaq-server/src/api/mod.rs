//! API Module
//!
//! HTTP API layer for the download queue.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{get, post},
};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::scheduler::Dispatcher;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(pool: SqlitePool, dispatcher: Dispatcher) -> Self {
        Self { pool, dispatcher }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/jobs", post(job::create_job).get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/retry", post(job::retry_job))
        .route("/jobs/{id}/file", get(job::download_file))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
