//! Router assembly for the tracelab HTTP API.
//!
//! [`build_router`] wires all handler functions to their routes with
//! CORS and tracing middleware layers.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the complete axum router with all API routes.
///
/// CORS is permissive (the visualizer may be served from anywhere).
/// TraceLayer provides request-level logging via tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Pipeline
        .route("/process/stream", post(handlers::process::process_stream))
        .route("/process", post(handlers::process::process))
        // Single collaborators
        .route("/run", post(handlers::analysis::run))
        .route("/classify", post(handlers::analysis::classify))
        .route("/debug", post(handlers::analysis::debug))
        .route("/analyze", post(handlers::analysis::analyze))
        .route("/dp", post(handlers::analysis::dp))
        .route("/simulate", post(handlers::simulate::simulate))
        // Explanation provider
        .route("/explain", post(handlers::explain::explain))
        .route("/fix", post(handlers::explain::fix))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
