//! Liveness probe.

use axum::extract::State;
use axum::Json;

use crate::schema::common::HealthResponse;
use crate::state::AppState;

/// Reports liveness along with the limits this instance runs with.
///
/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        explainer: state.config.llm.provider.clone(),
        run_timeout_ms: u64::try_from(state.config.run_timeout.as_millis()).unwrap_or(u64::MAX),
        event_budget: state.config.event_budget,
    })
}
