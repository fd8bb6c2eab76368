//! Explanation and fix-suggestion handlers backed by the explanation
//! provider.

use axum::extract::State;
use axum::Json;
use serde_json::Value as JsonValue;

use crate::error::ApiError;
use crate::explain::{explain_prompt, extract_code_block, fix_prompt};
use crate::schema::common::validate_code;
use crate::schema::explain::{ExplainRequest, ExplainResponse, FixRequest, FixResponse};
use crate::state::AppState;

/// Explains a submission, optionally grounded in a pipeline summary.
///
/// `POST /explain`
pub async fn explain(
    State(state): State<AppState>,
    Json(req): Json<ExplainRequest>,
) -> Result<Json<ExplainResponse>, ApiError> {
    validate_code(&req.code)?;
    let summary = req.summary.unwrap_or(JsonValue::Null);
    let prompt = explain_prompt(&req.code, &summary, req.concise);
    let explanation = state.pipeline.explain(&prompt).await?;
    Ok(Json(ExplainResponse { explanation }))
}

/// Asks the provider for a corrected program.
///
/// `POST /fix`
pub async fn fix(
    State(state): State<AppState>,
    Json(req): Json<FixRequest>,
) -> Result<Json<FixResponse>, ApiError> {
    validate_code(&req.code)?;
    let issues = match req.issues {
        Some(issues) => issues,
        None => state.pipeline.scan(&req.code),
    };
    let prompt = fix_prompt(&req.code, &issues);
    let suggestion = state.pipeline.explain(&prompt).await?;
    Ok(Json(FixResponse {
        fixed_code: extract_code_block(&suggestion),
        suggestion,
        issues,
    }))
}
