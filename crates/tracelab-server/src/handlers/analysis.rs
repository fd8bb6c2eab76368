//! Single-collaborator handlers: sandboxed run, classification, issue
//! scanning and static analysis.

use axum::extract::State;
use axum::Json;
use tracelab_check::tracer::resolve_entry;
use tracelab_check::{StaticAnalysis, Topic};

use crate::error::ApiError;
use crate::sandbox::ExecutionRecord;
use crate::schema::analysis::{
    AnalyzeRequest, AnalyzeResponse, ClassifyResponse, DebugResponse, DpResponse, RunRequest,
    SourceRequest,
};
use crate::schema::common::{parse_topic, validate_code};
use crate::state::AppState;

/// Runs the code in the sandbox only.
///
/// `POST /run`
pub async fn run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<ExecutionRecord>, ApiError> {
    validate_code(&req.code)?;
    let record = state.pipeline.execute(&req.code, &req.input).await;
    Ok(Json(record))
}

/// Classifies the code and reports the inferred entry point.
///
/// `POST /classify`
pub async fn classify(
    State(state): State<AppState>,
    Json(req): Json<SourceRequest>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    validate_code(&req.code)?;
    let result = state.pipeline.classify(&req.code);
    Ok(Json(ClassifyResponse {
        topic: result.topic,
        confidence: result.confidence,
        reasons: result.reasons,
        entry: resolve_entry(&req.code, None, None),
    }))
}

/// Scans the code for likely bugs.
///
/// `POST /debug`
pub async fn debug(
    State(state): State<AppState>,
    Json(req): Json<SourceRequest>,
) -> Result<Json<DebugResponse>, ApiError> {
    validate_code(&req.code)?;
    Ok(Json(DebugResponse {
        issues: state.pipeline.scan(&req.code),
    }))
}

/// Static report for the requested or classified topic.
///
/// `POST /analyze`
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    validate_code(&req.code)?;
    let topic = parse_topic(req.topic.as_deref())?;
    let (topic, analysis) = state.pipeline.analyze(&req.code, topic);
    Ok(Json(AnalyzeResponse { topic, analysis }))
}

/// DP table and memo write sites, whatever the code classifies as.
///
/// `POST /dp`
pub async fn dp(
    State(state): State<AppState>,
    Json(req): Json<SourceRequest>,
) -> Result<Json<DpResponse>, ApiError> {
    validate_code(&req.code)?;
    match state.pipeline.analyze(&req.code, Some(Topic::DpBottomUp)) {
        (_, Some(StaticAnalysis::Dp(dp_analysis))) => Ok(Json(DpResponse {
            ok: true,
            dp_analysis,
        })),
        _ => Err(ApiError::BadRequest("code does not parse".to_string())),
    }
}
