//! Request/response types for the single-collaborator endpoints: sandboxed
//! run, classification, issue scanning and static analysis.

use serde::{Deserialize, Serialize};
use tracelab_check::tracer::EntryPoint;
use tracelab_check::{DpAnalysis, Issue, StaticAnalysis, Topic};

/// Body of `POST /run`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub code: String,
    #[serde(default)]
    pub input: String,
}

/// Body of `POST /classify` and `POST /debug`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRequest {
    pub code: String,
}

/// Response from `POST /classify`.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyResponse {
    pub topic: Topic,
    pub confidence: f64,
    pub reasons: Vec<String>,
    /// Entry point the recursion tracers would use.
    pub entry: EntryPoint,
}

/// Response from `POST /debug`.
#[derive(Debug, Clone, Serialize)]
pub struct DebugResponse {
    pub issues: Vec<Issue>,
}

/// Body of `POST /analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub code: String,
    /// Topic override; classified when absent or `auto`.
    #[serde(default)]
    pub topic: Option<String>,
}

/// Response from `POST /analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub topic: Topic,
    /// `None` for topics without a static report.
    pub analysis: Option<StaticAnalysis>,
}

/// Response from `POST /dp`.
#[derive(Debug, Clone, Serialize)]
pub struct DpResponse {
    pub ok: bool,
    pub dp_analysis: DpAnalysis,
}
