//! Explanation and fix-suggestion request/response types.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracelab_check::Issue;

/// Body of `POST /explain`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplainRequest {
    pub code: String,
    /// A `done` summary or any other analysis to ground the explanation.
    #[serde(default)]
    pub summary: Option<JsonValue>,
    #[serde(default)]
    pub concise: bool,
}

/// Response from `POST /explain`.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

/// Body of `POST /fix`.
#[derive(Debug, Clone, Deserialize)]
pub struct FixRequest {
    pub code: String,
    /// Scanned from `code` when absent.
    #[serde(default)]
    pub issues: Option<Vec<Issue>>,
}

/// Response from `POST /fix`.
#[derive(Debug, Clone, Serialize)]
pub struct FixResponse {
    /// First code block of the reply, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_code: Option<String>,
    /// The provider's full reply.
    pub suggestion: String,
    pub issues: Vec<Issue>,
}
