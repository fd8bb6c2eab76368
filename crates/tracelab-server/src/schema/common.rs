//! Request validation shared by every endpoint that accepts source code.

use serde::Serialize;
use tracelab_check::Topic;

use crate::error::ApiError;

/// Largest accepted submission.
pub const MAX_CODE_BYTES: usize = 64 * 1024;

/// Rejects empty or oversized source.
pub fn validate_code(code: &str) -> Result<(), ApiError> {
    if code.trim().is_empty() {
        return Err(ApiError::BadRequest("code must not be empty".to_string()));
    }
    if code.len() > MAX_CODE_BYTES {
        return Err(ApiError::BadRequest(format!(
            "code is {} bytes; the limit is {}",
            code.len(),
            MAX_CODE_BYTES
        )));
    }
    Ok(())
}

/// Parses an optional topic override. Empty and `auto` mean "classify".
pub fn parse_topic(raw: Option<&str>) -> Result<Option<Topic>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) if text.eq_ignore_ascii_case("auto") => Ok(None),
        Some(text) => text
            .parse::<Topic>()
            .map(Some)
            .map_err(|err| ApiError::BadRequest(err.to_string())),
    }
}

/// Liveness response for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Configured explanation provider; `None` when explanations are off.
    pub explainer: Option<String>,
    pub run_timeout_ms: u64,
    pub event_budget: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_limits() {
        assert!(validate_code("print(1)").is_ok());
        assert!(validate_code("  \n").is_err());
        assert!(validate_code(&"x".repeat(MAX_CODE_BYTES + 1)).is_err());
    }

    #[test]
    fn topic_overrides() {
        assert_eq!(parse_topic(None).unwrap(), None);
        assert_eq!(parse_topic(Some("AUTO")).unwrap(), None);
        assert_eq!(parse_topic(Some("graph_bfs")).unwrap(), Some(Topic::GraphBfs));
        assert!(matches!(parse_topic(Some("sorting")), Err(ApiError::BadRequest(_))));
    }
}
