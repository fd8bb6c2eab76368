//! Submission request/response types for the streaming and synchronous
//! pipeline endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::common::{parse_topic, validate_code};
use crate::error::ApiError;
use crate::pipeline::{Submission, Summary};

/// Body of `POST /process` and `POST /process/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    pub code: String,
    /// Text fed to the program's stdin.
    #[serde(default)]
    pub input: String,
    /// Topic override; absent, empty or `auto` lets the classifier decide.
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub entry_function: Option<String>,
    #[serde(default)]
    pub entry_args: Option<Vec<JsonValue>>,
    #[serde(default)]
    pub concise: bool,
}

impl ProcessRequest {
    /// Validates the request and turns it into a pipeline submission.
    pub fn into_submission(self) -> Result<Submission, ApiError> {
        validate_code(&self.code)?;
        let topic = parse_topic(self.topic.as_deref())?;
        Ok(Submission {
            code: self.code,
            input: self.input,
            topic,
            entry_function: self.entry_function.filter(|name| !name.trim().is_empty()),
            entry_args: self.entry_args,
            concise: self.concise,
        })
    }
}

/// Response from `POST /process`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub ok: bool,
    pub result: Summary,
}
