//! Single-tracer request/response types.
//!
//! Runs exactly one tracer variant with an explicit or classified topic and
//! returns the raw events alongside the derived artifact, without the rest
//! of the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracelab_check::tracer::EntryPoint;
use tracelab_check::{RecursionTreeNode, Topic, TraceReport, TracerKind};

/// Body of `POST /simulate`.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulateRequest {
    pub code: String,
    #[serde(default)]
    pub input: String,
    /// Classified when absent.
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub entry_function: Option<String>,
    #[serde(default)]
    pub entry_args: Option<Vec<JsonValue>>,
}

/// Structure derived from the events, by tracer family.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    RecursionTree { tree: Option<RecursionTreeNode> },
    DpTable { table: Option<JsonValue> },
    GraphTraversal { order: Vec<JsonValue> },
}

/// Response from `POST /simulate`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulateResponse {
    pub topic: Topic,
    pub tracer: TracerKind,
    pub entry: EntryPoint,
    pub report: TraceReport,
    /// Absent for the generic execution tracer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}
