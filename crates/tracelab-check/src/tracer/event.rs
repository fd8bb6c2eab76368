//! Trace event model.
//!
//! Every event carries a sequence index and a kind-specific payload. All
//! embedded snapshots are owned JSON values, never references into live
//! interpreter state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One observation of program behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Call {
        function: String,
        line: u32,
        frame_id: u64,
        depth: usize,
        locals: Map<String, JsonValue>,
    },
    Return {
        function: String,
        line: u32,
        frame_id: u64,
        depth: usize,
        return_value: String,
        locals: Map<String, JsonValue>,
    },
    LineUpdate {
        function: String,
        line: u32,
        /// Bindings that changed since the previous event for this frame.
        changed: Map<String, JsonValue>,
        locals: Map<String, JsonValue>,
    },
    TableInit {
        name: String,
        dimension: TableDimension,
        rows: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cols: Option<usize>,
    },
    TableUpdate {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<TableIndex>,
        value: JsonValue,
        table: JsonValue,
    },
    RowComplete {
        name: String,
        row: usize,
        table: JsonValue,
    },
    GraphStep {
        step: GraphStepKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node: Option<JsonValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<JsonValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<JsonValue>,
        /// BFS queue or DFS call stack, front first.
        frontier: Vec<JsonValue>,
        /// Visited nodes in discovery order.
        visited: Vec<JsonValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depth: Option<usize>,
    },
    Truncated {
        reason: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<u32>,
    },
}

impl EventKind {
    /// Wire name of the kind, as used in the `kind` tag.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Call { .. } => "call",
            EventKind::Return { .. } => "return",
            EventKind::LineUpdate { .. } => "line_update",
            EventKind::TableInit { .. } => "table_init",
            EventKind::TableUpdate { .. } => "table_update",
            EventKind::RowComplete { .. } => "row_complete",
            EventKind::GraphStep { .. } => "graph_step",
            EventKind::Truncated { .. } => "truncated",
            EventKind::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableDimension {
    #[serde(rename = "1D")]
    OneD,
    #[serde(rename = "2D")]
    TwoD,
}

/// Position of a table write: a 1-D index, a 2-D `[row, col]` coordinate or
/// a memo key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableIndex {
    Position(usize),
    Cell([usize; 2]),
    Key(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphStepKind {
    Init,
    Visit,
    Edge,
    Call,
    Return,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_flat_with_kind_tag() {
        let event = TraceEvent {
            seq: 3,
            kind: EventKind::TableUpdate {
                name: "dp".into(),
                index: Some(TableIndex::Cell([1, 2])),
                value: json!(5),
                table: json!([[0, 0, 0], [0, 0, 5]]),
            },
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(
            encoded,
            json!({
                "seq": 3,
                "kind": "table_update",
                "name": "dp",
                "index": [1, 2],
                "value": 5,
                "table": [[0, 0, 0], [0, 0, 5]]
            })
        );
        let decoded: TraceEvent = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let event = TraceEvent {
            seq: 0,
            kind: EventKind::GraphStep {
                step: GraphStepKind::Visit,
                node: Some(json!("a")),
                from: None,
                to: None,
                frontier: vec![],
                visited: vec![json!("a")],
                depth: None,
            },
        };
        let encoded = serde_json::to_string(&event).unwrap();
        assert_eq!(
            encoded,
            r#"{"seq":0,"kind":"graph_step","step":"visit","node":"a","frontier":[],"visited":["a"]}"#
        );
        assert_eq!(event.kind.name(), "graph_step");
    }
}
