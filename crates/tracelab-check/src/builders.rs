//! Pure reducers from recorded event sequences to derived artifacts.
//!
//! None of these functions keep state between calls, so rebuilding from the
//! same events always yields the same artifact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::tracer::{EventKind, GraphStepKind, TraceEvent};

/// One call in a recursion tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecursionTreeNode {
    pub function: String,
    /// Bindings at entry, i.e. the bound arguments.
    pub args: Map<String, JsonValue>,
    /// Nested calls in call order.
    pub children: Vec<RecursionTreeNode>,
    /// `None` when the call never returned (error or truncation).
    #[serde(default)]
    pub return_value: Option<String>,
}

impl RecursionTreeNode {
    fn new(function: &str, args: &Map<String, JsonValue>) -> Self {
        RecursionTreeNode {
            function: function.to_string(),
            args: args.clone(),
            children: Vec::new(),
            return_value: None,
        }
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(RecursionTreeNode::size).sum::<usize>()
    }

    /// Nodes in pre-order.
    pub fn preorder(&self) -> Vec<&RecursionTreeNode> {
        let mut out = Vec::with_capacity(self.size());
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            out.push(node);
            pending.extend(node.children.iter().rev());
        }
        out
    }
}

/// Reduces `call`/`return` events to a call tree.
///
/// Each call becomes a child of the innermost open call; each return closes
/// it. The tree is rooted at the first top-level call: the recursion tracer
/// records a single entry call, so any later top-level calls are not part of
/// the tree and are discarded once the root returns. When the root never
/// returned the still-open calls are closed in place, giving a partial tree
/// rooted at the earliest unreturned call. Unmatched returns are ignored.
pub fn build_recursion_tree(events: &[TraceEvent]) -> Option<RecursionTreeNode> {
    let mut stack: Vec<RecursionTreeNode> = Vec::new();
    for event in events {
        match &event.kind {
            EventKind::Call {
                function, locals, ..
            } => stack.push(RecursionTreeNode::new(function, locals)),
            EventKind::Return { return_value, .. } => {
                let Some(mut node) = stack.pop() else {
                    continue;
                };
                node.return_value = Some(return_value.clone());
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Some(node),
                }
            }
            _ => {}
        }
    }
    let mut open = stack.pop()?;
    while let Some(mut parent) = stack.pop() {
        parent.children.push(open);
        open = parent;
    }
    Some(open)
}

/// The table carried by the last `table_update` or `row_complete` event.
pub fn final_table(events: &[TraceEvent]) -> Option<JsonValue> {
    events.iter().rev().find_map(|event| match &event.kind {
        EventKind::TableUpdate { table, .. } | EventKind::RowComplete { table, .. } => {
            Some(table.clone())
        }
        _ => None,
    })
}

/// Nodes in the order a traversal reached them: `visit` steps for BFS,
/// `call` steps for DFS.
pub fn traversal_order(events: &[TraceEvent]) -> Vec<JsonValue> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::GraphStep {
                step: GraphStepKind::Visit | GraphStepKind::Call,
                node: Some(node),
                ..
            } => Some(node.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(seq: u64, function: &str, n: i64) -> TraceEvent {
        let mut locals = Map::new();
        locals.insert("n".into(), json!(n));
        TraceEvent {
            seq,
            kind: EventKind::Call {
                function: function.into(),
                line: 1,
                frame_id: seq + 1,
                depth: 1,
                locals,
            },
        }
    }

    fn ret(seq: u64, value: &str) -> TraceEvent {
        TraceEvent {
            seq,
            kind: EventKind::Return {
                function: "f".into(),
                line: 2,
                frame_id: 0,
                depth: 1,
                return_value: value.into(),
                locals: Map::new(),
            },
        }
    }

    #[test]
    fn balanced_events_build_a_full_tree() {
        let events = vec![
            call(0, "f", 2),
            call(1, "f", 1),
            ret(2, "1"),
            call(3, "f", 0),
            ret(4, "0"),
            ret(5, "1"),
        ];
        let tree = build_recursion_tree(&events).unwrap();
        assert_eq!(tree.args["n"], json!(2));
        assert_eq!(tree.return_value.as_deref(), Some("1"));
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[1].args["n"], json!(0));
        let order: Vec<&JsonValue> = tree.preorder().into_iter().map(|n| &n.args["n"]).collect();
        assert_eq!(order, vec![&json!(2), &json!(1), &json!(0)]);
    }

    #[test]
    fn truncated_events_yield_a_partial_tree() {
        let events = vec![call(0, "f", 3), call(1, "f", 2), ret(2, "2"), call(3, "f", 1)];
        let tree = build_recursion_tree(&events).unwrap();
        assert_eq!(tree.args["n"], json!(3));
        assert_eq!(tree.return_value, None);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[1].return_value, None);
    }

    #[test]
    fn stray_returns_and_empty_input() {
        assert_eq!(build_recursion_tree(&[]), None);
        let tree = build_recursion_tree(&[ret(0, "9"), call(1, "g", 1), ret(2, "1")]).unwrap();
        assert_eq!(tree.function, "g");
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn first_top_level_call_is_the_root() {
        let events = vec![call(0, "f", 1), ret(1, "1"), call(2, "f", 5), ret(3, "5")];
        let tree = build_recursion_tree(&events).unwrap();
        assert_eq!(tree.args["n"], json!(1));
        assert_eq!(tree.size(), 1);
        assert_eq!(tree.preorder().len(), 1);
    }

    #[test]
    fn final_table_and_traversal_order() {
        let events = vec![
            TraceEvent {
                seq: 0,
                kind: EventKind::TableUpdate {
                    name: "dp".into(),
                    index: None,
                    value: json!(1),
                    table: json!([1]),
                },
            },
            TraceEvent {
                seq: 1,
                kind: EventKind::RowComplete {
                    name: "dp".into(),
                    row: 0,
                    table: json!([[1, 2]]),
                },
            },
            TraceEvent {
                seq: 2,
                kind: EventKind::GraphStep {
                    step: GraphStepKind::Visit,
                    node: Some(json!("a")),
                    from: None,
                    to: None,
                    frontier: vec![],
                    visited: vec![json!("a")],
                    depth: None,
                },
            },
        ];
        assert_eq!(final_table(&events), Some(json!([[1, 2]])));
        assert_eq!(final_table(&events[2..]), None);
        assert_eq!(traversal_order(&events), vec![json!("a")]);
    }
}
