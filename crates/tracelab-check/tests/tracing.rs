//! End-to-end tracer scenarios through the public `run_trace` entry point.
//!
//! Tests cover:
//! - Bottom-up DP replay of a fixed table
//! - BFS visit order and final visited set
//! - Recursion tracing feeding the tree builder
//! - Top-down memo tracing feeding the table extractor
//! - DFS traversal order

use serde_json::json;

use tracelab_check::builders::{build_recursion_tree, final_table, traversal_order};
use tracelab_check::tracer::{
    resolve_entry, run_trace, EventKind, GraphStepKind, TableDimension, TraceConfig, TraceInput,
    TraceReport, TraceStatus, TracerKind,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn trace(kind: TracerKind, source: &str) -> TraceReport {
    let entry = resolve_entry(source, None, None);
    let input = TraceInput {
        source,
        stdin: "",
        entry: &entry,
    };
    run_trace(kind, &input, &TraceConfig::default())
}

// ---------------------------------------------------------------------------
// DP
// ---------------------------------------------------------------------------

#[test]
fn fixed_one_dimensional_table() {
    let report = trace(TracerKind::DpBottomUp, "dp = [1, 2, 3]\n");
    assert_eq!(report.status, TraceStatus::Completed);
    assert_eq!(report.events.len(), 4);

    let inits: Vec<_> = report
        .events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::TableInit { .. }))
        .collect();
    assert_eq!(inits.len(), 1);
    assert!(matches!(
        inits[0].kind,
        EventKind::TableInit {
            dimension: TableDimension::OneD,
            rows: 3,
            ..
        }
    ));

    for event in &report.events[1..] {
        match &event.kind {
            EventKind::TableUpdate { table, .. } => assert_eq!(table, &json!([1, 2, 3])),
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(final_table(&report.events), Some(json!([1, 2, 3])));
}

#[test]
fn memo_table_is_extracted_from_top_down_trace() {
    let source = "\
memo = {}
def climb(n):
    if n <= 2:
        return n
    if n not in memo:
        memo[n] = climb(n - 1) + climb(n - 2)
    return memo[n]

climb(5)
";
    let report = trace(TracerKind::DpTopDown, source);
    assert_eq!(report.status, TraceStatus::Completed);
    assert_eq!(
        final_table(&report.events),
        Some(json!({"3": 3, "4": 5, "5": 8}))
    );
}

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

#[test]
fn bfs_visits_in_breadth_first_order() {
    let report = trace(
        TracerKind::GraphBfs,
        "graph = {\"a\": [\"b\", \"c\"], \"b\": [\"c\"], \"c\": []}\n",
    );
    let visits: Vec<_> = report
        .events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::GraphStep {
                step: GraphStepKind::Visit,
                node,
                ..
            } => node.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(visits, vec![json!("a"), json!("b"), json!("c")]);

    match &report.events.last().unwrap().kind {
        EventKind::GraphStep { visited, .. } => {
            assert_eq!(visited, &vec![json!("a"), json!("b"), json!("c")])
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(traversal_order(&report.events), visits);
}

#[test]
fn dfs_order_follows_first_neighbors() {
    let report = trace(
        TracerKind::GraphDfs,
        "graph = {1: [2, 3], 2: [4], 3: [], 4: []}\n",
    );
    assert_eq!(
        traversal_order(&report.events),
        vec![json!(1), json!(2), json!(4), json!(3)]
    );
}

// ---------------------------------------------------------------------------
// Recursion
// ---------------------------------------------------------------------------

#[test]
fn recursion_trace_builds_a_call_tree() {
    let source = "\
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)

print(fib(3))
";
    let report = trace(TracerKind::Recursion, source);
    assert_eq!(report.status, TraceStatus::Completed);
    assert_eq!(report.result.as_deref(), Some("2"));

    let tree = build_recursion_tree(&report.events).unwrap();
    assert_eq!(tree.function, "fib");
    assert_eq!(tree.args["n"], json!(3));
    assert_eq!(tree.return_value.as_deref(), Some("2"));
    assert_eq!(tree.size(), 5);

    let first = serde_json::to_string(&tree).unwrap();
    let second = serde_json::to_string(&build_recursion_tree(&report.events).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn recursion_limit_is_reported_as_an_error() {
    let report = trace(
        TracerKind::Recursion,
        "def down(n):\n    return down(n + 1)\n",
    );
    assert_eq!(report.status, TraceStatus::Error);
    match &report.events.last().unwrap().kind {
        EventKind::Error { message, .. } => assert!(message.starts_with("RecursionError")),
        other => panic!("unexpected event {:?}", other),
    }
    let tree = build_recursion_tree(&report.events).unwrap();
    assert_eq!(tree.return_value, None);
}
