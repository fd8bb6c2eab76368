//! Graph traversal tracers.
//!
//! The program is run to completion, then its `graph` binding (a dict from
//! node to a list of neighbors) is traversed from its first key. Traversal
//! happens over an owned copy, so the events describe the graph as the
//! program left it.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value as JsonValue;
use tracelab_core::Program;

use super::event::{EventKind, GraphStepKind};
use super::recorder::EventRecorder;
use super::snapshot::snapshot;
use super::{conclude, interpreter, run_unobserved, TraceConfig, TraceError, TraceReport};
use crate::interpreter::{Key, Value};

/// Name of the adjacency binding.
pub const GRAPH_NAME: &str = "graph";

type Adjacency = IndexMap<Key, Vec<Key>>;

fn load_graph(globals: &IndexMap<String, Value>) -> Result<Adjacency, TraceError> {
    let graph = globals.get(GRAPH_NAME).ok_or(TraceError::MissingGraph)?;
    let Value::Dict(entries) = graph else {
        return Err(TraceError::InvalidGraph);
    };
    let entries = entries.borrow();
    if entries.is_empty() {
        return Err(TraceError::InvalidGraph);
    }
    let mut adjacency = IndexMap::with_capacity(entries.len());
    for (node, neighbors) in entries.iter() {
        let neighbors = match neighbors {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.to_vec(),
            _ => return Err(TraceError::InvalidGraph),
        };
        let neighbors = neighbors
            .iter()
            .map(Key::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| TraceError::InvalidGraph)?;
        adjacency.insert(node.clone(), neighbors);
    }
    Ok(adjacency)
}

fn node(key: &Key) -> JsonValue {
    snapshot(&key.to_value())
}

fn nodes<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Vec<JsonValue> {
    keys.into_iter().map(node).collect()
}

fn run_graph_trace(
    program: &Program,
    stdin: &str,
    config: &TraceConfig,
    traverse: fn(&Adjacency, &mut EventRecorder),
) -> TraceReport {
    let mut interp = interpreter(stdin, config);
    let mut recorder = EventRecorder::new(config.event_budget);
    let outcome = run_unobserved(&mut interp, program)
        .and_then(|()| load_graph(interp.globals()))
        .map(|graph| {
            traverse(&graph, &mut recorder);
            None
        });
    conclude(recorder, &interp, outcome)
}

/// Breadth-first traversal from the first key.
pub fn trace_bfs(program: &Program, stdin: &str, config: &TraceConfig) -> TraceReport {
    run_graph_trace(program, stdin, config, bfs)
}

/// Depth-first traversal from the first key.
pub fn trace_dfs(program: &Program, stdin: &str, config: &TraceConfig) -> TraceReport {
    run_graph_trace(program, stdin, config, dfs)
}

fn bfs(graph: &Adjacency, recorder: &mut EventRecorder) {
    let Some(start) = graph.keys().next() else {
        return;
    };
    let mut queue: VecDeque<Key> = VecDeque::from([start.clone()]);
    let mut visited: IndexSet<Key> = IndexSet::from([start.clone()]);

    let init = EventKind::GraphStep {
        step: GraphStepKind::Init,
        node: Some(node(start)),
        from: None,
        to: None,
        frontier: nodes(&queue),
        visited: nodes(&visited),
        depth: None,
    };
    if !recorder.push(init) {
        return;
    }

    while let Some(current) = queue.pop_front() {
        let visit = EventKind::GraphStep {
            step: GraphStepKind::Visit,
            node: Some(node(&current)),
            from: None,
            to: None,
            frontier: nodes(&queue),
            visited: nodes(&visited),
            depth: None,
        };
        if !recorder.push(visit) {
            return;
        }
        for neighbor in graph.get(&current).map(Vec::as_slice).unwrap_or_default() {
            if !visited.insert(neighbor.clone()) {
                continue;
            }
            queue.push_back(neighbor.clone());
            let edge = EventKind::GraphStep {
                step: GraphStepKind::Edge,
                node: None,
                from: Some(node(&current)),
                to: Some(node(neighbor)),
                frontier: nodes(&queue),
                visited: nodes(&visited),
                depth: None,
            };
            if !recorder.push(edge) {
                return;
            }
        }
    }
}

fn dfs(graph: &Adjacency, recorder: &mut EventRecorder) {
    if let Some(start) = graph.keys().next() {
        let mut stack = Vec::new();
        let mut visited = IndexSet::new();
        dfs_visit(graph, start, &mut stack, &mut visited, recorder);
    }
}

/// Returns `false` once the recorder stops accepting events.
fn dfs_visit(
    graph: &Adjacency,
    current: &Key,
    stack: &mut Vec<Key>,
    visited: &mut IndexSet<Key>,
    recorder: &mut EventRecorder,
) -> bool {
    visited.insert(current.clone());
    stack.push(current.clone());
    let call = EventKind::GraphStep {
        step: GraphStepKind::Call,
        node: Some(node(current)),
        from: None,
        to: None,
        frontier: nodes(stack.iter()),
        visited: nodes(visited.iter()),
        depth: Some(stack.len()),
    };
    if !recorder.push(call) {
        return false;
    }

    for neighbor in graph.get(current).map(Vec::as_slice).unwrap_or_default() {
        let edge = EventKind::GraphStep {
            step: GraphStepKind::Edge,
            node: None,
            from: Some(node(current)),
            to: Some(node(neighbor)),
            frontier: nodes(stack.iter()),
            visited: nodes(visited.iter()),
            depth: Some(stack.len()),
        };
        if !recorder.push(edge) {
            return false;
        }
        if !visited.contains(neighbor) && !dfs_visit(graph, neighbor, stack, visited, recorder) {
            return false;
        }
    }

    stack.pop();
    recorder.push(EventKind::GraphStep {
        step: GraphStepKind::Return,
        node: Some(node(current)),
        from: None,
        to: None,
        frontier: nodes(stack.iter()),
        visited: nodes(visited.iter()),
        depth: Some(stack.len()),
    })
}
