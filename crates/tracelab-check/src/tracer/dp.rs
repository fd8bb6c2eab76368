//! Dynamic-programming table tracers.
//!
//! Bottom-up tables are read from the final module bindings and replayed
//! cell by cell. Top-down memo tables are watched live: the memo mapping is
//! snapshotted at every statement and each distinct state is reported once.

use std::cmp::Ordering;
use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use tracelab_core::Program;

use super::event::{EventKind, TableDimension, TableIndex};
use super::recorder::EventRecorder;
use super::snapshot::{key_text, snapshot};
use super::{conclude, interpreter, run_unobserved, TraceConfig, TraceError, TraceInput, TraceReport};
use crate::interpreter::{ExecutionHook, FrameView, Key, Value};

/// Name of the bottom-up table binding.
pub const TABLE_NAME: &str = "dp";

/// Binding names watched by the top-down tracer, in lookup order.
pub const MEMO_NAMES: [&str; 3] = ["memo", "cache", "dp"];

/// Runs the module, then replays the final `dp` table.
pub fn trace_bottom_up(program: &Program, stdin: &str, config: &TraceConfig) -> TraceReport {
    let mut interp = interpreter(stdin, config);
    let mut recorder = EventRecorder::new(config.event_budget);
    let outcome = run_unobserved(&mut interp, program)
        .and_then(|()| replay_table(interp.globals(), &mut recorder))
        .map(|()| None);
    conclude(recorder, &interp, outcome)
}

fn replay_table(
    globals: &IndexMap<String, Value>,
    recorder: &mut EventRecorder,
) -> Result<(), TraceError> {
    let table = globals.get(TABLE_NAME).ok_or(TraceError::MissingTable)?;
    let rows = match table {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        _ => return Err(TraceError::TableNotSequence),
    };
    let full = snapshot(table);
    let two_d = rows
        .first()
        .is_some_and(|row| matches!(row, Value::List(_) | Value::Tuple(_)));

    if !two_d {
        let init = EventKind::TableInit {
            name: TABLE_NAME.to_string(),
            dimension: TableDimension::OneD,
            rows: rows.len(),
            cols: None,
        };
        if !recorder.push(init) {
            return Ok(());
        }
        for (i, value) in rows.iter().enumerate() {
            let update = EventKind::TableUpdate {
                name: TABLE_NAME.to_string(),
                index: Some(TableIndex::Position(i)),
                value: snapshot(value),
                table: full.clone(),
            };
            if !recorder.push(update) {
                break;
            }
        }
        return Ok(());
    }

    let cols = rows.first().map(row_cells).unwrap_or_default().len();
    let init = EventKind::TableInit {
        name: TABLE_NAME.to_string(),
        dimension: TableDimension::TwoD,
        rows: rows.len(),
        cols: Some(cols),
    };
    if !recorder.push(init) {
        return Ok(());
    }
    for (i, row) in rows.iter().enumerate() {
        for (j, value) in row_cells(row).iter().enumerate() {
            let update = EventKind::TableUpdate {
                name: TABLE_NAME.to_string(),
                index: Some(TableIndex::Cell([i, j])),
                value: snapshot(value),
                table: full.clone(),
            };
            if !recorder.push(update) {
                return Ok(());
            }
        }
        let complete = EventKind::RowComplete {
            name: TABLE_NAME.to_string(),
            row: i,
            table: full.clone(),
        };
        if !recorder.push(complete) {
            return Ok(());
        }
    }
    Ok(())
}

fn row_cells(row: &Value) -> Vec<Value> {
    match row {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    }
}

struct MemoTracer {
    recorder: EventRecorder,
    last: HashMap<&'static str, Map<String, JsonValue>>,
    observed: bool,
}

impl MemoTracer {
    fn observe(&mut self, frame: &FrameView<'_>) {
        if self.recorder.is_truncated() {
            return;
        }
        for name in MEMO_NAMES {
            let Some(value) = frame.locals.get(name).or_else(|| frame.globals.get(name)) else {
                continue;
            };
            let Some(current) = memo_snapshot(value) else {
                continue;
            };
            let previous = self.last.get(name);
            if previous == Some(&current) {
                continue;
            }
            let changed: Vec<(&String, &JsonValue)> = current
                .iter()
                .filter(|(k, v)| previous.and_then(|p| p.get(*k)) != Some(*v))
                .collect();
            let (index, value) = match changed.as_slice() {
                [(key, value)] => (Some(TableIndex::Key((*key).clone())), (*value).clone()),
                _ => (None, JsonValue::Null),
            };
            self.observed = true;
            self.recorder.push(EventKind::TableUpdate {
                name: name.to_string(),
                index,
                value,
                table: JsonValue::Object(current.clone()),
            });
            self.last.insert(name, current);
        }
    }
}

impl ExecutionHook for MemoTracer {
    fn on_line(&mut self, frame: &FrameView<'_>) {
        self.observe(frame);
    }

    fn on_return(&mut self, frame: &FrameView<'_>, _value: &Value) {
        self.observe(frame);
    }
}

/// Sorted snapshot of a memo mapping, if it is a non-empty dict of
/// primitive keys to numeric, bool or `None` values.
fn memo_snapshot(value: &Value) -> Option<Map<String, JsonValue>> {
    let Value::Dict(entries) = value else {
        return None;
    };
    let entries = entries.borrow();
    if entries.is_empty() {
        return None;
    }
    let mut pairs: Vec<(&Key, &Value)> = Vec::with_capacity(entries.len());
    for (key, value) in entries.iter() {
        let key_ok = matches!(key, Key::Int(_) | Key::Bool(_) | Key::Str(_));
        let value_ok = matches!(
            value,
            Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::None
        );
        if !key_ok || !value_ok {
            return None;
        }
        pairs.push((key, value));
    }
    pairs.sort_by(|a, b| compare_keys(a.0, b.0));
    Some(
        pairs
            .into_iter()
            .map(|(key, value)| (key_text(key), snapshot(value)))
            .collect(),
    )
}

/// Numeric keys first in numeric order, then strings.
fn compare_keys(a: &Key, b: &Key) -> Ordering {
    fn rank(key: &Key) -> (u8, i64, &str) {
        match key {
            Key::Int(i) => (0, *i, ""),
            Key::Bool(b) => (0, i64::from(*b), ""),
            Key::Str(s) => (1, 0, &**s),
            _ => (2, 0, ""),
        }
    }
    rank(a).cmp(&rank(b))
}

/// Runs the module under the memo watcher; if that produced no table
/// update, calls the entry function as well.
pub fn trace_top_down(program: &Program, input: &TraceInput<'_>, config: &TraceConfig) -> TraceReport {
    let mut interp = interpreter(input.stdin, config);
    let mut tracer = MemoTracer {
        recorder: EventRecorder::new(config.event_budget),
        last: HashMap::new(),
        observed: false,
    };
    let outcome = (|| -> Result<Option<String>, TraceError> {
        interp.run_module(program, &mut tracer)?;
        if tracer.observed {
            return Ok(None);
        }
        let Some(name) = input.entry.function.as_deref() else {
            return Ok(None);
        };
        if !matches!(interp.globals().get(name), Some(Value::Function(_))) {
            return Ok(None);
        }
        let args = input
            .entry
            .args
            .iter()
            .map(Value::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        interp.call_function(name, args, &mut tracer)?;
        Ok(None)
    })();
    conclude(tracer.recorder, &interp, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::{resolve_entry, TraceStatus};
    use serde_json::json;
    use tracelab_core::parse_program;

    fn bottom_up(source: &str) -> TraceReport {
        let program = parse_program(source).unwrap();
        trace_bottom_up(&program, "", &TraceConfig::default())
    }

    fn top_down(source: &str) -> TraceReport {
        let program = parse_program(source).unwrap();
        let entry = resolve_entry(source, None, None);
        let input = TraceInput {
            source,
            stdin: "",
            entry: &entry,
        };
        trace_top_down(&program, &input, &TraceConfig::default())
    }

    #[test]
    fn one_dimensional_tables_replay_each_index() {
        let report = bottom_up("dp = [0] * 4\nfor i in range(4):\n    dp[i] = i * i\n");
        assert_eq!(report.status, TraceStatus::Completed);
        assert_eq!(report.events.len(), 5);
        assert_eq!(
            report.events[0].kind,
            EventKind::TableInit {
                name: "dp".into(),
                dimension: TableDimension::OneD,
                rows: 4,
                cols: None,
            }
        );
        match &report.events[4].kind {
            EventKind::TableUpdate { index, value, table, .. } => {
                assert_eq!(index, &Some(TableIndex::Position(3)));
                assert_eq!(value, &json!(9));
                assert_eq!(table, &json!([0, 1, 4, 9]));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn two_dimensional_tables_complete_rows() {
        let report = bottom_up("dp = [[1, 2], [3, 4]]\n");
        let kinds: Vec<&str> = report.events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            kinds,
            vec![
                "table_init",
                "table_update",
                "table_update",
                "row_complete",
                "table_update",
                "table_update",
                "row_complete"
            ]
        );
        assert!(matches!(
            report.events[0].kind,
            EventKind::TableInit { dimension: TableDimension::TwoD, rows: 2, cols: Some(2), .. }
        ));
        assert!(matches!(
            &report.events[5].kind,
            EventKind::TableUpdate { index: Some(TableIndex::Cell([1, 1])), .. }
        ));
    }

    #[test]
    fn missing_or_malformed_tables_are_input_errors() {
        let report = bottom_up("x = 1\n");
        assert_eq!(report.status, TraceStatus::Error);
        assert_eq!(
            report.events[0].kind,
            EventKind::Error {
                message: "dp table not found (bottom-up DP requires 'dp')".into(),
                line: None,
            }
        );
        let report = bottom_up("dp = {}\n");
        assert!(matches!(
            &report.events[0].kind,
            EventKind::Error { message, .. } if message == "dp must be a list for bottom-up DP visualization"
        ));
    }

    const MEMO_FIB: &str = "\
memo = {}
def fib(n):
    if n in memo:
        return memo[n]
    if n <= 1:
        return n
    memo[n] = fib(n - 1) + fib(n - 2)
    return memo[n]
";

    #[test]
    fn module_level_memo_is_watched_through_the_entry_call() {
        let report = top_down(MEMO_FIB);
        assert_eq!(report.status, TraceStatus::Completed);
        let tables: Vec<&JsonValue> = report
            .events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::TableUpdate { table, .. } => Some(table),
                _ => None,
            })
            .collect();
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[0], &json!({"2": 1}));
        assert_eq!(tables[2], &json!({"2": 1, "3": 2, "4": 3}));
        match &report.events[1].kind {
            EventKind::TableUpdate { index, value, .. } => {
                assert_eq!(index, &Some(TableIndex::Key("3".into())));
                assert_eq!(value, &json!(2));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn local_memo_with_numeric_keys_is_sorted() {
        let source = "\
def build():
    cache = {}
    cache[10] = 1
    cache[2] = 2
    return cache

build()
";
        let report = top_down(source);
        let last = report
            .events
            .iter()
            .rev()
            .find_map(|e| match &e.kind {
                EventKind::TableUpdate { table, .. } => Some(table.clone()),
                _ => None,
            })
            .unwrap();
        let keys: Vec<&String> = last.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["2", "10"]);
    }

    #[test]
    fn non_primitive_memo_values_are_ignored() {
        let report = top_down("memo = {1: [1, 2]}\nx = 1\n");
        assert_eq!(report.status, TraceStatus::Completed);
        assert!(report.events.is_empty());
    }
}
