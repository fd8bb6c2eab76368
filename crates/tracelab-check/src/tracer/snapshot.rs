//! Deep value copies for embedding in events.
//!
//! Values are converted to JSON: primitives map directly, sequences (list,
//! tuple, set, deque, small ranges) become arrays and dicts become objects
//! with stringified keys. Anything without a JSON form (functions, modules,
//! non-finite floats) becomes a short text description instead of being
//! dropped.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value as JsonValue};

use crate::interpreter::value::{format_float, range_len, Key};
use crate::interpreter::Value;

/// Nesting depth past which containers are elided.
pub const MAX_DEPTH: usize = 32;

/// Placeholder for elided or self-referencing containers.
pub const ELIDED: &str = "<...>";

/// Ranges longer than this are described rather than expanded.
pub const MAX_RANGE_ITEMS: i64 = 1000;

/// Deep copy of `value` as JSON.
pub fn snapshot(value: &Value) -> JsonValue {
    let mut open = Vec::new();
    snap(value, 0, &mut open)
}

fn snap(value: &Value, depth: usize, open: &mut Vec<usize>) -> JsonValue {
    if let Some(addr) = value.container_addr() {
        if depth >= MAX_DEPTH || open.contains(&addr) {
            return JsonValue::String(ELIDED.to_string());
        }
    }
    match value {
        Value::None => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::Number((*i).into()),
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => JsonValue::Number(n),
            None => JsonValue::String(format_float(*f)),
        },
        Value::Str(s) => JsonValue::String(s.to_string()),
        Value::List(items) => nested(value, open, |open| {
            items.borrow().iter().map(|v| snap(v, depth + 1, open)).collect()
        }),
        Value::Deque(items) => nested(value, open, |open| {
            items.borrow().iter().map(|v| snap(v, depth + 1, open)).collect()
        }),
        Value::Tuple(items) => nested(value, open, |open| {
            items.iter().map(|v| snap(v, depth + 1, open)).collect()
        }),
        Value::Set(items) => {
            let items: Vec<Value> = items.borrow().iter().map(Key::to_value).collect();
            JsonValue::Array(items.iter().map(|v| snap(v, depth + 1, open)).collect())
        }
        Value::Dict(entries) => {
            let Some(addr) = value.container_addr() else {
                return JsonValue::Null;
            };
            open.push(addr);
            let mut map = Map::new();
            for (k, v) in entries.borrow().iter() {
                map.insert(key_text(k), snap(v, depth + 1, open));
            }
            open.pop();
            JsonValue::Object(map)
        }
        Value::Range { start, stop, step } => {
            let len = range_len(*start, *stop, *step);
            if len > MAX_RANGE_ITEMS {
                JsonValue::String(value.repr())
            } else {
                JsonValue::Array(
                    (0..len)
                        .map(|i| JsonValue::Number((start + step * i).into()))
                        .collect(),
                )
            }
        }
        Value::Function(_) | Value::Builtin(_) | Value::Method(_) | Value::Module(_) => {
            JsonValue::String(value.repr())
        }
    }
}

fn nested(
    value: &Value,
    open: &mut Vec<usize>,
    items: impl FnOnce(&mut Vec<usize>) -> Vec<JsonValue>,
) -> JsonValue {
    let addr = value.container_addr().unwrap_or_default();
    open.push(addr);
    let out = items(open);
    open.pop();
    JsonValue::Array(out)
}

/// Object key for a dict key: strings verbatim, everything else as `str()`.
pub fn key_text(key: &Key) -> String {
    match key {
        Key::Str(s) => s.to_string(),
        other => other.to_value().to_str(),
    }
}

/// Snapshot of a frame's bindings, sorted by name, dunder names excluded.
pub fn bindings_snapshot(bindings: &IndexMap<String, Value>) -> Map<String, JsonValue> {
    let mut names: Vec<&String> = bindings
        .keys()
        .filter(|name| !name.starts_with("__"))
        .collect();
    names.sort();
    let mut out = Map::new();
    for name in names {
        if let Some(value) = bindings.get(name) {
            out.insert(name.clone(), snapshot(value));
        }
    }
    out
}

/// Bindings in `current` that are new or differ from `previous`.
pub fn changed_bindings(
    previous: Option<&Map<String, JsonValue>>,
    current: &Map<String, JsonValue>,
) -> Map<String, JsonValue> {
    current
        .iter()
        .filter(|(name, value)| previous.and_then(|p| p.get(*name)) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn containers_become_json() {
        let mut entries = IndexMap::new();
        entries.insert(Key::Int(1), Value::tuple(vec![Value::Int(2), Value::str("x")]));
        entries.insert(Key::Str("inf".into()), Value::Float(f64::INFINITY));
        let dict = Value::dict(entries);
        assert_eq!(snapshot(&dict), json!({"1": [2, "x"], "inf": "inf"}));
        let range = Value::Range {
            start: 0,
            stop: 6,
            step: 2,
        };
        assert_eq!(snapshot(&range), json!([0, 2, 4]));
    }

    #[test]
    fn snapshots_are_copies() {
        let list = Value::list(vec![Value::Int(1)]);
        let before = snapshot(&list);
        if let Value::List(items) = &list {
            items.borrow_mut().push(Value::Int(2));
        }
        assert_eq!(before, json!([1]));
        assert_eq!(snapshot(&list), json!([1, 2]));
    }

    #[test]
    fn cycles_and_depth_are_elided() {
        let list = Value::list(Vec::new());
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(snapshot(&list), json!(["<...>"]));

        let mut deep = Value::list(Vec::new());
        for _ in 0..40 {
            deep = Value::list(vec![deep]);
        }
        let mut cursor = &snapshot(&deep);
        let mut levels = 0;
        while let JsonValue::Array(items) = cursor {
            cursor = &items[0];
            levels += 1;
        }
        assert_eq!(levels, MAX_DEPTH);
        assert_eq!(cursor, &json!(ELIDED));
    }

    #[test]
    fn bindings_are_sorted_and_diffed() {
        let mut frame = IndexMap::new();
        frame.insert("b".to_string(), Value::Int(2));
        frame.insert("__name__".to_string(), Value::str("m"));
        frame.insert("a".to_string(), Value::Int(1));
        let first = bindings_snapshot(&frame);
        assert_eq!(first.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        frame.insert("a".to_string(), Value::Int(5));
        let second = bindings_snapshot(&frame);
        let changed = changed_bindings(Some(&first), &second);
        assert_eq!(JsonValue::Object(changed), json!({"a": 5}));
        assert_eq!(changed_bindings(None, &second).len(), 2);
    }
}
