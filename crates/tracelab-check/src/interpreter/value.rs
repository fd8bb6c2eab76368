//! Runtime value representation for the Tracelang interpreter.
//!
//! Containers have reference semantics (`Rc<RefCell<..>>`), matching the
//! aliasing behavior submitted programs expect: appending to a list seen
//! through two names mutates one shared list. Tracers never hold on to these
//! values; they copy them out through [`crate::tracer::snapshot`].

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use tracelab_core::FunctionDef;

use super::builtins::Builtin;
use super::error::RuntimeError;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictRef = Rc<RefCell<IndexMap<Key, Value>>>;
pub type SetRef = Rc<RefCell<IndexSet<Key>>>;
pub type DequeRef = Rc<RefCell<VecDeque<Value>>>;

/// A runtime value produced by expression evaluation.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(ListRef),
    Tuple(Rc<[Value]>),
    /// Insertion-ordered mapping.
    Dict(DictRef),
    /// Insertion-ordered set.
    Set(SetRef),
    Deque(DequeRef),
    /// Lazy `range(start, stop, step)`; `step` is never zero.
    Range {
        start: i64,
        stop: i64,
        step: i64,
    },
    Function(Rc<Function>),
    Builtin(Builtin),
    /// A method looked up on a receiver, e.g. `xs.append`.
    Method(Rc<BoundMethod>),
    Module(Module),
}

/// A user-defined function: its definition plus defaults evaluated at
/// definition time and, for nested definitions, the enclosing bindings.
#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
    pub captured: Option<Rc<IndexMap<String, Value>>>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

/// Importable standard modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Math,
    Sys,
    Stdin,
    Collections,
    Functools,
    Heapq,
}

impl Module {
    pub fn from_name(name: &str) -> Option<Module> {
        Some(match name {
            "math" => Module::Math,
            "sys" => Module::Sys,
            "collections" => Module::Collections,
            "functools" => Module::Functools,
            "heapq" => Module::Heapq,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Module::Math => "math",
            Module::Sys => "sys",
            Module::Stdin => "sys.stdin",
            Module::Collections => "collections",
            Module::Functools => "functools",
            Module::Heapq => "heapq",
        }
    }

    /// Resolves `module.name`.
    pub fn attribute(self, name: &str) -> Option<Value> {
        let value = match (self, name) {
            (Module::Math, "inf") => Value::Float(f64::INFINITY),
            (Module::Math, "pi") => Value::Float(std::f64::consts::PI),
            (Module::Math, "e") => Value::Float(std::f64::consts::E),
            (Module::Sys, "maxsize") => Value::Int(i64::MAX),
            (Module::Sys, "stdin") => Value::Module(Module::Stdin),
            (module, name) => Value::Builtin(Builtin::from_module(module, name)?),
        };
        Some(value)
    }
}

/// A hashable dictionary key or set element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    /// Non-integral float, stored by bit pattern.
    Float(u64),
    Str(Rc<str>),
    Tuple(Rc<[Key]>),
}

impl Key {
    /// Converts a value to a key, rejecting mutable containers.
    pub fn from_value(value: &Value) -> Result<Key, RuntimeError> {
        Ok(match value {
            Value::None => Key::None,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Key::Int(*f as i64)
                } else {
                    Key::Float(f.to_bits())
                }
            }
            Value::Str(s) => Key::Str(s.clone()),
            Value::Tuple(items) => Key::Tuple(
                items
                    .iter()
                    .map(Key::from_value)
                    .collect::<Result<Vec<_>, _>>()?
                    .into(),
            ),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )))
            }
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Tuple(items) => Value::Tuple(items.iter().map(Key::to_value).collect()),
        }
    }
}

/// Numeric view used by arithmetic and comparisons; `bool` counts as int.
#[derive(Debug, Clone, Copy)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items.into())
    }

    pub fn dict(entries: IndexMap<Key, Value>) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn set(items: IndexSet<Key>) -> Value {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    pub fn deque(items: VecDeque<Value>) -> Value {
        Value::Deque(Rc::new(RefCell::new(items)))
    }

    /// Converts a JSON value (e.g. an entry argument) into a runtime value.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, RuntimeError> {
        Ok(match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::str(s.as_str()),
            serde_json::Value::Array(items) => Value::list(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            serde_json::Value::Object(map) => {
                let mut entries = IndexMap::new();
                for (k, v) in map {
                    entries.insert(Key::Str(k.as_str().into()), Value::from_json(v)?);
                }
                Value::dict(entries)
            }
        })
    }

    /// Python-style type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Deque(_) => "deque",
            Value::Range { .. } => "range",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Method(_) => "method",
            Value::Module(_) => "module",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::Deque(d) => !d.borrow().is_empty(),
            Value::Range { start, stop, step } => range_len(*start, *stop, *step) > 0,
            Value::Function(_) | Value::Builtin(_) | Value::Method(_) | Value::Module(_) => true,
        }
    }

    pub fn as_num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Integer view for indices and counts (`bool` included).
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Address of the shared container, for cycle detection and `is`.
    pub fn container_addr(&self) -> Option<usize> {
        match self {
            Value::List(l) => Some(Rc::as_ptr(l) as *const () as usize),
            Value::Dict(d) => Some(Rc::as_ptr(d) as *const () as usize),
            Value::Set(s) => Some(Rc::as_ptr(s) as *const () as usize),
            Value::Deque(d) => Some(Rc::as_ptr(d) as *const () as usize),
            Value::Tuple(t) => Some(t.as_ptr() as *const () as usize),
            Value::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            Value::Method(m) => Some(Rc::as_ptr(m) as *const () as usize),
            _ => None,
        }
    }

    /// `str(value)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, &mut Vec::new());
        out
    }

    fn write_repr(&self, out: &mut String, seen: &mut Vec<usize>) {
        if let Some(addr) = self.container_addr() {
            if seen.contains(&addr) {
                out.push_str(match self {
                    Value::Dict(_) => "{...}",
                    _ => "[...]",
                });
                return;
            }
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => out.push_str(&quote_str(s)),
            Value::List(items) => {
                seen.push(self.container_addr().unwrap_or_default());
                write_seq(out, "[", "]", items.borrow().iter(), seen);
                seen.pop();
            }
            Value::Tuple(items) => {
                if items.len() == 1 {
                    out.push('(');
                    items[0].write_repr(out, seen);
                    out.push_str(",)");
                } else {
                    write_seq(out, "(", ")", items.iter(), seen);
                }
            }
            Value::Deque(items) => {
                seen.push(self.container_addr().unwrap_or_default());
                write_seq(out, "deque([", "])", items.borrow().iter(), seen);
                seen.pop();
            }
            Value::Dict(entries) => {
                seen.push(self.container_addr().unwrap_or_default());
                out.push('{');
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.to_value().write_repr(out, seen);
                    out.push_str(": ");
                    v.write_repr(out, seen);
                }
                out.push('}');
                seen.pop();
            }
            Value::Set(items) => {
                let items = items.borrow();
                if items.is_empty() {
                    out.push_str("set()");
                } else {
                    let values: Vec<Value> = items.iter().map(Key::to_value).collect();
                    write_seq(out, "{", "}", values.iter(), seen);
                }
            }
            Value::Range { start, stop, step } => {
                if *step == 1 {
                    out.push_str(&format!("range({}, {})", start, stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", start, stop, step));
                }
            }
            Value::Function(f) => out.push_str(&format!("<function {}>", f.def.name)),
            Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name())),
            Value::Method(m) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                m.name,
                m.receiver.type_name()
            )),
            Value::Module(m) => out.push_str(&format!("<module '{}'>", m.name())),
        }
    }
}

fn write_seq<'a>(
    out: &mut String,
    open: &str,
    close: &str,
    items: impl Iterator<Item = &'a Value>,
    seen: &mut Vec<usize>,
) {
    out.push_str(open);
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, seen);
    }
    out.push_str(close);
}

/// Formats a float the way Python's `repr` does: `1.0`, `0.1`, `1e-05`,
/// `1e+16`, `inf`, `nan`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let formatted = format!("{:e}", f);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exponent),
        };
        return format!("{}e{}{:0>2}", mantissa, sign, digits);
    }
    if f.fract() == 0.0 {
        return format!("{:.1}", f);
    }
    format!("{}", f)
}

/// Python-style string repr: single quotes unless the text contains a
/// single quote and no double quote.
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Number of elements produced by `range(start, stop, step)`.
pub fn range_len(start: i64, stop: i64, step: i64) -> i64 {
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let len = if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / (-step)
    } else {
        0
    };
    len.min(i64::MAX as i128) as i64
}

/// Structural equality (`==`), with numeric cross-type comparison.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_num(), b.as_num()) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => x == y,
            (x, y) => x.as_f64() == y.as_f64(),
        };
    }
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            Rc::ptr_eq(x, y) || seq_equal(&x.borrow(), &y.borrow())
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_equal(x, y),
        (Value::Deque(x), Value::Deque(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().all(|k| y.contains(k))
        }
        (
            Value::Range {
                start: a1,
                stop: b1,
                step: c1,
            },
            Value::Range {
                start: a2,
                stop: b2,
                step: c2,
            },
        ) => (a1, b1, c1) == (a2, b2, c2),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Module(x), Value::Module(y)) => x == y,
        _ => false,
    }
}

fn seq_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// Ordering for `< <= > >=`, `sorted`, `min`, `max`.
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
    if let (Some(x), Some(y)) = (a.as_num(), b.as_num()) {
        return Ok(match (x, y) {
            (Num::Int(x), Num::Int(y)) => x.cmp(&y),
            (x, y) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        });
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => compare_seq(&x.borrow(), &y.borrow()),
        (Value::Tuple(x), Value::Tuple(y)) => compare_seq(x, y),
        _ => Err(RuntimeError::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn compare_seq(a: &[Value], b: &[Value]) -> Result<Ordering, RuntimeError> {
    for (x, y) in a.iter().zip(b) {
        if !values_equal(x, y) {
            return compare_values(x, y);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_repr_matches_python() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(1e-5), "1e-05");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(-0.0), "-0.0");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn container_repr() {
        let inner = Value::tuple(vec![Value::Int(1)]);
        let list = Value::list(vec![Value::str("a"), inner, Value::None, Value::Float(0.5)]);
        assert_eq!(list.repr(), "['a', (1,), None, 0.5]");
        assert_eq!(Value::str("it's").repr(), "\"it's\"");
        assert_eq!(Value::set(IndexSet::new()).repr(), "set()");
        assert_eq!(
            Value::Range {
                start: 0,
                stop: 5,
                step: 1
            }
            .repr(),
            "range(0, 5)"
        );
    }

    #[test]
    fn self_referencing_list_repr_terminates() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(inner) = &list {
            inner.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr(), "[1, [...]]");
        if let Value::List(inner) = &list {
            inner.borrow_mut().clear();
        }
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(values_equal(&Value::Bool(true), &Value::Int(1)));
        assert!(!values_equal(&Value::str("1"), &Value::Int(1)));
        assert_eq!(
            Key::from_value(&Value::Float(2.0)).unwrap(),
            Key::from_value(&Value::Int(2)).unwrap()
        );
    }

    #[test]
    fn ordering_of_mixed_types_is_a_type_error() {
        assert!(compare_values(&Value::Int(1), &Value::str("a")).is_err());
        assert_eq!(
            compare_values(
                &Value::tuple(vec![Value::Int(1), Value::Int(2)]),
                &Value::tuple(vec![Value::Int(1), Value::Int(3)])
            )
            .unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn range_lengths() {
        assert_eq!(range_len(0, 5, 1), 5);
        assert_eq!(range_len(0, 5, 2), 3);
        assert_eq!(range_len(5, 0, -1), 5);
        assert_eq!(range_len(5, 0, 1), 0);
    }
}
