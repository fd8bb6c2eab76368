//! Operator semantics: arithmetic, comparison, membership and subscripting.
//!
//! Everything here is a pure function of its operands. Integer arithmetic is
//! checked and traps with [`RuntimeError::IntegerOverflow`] instead of
//! wrapping; sequence construction is capped at [`MAX_SEQUENCE_LEN`].

use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexSet;
use tracelab_core::ast::{BinOp, CmpOp};

use super::error::RuntimeError;
use super::value::{compare_values, range_len, values_equal, Key, Num, Value};

/// Upper bound on elements in any sequence built by the interpreter.
pub const MAX_SEQUENCE_LEN: usize = 1_000_000;

pub fn check_len(len: usize) -> Result<(), RuntimeError> {
    if len > MAX_SEQUENCE_LEN {
        return Err(RuntimeError::memory_error(format!(
            "sequence of {} elements exceeds the limit of {}",
            len, MAX_SEQUENCE_LEN
        )));
    }
    Ok(())
}

pub fn binary_op(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if let (Some(a), Some(b)) = (left.as_num(), right.as_num()) {
        return numeric_op(op, a, b);
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len() + b.len())?;
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::str(s))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            check_len(items.len())?;
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let items: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
            check_len(items.len())?;
            Ok(Value::tuple(items))
        }
        (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
            if count.as_index().is_some() && is_repeatable(seq) =>
        {
            repeat(seq, count.as_index().unwrap_or(0))
        }
        (BinOp::Sub, Value::Set(a), Value::Set(b)) => {
            let b = b.borrow();
            let items: IndexSet<Key> = a.borrow().iter().filter(|k| !b.contains(*k)).cloned().collect();
            Ok(Value::set(items))
        }
        (BinOp::Mod, Value::Str(_), _) => Err(RuntimeError::unsupported(
            "%-formatting of strings is not supported; use f-strings",
        )),
        _ => Err(RuntimeError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn is_repeatable(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::List(_) | Value::Tuple(_))
}

fn repeat(seq: &Value, count: i64) -> Result<Value, RuntimeError> {
    let count = count.max(0) as usize;
    match seq {
        Value::Str(s) => {
            check_len(s.len().saturating_mul(count))?;
            Ok(Value::str(s.repeat(count)))
        }
        Value::List(items) => {
            let items = items.borrow();
            check_len(items.len().saturating_mul(count))?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        Value::Tuple(items) => {
            check_len(items.len().saturating_mul(count))?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::tuple(out))
        }
        other => Err(RuntimeError::type_error(format!(
            "can't multiply sequence of type '{}'",
            other.type_name()
        ))),
    }
}

fn numeric_op(op: BinOp, a: Num, b: Num) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(op, x, y),
        (x, y) => float_op(op, x.as_f64(), y.as_f64()),
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> Result<Value, RuntimeError> {
    let overflow = RuntimeError::overflow;
    let v = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div => {
            if y == 0 {
                return Err(RuntimeError::zero_division("division by zero"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(RuntimeError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            let q = x.checked_div(y).ok_or_else(overflow)?;
            if (x % y != 0) && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(RuntimeError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(RuntimeError::zero_division(
                        "0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(v))
}

fn float_op(op: BinOp, x: f64, y: f64) -> Result<Value, RuntimeError> {
    let v = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(RuntimeError::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            x.powf(y)
        }
    };
    Ok(Value::Float(v))
}

pub fn negate(value: &Value) -> Result<Value, RuntimeError> {
    match value.as_num() {
        Some(Num::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(RuntimeError::overflow),
        Some(Num::Float(f)) => Ok(Value::Float(-f)),
        None => Err(RuntimeError::type_error(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

pub fn positive(value: &Value) -> Result<Value, RuntimeError> {
    match value.as_num() {
        Some(Num::Int(i)) => Ok(Value::Int(i)),
        Some(Num::Float(f)) => Ok(Value::Float(f)),
        None => Err(RuntimeError::type_error(format!(
            "bad operand type for unary +: '{}'",
            value.type_name()
        ))),
    }
}

pub fn compare_op(op: CmpOp, left: &Value, right: &Value) -> Result<bool, RuntimeError> {
    use std::cmp::Ordering::*;
    Ok(match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::NotEq => !values_equal(left, right),
        CmpOp::Lt => compare_values(left, right)? == Less,
        CmpOp::LtE => compare_values(left, right)? != Greater,
        CmpOp::Gt => compare_values(left, right)? == Greater,
        CmpOp::GtE => compare_values(left, right)? != Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => is_same(left, right),
        CmpOp::IsNot => !is_same(left, right),
    })
}

/// Identity comparison (`is`).
pub fn is_same(left: &Value, right: &Value) -> bool {
    match (left.container_addr(), right.container_addr()) {
        (Some(a), Some(b)) => a == b,
        (None, None) => match (left, right) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

/// Membership test `item in container`.
pub fn contains(container: &Value, item: &Value) -> Result<bool, RuntimeError> {
    Ok(match container {
        Value::List(items) => items.borrow().iter().any(|v| values_equal(v, item)),
        Value::Tuple(items) => items.iter().any(|v| values_equal(v, item)),
        Value::Deque(items) => items.borrow().iter().any(|v| values_equal(v, item)),
        Value::Dict(entries) => entries.borrow().contains_key(&Key::from_value(item)?),
        Value::Set(items) => items.borrow().contains(&Key::from_value(item)?),
        Value::Str(s) => match item {
            Value::Str(needle) => s.contains(&**needle),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                )))
            }
        },
        Value::Range { start, stop, step } => match item.as_index() {
            Some(v) => {
                let in_bounds = if *step > 0 {
                    *start <= v && v < *stop
                } else {
                    *stop < v && v <= *start
                };
                in_bounds && (v as i128 - *start as i128) % (*step as i128) == 0
            }
            None => false,
        },
        other => {
            return Err(RuntimeError::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            )))
        }
    })
}

/// Materializes an iterable into its elements: list, tuple, deque, string
/// characters, dict keys, set elements or range values.
pub fn to_items(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    Ok(match value {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Deque(items) => items.borrow().iter().cloned().collect(),
        Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
        Value::Dict(entries) => entries.borrow().keys().map(Key::to_value).collect(),
        Value::Set(items) => items.borrow().iter().map(Key::to_value).collect(),
        Value::Range { start, stop, step } => {
            let len = range_len(*start, *stop, *step) as usize;
            check_len(len)?;
            (0..len as i64).map(|i| Value::Int(start + step * i)).collect()
        }
        other => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    })
}

/// Resolves a possibly negative index against `len`.
pub fn normalize_index(index: i64, len: usize, what: &str) -> Result<usize, RuntimeError> {
    let len_i = len as i64;
    let idx = if index < 0 { index + len_i } else { index };
    if idx < 0 || idx >= len_i {
        return Err(RuntimeError::index_error(format!("{} index out of range", what)));
    }
    Ok(idx as usize)
}

fn index_of(index: &Value, container: &Value) -> Result<i64, RuntimeError> {
    index.as_index().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{} indices must be integers, not {}",
            container.type_name(),
            index.type_name()
        ))
    })
}

/// `container[index]` for a non-slice index.
pub fn get_item(container: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let i = normalize_index(index_of(index, container)?, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = normalize_index(index_of(index, container)?, items.len(), "tuple")?;
            Ok(items[i].clone())
        }
        Value::Deque(items) => {
            let items = items.borrow();
            let i = normalize_index(index_of(index, container)?, items.len(), "deque")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let raw = index_of(index, container)?;
            if s.is_ascii() {
                let i = normalize_index(raw, s.len(), "string")?;
                Ok(Value::str(&s[i..i + 1]))
            } else {
                let chars: Vec<char> = s.chars().collect();
                let i = normalize_index(raw, chars.len(), "string")?;
                Ok(Value::str(chars[i].to_string()))
            }
        }
        Value::Range { start, stop, step } => {
            let len = range_len(*start, *stop, *step) as usize;
            let i = normalize_index(index_of(index, container)?, len, "range object")?;
            Ok(Value::Int(start + step * i as i64))
        }
        Value::Dict(entries) => {
            let key = Key::from_value(index)?;
            entries
                .borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::key_error(index.repr()))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `container[index] = value`.
pub fn set_item(container: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index_of(index, container)?, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        Value::Deque(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index_of(index, container)?, items.len(), "deque")?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(entries) => {
            let key = Key::from_value(index)?;
            entries.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// Computes the element positions selected by `[lower:upper:step]` on a
/// sequence of `len` elements, following Python's clamping rules.
pub fn slice_indices(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, RuntimeError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |v: i64, lo: i64, hi: i64| -> i64 {
        let v = if v < 0 { v + len } else { v };
        v.clamp(lo, hi)
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |v| clamp(v, 0, len));
        let stop = upper.map_or(len, |v| clamp(v, 0, len));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    } else {
        let start = lower.map_or(len - 1, |v| clamp(v, -1, len - 1));
        let stop = upper.map_or(-1, |v| clamp(v, -1, len - 1));
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    }
    Ok(out)
}

/// `container[lower:upper:step]`.
pub fn get_slice(
    container: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Value, RuntimeError> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Deque(items) => {
            let items = items.borrow();
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::deque(
                picked.into_iter().map(|i| items[i].clone()).collect::<VecDeque<_>>(),
            ))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_indices(chars.len(), lower, upper, step)?;
            Ok(Value::str(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Value {
        Value::Int(v)
    }

    #[test]
    fn floor_division_and_modulo_follow_divisor_sign() {
        assert!(matches!(binary_op(BinOp::FloorDiv, &int(-7), &int(2)), Ok(Value::Int(-4))));
        assert!(matches!(binary_op(BinOp::Mod, &int(-7), &int(2)), Ok(Value::Int(1))));
        assert!(matches!(binary_op(BinOp::Mod, &int(7), &int(-2)), Ok(Value::Int(-1))));
        assert!(matches!(binary_op(BinOp::Div, &int(7), &int(2)), Ok(Value::Float(f)) if f == 3.5));
    }

    #[test]
    fn slices_with_huge_steps_stop_at_the_first_element() {
        let list = Value::list(vec![int(1), int(2), int(3)]);
        let forward = get_slice(&list, Some(1), None, Some(i64::MAX)).expect("slice");
        assert_eq!(forward.repr(), "[2]");
        let backward = get_slice(&list, Some(1), None, Some(i64::MIN)).expect("slice");
        assert_eq!(backward.repr(), "[2]");
        assert_eq!(slice_indices(3, Some(-1), None, Some(i64::MIN + 1)).expect("slice"), vec![2]);
    }

    #[test]
    fn overflow_and_zero_division_trap() {
        assert!(matches!(
            binary_op(BinOp::Mul, &int(i64::MAX), &int(2)),
            Err(RuntimeError::IntegerOverflow { .. })
        ));
        assert!(matches!(
            binary_op(BinOp::Div, &int(1), &int(0)),
            Err(RuntimeError::ZeroDivision { .. })
        ));
        assert!(matches!(
            binary_op(BinOp::Pow, &int(2), &int(64)),
            Err(RuntimeError::IntegerOverflow { .. })
        ));
    }

    #[test]
    fn sequence_repetition_is_bounded() {
        let list = Value::list(vec![int(0)]);
        let repeated = binary_op(BinOp::Mul, &list, &int(3)).unwrap();
        assert_eq!(repeated.repr(), "[0, 0, 0]");
        assert!(matches!(
            binary_op(BinOp::Mul, &list, &int(10_000_000)),
            Err(RuntimeError::Memory { .. })
        ));
        let s = binary_op(BinOp::Mul, &int(2), &Value::str("ab")).unwrap();
        assert_eq!(s.to_str(), "abab");
    }

    #[test]
    fn slicing_matches_python() {
        let list = Value::list((0..6).map(int).collect());
        assert_eq!(get_slice(&list, Some(1), Some(-1), None).unwrap().repr(), "[1, 2, 3, 4]");
        assert_eq!(get_slice(&list, None, None, Some(-2)).unwrap().repr(), "[5, 3, 1]");
        assert_eq!(get_slice(&list, Some(10), None, None).unwrap().repr(), "[]");
        assert_eq!(
            get_slice(&Value::str("hello"), None, None, Some(-1)).unwrap().to_str(),
            "olleh"
        );
    }

    #[test]
    fn indexing_errors() {
        let list = Value::list(vec![int(1)]);
        assert_eq!(get_item(&list, &int(-1)).unwrap().repr(), "1");
        assert!(matches!(get_item(&list, &int(1)), Err(RuntimeError::Index { .. })));
        assert!(matches!(
            get_item(&int(1), &int(0)),
            Err(RuntimeError::Type { .. })
        ));
    }

    #[test]
    fn membership() {
        let range = Value::Range {
            start: 0,
            stop: 10,
            step: 3,
        };
        assert!(contains(&range, &int(9)).unwrap());
        assert!(!contains(&range, &int(4)).unwrap());
        assert!(contains(&Value::str("graph"), &Value::str("ap")).unwrap());
    }
}
