//! Methods on built-in container and string values (`xs.append`, `d.get`,
//! `s.split`, ...).

use indexmap::IndexSet;

use super::error::RuntimeError;
use super::eval::{self, check_len, normalize_index};
use super::value::{values_equal, DequeRef, DictRef, Key, ListRef, SetRef, Value};
use super::{ExecutionHook, Interpreter};

const LIST_METHODS: &[&str] = &[
    "append", "pop", "insert", "extend", "index", "count", "sort", "reverse", "remove", "copy",
    "clear",
];
const DEQUE_METHODS: &[&str] = &["append", "appendleft", "pop", "popleft", "extend", "clear", "copy"];
const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "setdefault", "pop", "update", "copy", "clear",
];
const SET_METHODS: &[&str] = &["add", "remove", "discard", "update", "copy", "clear"];
const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "find", "index",
    "startswith", "endswith", "count", "isdigit", "isalpha", "isalnum", "isspace",
];

/// Whether `value.name` resolves to a bound method.
pub fn has_method(value: &Value, name: &str) -> bool {
    let table = match value {
        Value::List(_) => LIST_METHODS,
        Value::Deque(_) => DEQUE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Str(_) => STR_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

fn arity(method: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        return Err(RuntimeError::type_error(format!(
            "{}() takes {} argument(s) ({} given)",
            method,
            if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            },
            args.len()
        )));
    }
    Ok(())
}

fn str_arg<'a>(method: &str, value: &'a Value) -> Result<&'a str, RuntimeError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::type_error(format!(
            "{}() argument must be str, not {}",
            method,
            other.type_name()
        ))),
    }
}

fn index_arg(method: &str, value: &Value) -> Result<i64, RuntimeError> {
    value.as_index().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{}(): '{}' object cannot be interpreted as an integer",
            method,
            value.type_name()
        ))
    })
}

impl Interpreter {
    pub(super) fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        mut kwargs: Vec<(String, Value)>,
        hook: &mut dyn ExecutionHook,
    ) -> Result<Value, RuntimeError> {
        if let (Value::List(list), "sort") = (receiver, name) {
            arity(name, &args, 0, 0)?;
            let mut key = None;
            let mut reverse = false;
            for (k, v) in kwargs.drain(..) {
                match k.as_str() {
                    "key" => key = Some(v),
                    "reverse" => reverse = v.is_truthy(),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "sort() got an unexpected keyword argument '{}'",
                            other
                        )))
                    }
                }
            }
            // The list reads as empty while the key function runs.
            let items = std::mem::take(&mut *list.borrow_mut());
            let sorted = self.sort_values(items.clone(), key, reverse, hook);
            *list.borrow_mut() = match &sorted {
                Ok(sorted) => sorted.clone(),
                Err(_) => items,
            };
            return sorted.map(|_| Value::None);
        }
        if let Some((key, _)) = kwargs.first() {
            return Err(RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                name, key
            )));
        }
        match receiver {
            Value::List(list) => list_method(list, name, &args),
            Value::Deque(deque) => deque_method(deque, name, &args),
            Value::Dict(dict) => dict_method(dict, name, &args),
            Value::Set(set) => set_method(set, name, &args),
            Value::Str(s) => str_method(s, name, &args),
            other => Err(RuntimeError::attribute_error(format!(
                "'{}' object has no attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }
}

fn list_method(list: &ListRef, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match name {
        "append" => {
            arity(name, args, 1, 1)?;
            let mut items = list.borrow_mut();
            check_len(items.len() + 1)?;
            items.push(args[0].clone());
            Ok(Value::None)
        }
        "pop" => {
            arity(name, args, 0, 1)?;
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(RuntimeError::index_error("pop from empty list"));
            }
            let index = match args.first() {
                Some(i) => index_arg(name, i)?,
                None => -1,
            };
            let i = normalize_index(index, items.len(), "pop")?;
            Ok(items.remove(i))
        }
        "insert" => {
            arity(name, args, 2, 2)?;
            let index = index_arg(name, &args[0])?;
            let mut items = list.borrow_mut();
            check_len(items.len() + 1)?;
            let len = items.len() as i64;
            let at = if index < 0 { index + len } else { index }.clamp(0, len);
            items.insert(at as usize, args[1].clone());
            Ok(Value::None)
        }
        "extend" => {
            arity(name, args, 1, 1)?;
            let extra = eval::to_items(&args[0])?;
            let mut items = list.borrow_mut();
            check_len(items.len() + extra.len())?;
            items.extend(extra);
            Ok(Value::None)
        }
        "index" => {
            arity(name, args, 1, 1)?;
            list.borrow()
                .iter()
                .position(|v| values_equal(v, &args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| {
                    RuntimeError::value_error(format!("{} is not in list", args[0].repr()))
                })
        }
        "count" => {
            arity(name, args, 1, 1)?;
            let n = list.borrow().iter().filter(|v| values_equal(v, &args[0])).count();
            Ok(Value::Int(n as i64))
        }
        "reverse" => {
            arity(name, args, 0, 0)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "remove" => {
            arity(name, args, 1, 1)?;
            let mut items = list.borrow_mut();
            let pos = items
                .iter()
                .position(|v| values_equal(v, &args[0]))
                .ok_or_else(|| RuntimeError::value_error("list.remove(x): x not in list"))?;
            items.remove(pos);
            Ok(Value::None)
        }
        "copy" => {
            arity(name, args, 0, 0)?;
            Ok(Value::list(list.borrow().clone()))
        }
        "clear" => {
            arity(name, args, 0, 0)?;
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute("list", name)),
    }
}

fn deque_method(deque: &DequeRef, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match name {
        "append" | "appendleft" => {
            arity(name, args, 1, 1)?;
            let mut items = deque.borrow_mut();
            check_len(items.len() + 1)?;
            if name == "append" {
                items.push_back(args[0].clone());
            } else {
                items.push_front(args[0].clone());
            }
            Ok(Value::None)
        }
        "pop" | "popleft" => {
            arity(name, args, 0, 0)?;
            let mut items = deque.borrow_mut();
            let popped = if name == "pop" {
                items.pop_back()
            } else {
                items.pop_front()
            };
            popped.ok_or_else(|| RuntimeError::index_error("pop from an empty deque"))
        }
        "extend" => {
            arity(name, args, 1, 1)?;
            let extra = eval::to_items(&args[0])?;
            let mut items = deque.borrow_mut();
            check_len(items.len() + extra.len())?;
            items.extend(extra);
            Ok(Value::None)
        }
        "clear" => {
            arity(name, args, 0, 0)?;
            deque.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, args, 0, 0)?;
            Ok(Value::deque(deque.borrow().clone()))
        }
        _ => Err(no_attribute("collections.deque", name)),
    }
}

fn dict_method(dict: &DictRef, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match name {
        "get" => {
            arity(name, args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            let found = dict.borrow().get(&key).cloned();
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            arity(name, args, 0, 0)?;
            Ok(Value::list(dict.borrow().keys().map(Key::to_value).collect()))
        }
        "values" => {
            arity(name, args, 0, 0)?;
            Ok(Value::list(dict.borrow().values().cloned().collect()))
        }
        "items" => {
            arity(name, args, 0, 0)?;
            Ok(Value::list(
                dict.borrow()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.to_value(), v.clone()]))
                    .collect(),
            ))
        }
        "setdefault" => {
            arity(name, args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(dict.borrow_mut().entry(key).or_insert(default).clone())
        }
        "pop" => {
            arity(name, args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            let removed = dict.borrow_mut().shift_remove(&key);
            match (removed, args.get(1)) {
                (Some(v), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(RuntimeError::key_error(args[0].repr())),
            }
        }
        "update" => {
            arity(name, args, 1, 1)?;
            let pairs: Vec<(Key, Value)> = match &args[0] {
                Value::Dict(other) => other
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                other => {
                    let mut pairs = Vec::new();
                    for pair in eval::to_items(other)? {
                        let kv = eval::to_items(&pair)?;
                        if kv.len() != 2 {
                            return Err(RuntimeError::value_error(
                                "dictionary update sequence element must have length 2",
                            ));
                        }
                        pairs.push((Key::from_value(&kv[0])?, kv[1].clone()));
                    }
                    pairs
                }
            };
            dict.borrow_mut().extend(pairs);
            Ok(Value::None)
        }
        "copy" => {
            arity(name, args, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "clear" => {
            arity(name, args, 0, 0)?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute("dict", name)),
    }
}

fn set_method(set: &SetRef, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match name {
        "add" => {
            arity(name, args, 1, 1)?;
            let key = Key::from_value(&args[0])?;
            let mut items = set.borrow_mut();
            check_len(items.len() + 1)?;
            items.insert(key);
            Ok(Value::None)
        }
        "remove" => {
            arity(name, args, 1, 1)?;
            let key = Key::from_value(&args[0])?;
            if set.borrow_mut().shift_remove(&key) {
                Ok(Value::None)
            } else {
                Err(RuntimeError::key_error(args[0].repr()))
            }
        }
        "discard" => {
            arity(name, args, 1, 1)?;
            let key = Key::from_value(&args[0])?;
            set.borrow_mut().shift_remove(&key);
            Ok(Value::None)
        }
        "update" => {
            arity(name, args, 1, 1)?;
            let extra = eval::to_items(&args[0])?
                .iter()
                .map(Key::from_value)
                .collect::<Result<IndexSet<_>, _>>()?;
            set.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "copy" => {
            arity(name, args, 0, 0)?;
            Ok(Value::set(set.borrow().clone()))
        }
        "clear" => {
            arity(name, args, 0, 0)?;
            set.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute("set", name)),
    }
}

fn str_method(s: &str, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match name {
        "upper" => {
            arity(name, args, 0, 0)?;
            Ok(Value::str(s.to_uppercase()))
        }
        "lower" => {
            arity(name, args, 0, 0)?;
            Ok(Value::str(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(name, args, 0, 1)?;
            let chars: Option<Vec<char>> = match args.first() {
                None | Some(Value::None) => None,
                Some(v) => Some(str_arg(name, v)?.chars().collect()),
            };
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(Value::str(out))
        }
        "split" => {
            arity(name, args, 0, 2)?;
            let max_split = match args.get(1) {
                Some(v) => Some(index_arg(name, v)?).filter(|n| *n >= 0),
                None => None,
            };
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => match max_split {
                    None => s.split_whitespace().map(Value::str).collect(),
                    Some(n) => split_whitespace_n(s, n as usize),
                },
                Some(sep) => {
                    let sep = str_arg(name, sep)?;
                    if sep.is_empty() {
                        return Err(RuntimeError::value_error("empty separator"));
                    }
                    match max_split {
                        None => s.split(sep).map(Value::str).collect(),
                        Some(n) => s.splitn(n as usize + 1, sep).map(Value::str).collect(),
                    }
                }
            };
            Ok(Value::list(parts))
        }
        "join" => {
            arity(name, args, 1, 1)?;
            let items = eval::to_items(&args[0])?;
            let mut pieces = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(p) => pieces.push(p.to_string()),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )))
                    }
                }
            }
            let joined = pieces.join(s);
            check_len(joined.len())?;
            Ok(Value::str(joined))
        }
        "replace" => {
            arity(name, args, 2, 2)?;
            let from = str_arg(name, &args[0])?;
            let to = str_arg(name, &args[1])?;
            let replaced = s.replace(from, to);
            check_len(replaced.len())?;
            Ok(Value::str(replaced))
        }
        "find" | "index" => {
            arity(name, args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            match s.find(needle) {
                Some(byte) => Ok(Value::Int(s[..byte].chars().count() as i64)),
                None if name == "find" => Ok(Value::Int(-1)),
                None => Err(RuntimeError::value_error("substring not found")),
            }
        }
        "startswith" | "endswith" => {
            arity(name, args, 1, 1)?;
            let candidates: Vec<Value> = match &args[0] {
                Value::Tuple(items) => items.to_vec(),
                single => vec![single.clone()],
            };
            for candidate in &candidates {
                let affix = str_arg(name, candidate)?;
                let hit = if name == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "count" => {
            arity(name, args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(n as i64))
        }
        "isdigit" | "isalpha" | "isalnum" | "isspace" => {
            arity(name, args, 0, 0)?;
            let test: fn(char) -> bool = match name {
                "isdigit" => |c: char| c.is_numeric(),
                "isalpha" => |c: char| c.is_alphabetic(),
                "isalnum" => |c: char| c.is_alphanumeric(),
                _ => |c: char| c.is_whitespace(),
            };
            Ok(Value::Bool(!s.is_empty() && s.chars().all(test)))
        }
        _ => Err(no_attribute("str", name)),
    }
}

fn split_whitespace_n(s: &str, max_split: usize) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == max_split {
            parts.push(Value::str(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(Value::str(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts
}

fn no_attribute(type_name: &str, name: &str) -> RuntimeError {
    RuntimeError::attribute_error(format!(
        "'{}' object has no attribute '{}'",
        type_name, name
    ))
}
