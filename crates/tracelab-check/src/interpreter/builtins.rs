//! The curated built-in function set.
//!
//! Only pure computation and the submission's own stdin/stdout are
//! reachable: there is deliberately no `open`, `eval`, `exec` or
//! `__import__`, so submitted code cannot touch the filesystem, network or
//! other processes through the interpreter.

use std::cmp::Ordering;
use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use super::error::RuntimeError;
use super::eval::{self, check_len};
use super::value::{compare_values, range_len, Key, Module, Num, Value};
use super::{ExecutionHook, Interpreter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Range,
    Min,
    Max,
    Sum,
    Abs,
    List,
    Dict,
    Set,
    Tuple,
    Str,
    Int,
    Float,
    Bool,
    Sorted,
    Reversed,
    Enumerate,
    Zip,
    Deque,
    Isinstance,
    Input,
    Any,
    All,
    Round,
    Ord,
    Chr,
    Pow,
    Divmod,
    Map,
    Filter,
    // math
    Sqrt,
    Floor,
    Ceil,
    Gcd,
    Log,
    // sys
    SetRecursionLimit,
    Readline,
    // heapq
    HeapPush,
    HeapPop,
    Heapify,
}

impl Builtin {
    /// Resolves a name in the builtin namespace.
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "range" => Builtin::Range,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "sum" => Builtin::Sum,
            "abs" => Builtin::Abs,
            "list" => Builtin::List,
            "dict" => Builtin::Dict,
            "set" => Builtin::Set,
            "tuple" => Builtin::Tuple,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "bool" => Builtin::Bool,
            "sorted" => Builtin::Sorted,
            "reversed" => Builtin::Reversed,
            "enumerate" => Builtin::Enumerate,
            "zip" => Builtin::Zip,
            "deque" => Builtin::Deque,
            "isinstance" => Builtin::Isinstance,
            "input" => Builtin::Input,
            "any" => Builtin::Any,
            "all" => Builtin::All,
            "round" => Builtin::Round,
            "ord" => Builtin::Ord,
            "chr" => Builtin::Chr,
            "pow" => Builtin::Pow,
            "divmod" => Builtin::Divmod,
            "map" => Builtin::Map,
            "filter" => Builtin::Filter,
            _ => return None,
        })
    }

    /// Resolves a function exported by an importable module.
    pub fn from_module(module: Module, name: &str) -> Option<Builtin> {
        Some(match (module, name) {
            (Module::Math, "sqrt") => Builtin::Sqrt,
            (Module::Math, "floor") => Builtin::Floor,
            (Module::Math, "ceil") => Builtin::Ceil,
            (Module::Math, "gcd") => Builtin::Gcd,
            (Module::Math, "log") => Builtin::Log,
            (Module::Sys, "setrecursionlimit") => Builtin::SetRecursionLimit,
            (Module::Stdin, "readline") => Builtin::Readline,
            (Module::Collections, "deque") => Builtin::Deque,
            (Module::Heapq, "heappush") => Builtin::HeapPush,
            (Module::Heapq, "heappop") => Builtin::HeapPop,
            (Module::Heapq, "heapify") => Builtin::Heapify,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Abs => "abs",
            Builtin::List => "list",
            Builtin::Dict => "dict",
            Builtin::Set => "set",
            Builtin::Tuple => "tuple",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::Sorted => "sorted",
            Builtin::Reversed => "reversed",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Deque => "deque",
            Builtin::Isinstance => "isinstance",
            Builtin::Input => "input",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Round => "round",
            Builtin::Ord => "ord",
            Builtin::Chr => "chr",
            Builtin::Pow => "pow",
            Builtin::Divmod => "divmod",
            Builtin::Map => "map",
            Builtin::Filter => "filter",
            Builtin::Sqrt => "sqrt",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Gcd => "gcd",
            Builtin::Log => "log",
            Builtin::SetRecursionLimit => "setrecursionlimit",
            Builtin::Readline => "readline",
            Builtin::HeapPush => "heappush",
            Builtin::HeapPop => "heappop",
            Builtin::Heapify => "heapify",
        }
    }

    /// For type builtins, whether `value` is an instance.
    fn instance_check(self, value: &Value) -> Option<bool> {
        Some(match self {
            Builtin::Int => matches!(value, Value::Int(_) | Value::Bool(_)),
            Builtin::Float => matches!(value, Value::Float(_)),
            Builtin::Bool => matches!(value, Value::Bool(_)),
            Builtin::Str => matches!(value, Value::Str(_)),
            Builtin::List => matches!(value, Value::List(_)),
            Builtin::Tuple => matches!(value, Value::Tuple(_)),
            Builtin::Dict => matches!(value, Value::Dict(_)),
            Builtin::Set => matches!(value, Value::Set(_)),
            Builtin::Deque => matches!(value, Value::Deque(_)),
            _ => return None,
        })
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("exactly {}", min)
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("from {} to {}", min, max)
        };
        return Err(RuntimeError::type_error(format!(
            "{}() takes {} argument(s) ({} given)",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn take_kwarg(kwargs: &mut Vec<(String, Value)>, key: &str) -> Option<Value> {
    let pos = kwargs.iter().position(|(k, _)| k == key)?;
    Some(kwargs.remove(pos).1)
}

fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> Result<(), RuntimeError> {
    match kwargs.first() {
        Some((key, _)) => Err(RuntimeError::type_error(format!(
            "{}() got an unexpected keyword argument '{}'",
            name, key
        ))),
        None => Ok(()),
    }
}

fn int_arg(name: &str, value: &Value) -> Result<i64, RuntimeError> {
    value.as_index().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{}(): '{}' object cannot be interpreted as an integer",
            name,
            value.type_name()
        ))
    })
}

fn num_arg(name: &str, value: &Value) -> Result<Num, RuntimeError> {
    value.as_num().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{}(): must be a real number, not {}",
            name,
            value.type_name()
        ))
    })
}

fn float_to_int(f: f64) -> Result<i64, RuntimeError> {
    if f.is_nan() {
        return Err(RuntimeError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() || f.abs() >= 9.2e18 {
        return Err(RuntimeError::overflow());
    }
    Ok(f as i64)
}

impl Interpreter {
    pub(super) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
        mut kwargs: Vec<(String, Value)>,
        hook: &mut dyn ExecutionHook,
    ) -> Result<Value, RuntimeError> {
        let name = builtin.name();
        match builtin {
            Builtin::Print => {
                let sep = match take_kwarg(&mut kwargs, "sep") {
                    None | Some(Value::None) => " ".to_string(),
                    Some(v) => v.to_str(),
                };
                let end = match take_kwarg(&mut kwargs, "end") {
                    None | Some(Value::None) => "\n".to_string(),
                    Some(v) => v.to_str(),
                };
                take_kwarg(&mut kwargs, "flush");
                no_kwargs(name, &kwargs)?;
                let mut text = args
                    .iter()
                    .map(Value::to_str)
                    .collect::<Vec<_>>()
                    .join(&sep);
                text.push_str(&end);
                self.write_output(&text)?;
                Ok(Value::None)
            }
            Builtin::Min | Builtin::Max => {
                let key = take_kwarg(&mut kwargs, "key").filter(|k| !matches!(k, Value::None));
                let default = take_kwarg(&mut kwargs, "default");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, usize::MAX)?;
                let items = if args.len() == 1 {
                    eval::to_items(&args[0])?
                } else {
                    args
                };
                let wanted = if builtin == Builtin::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let mut best: Option<(Value, Value)> = None;
                for item in items {
                    let k = match &key {
                        Some(f) => self.call_value(f, vec![item.clone()], Vec::new(), hook)?,
                        None => item.clone(),
                    };
                    let replace = match &best {
                        None => true,
                        Some((best_key, _)) => compare_values(&k, best_key)? == wanted,
                    };
                    if replace {
                        best = Some((k, item));
                    }
                }
                match (best, default) {
                    (Some((_, item)), _) => Ok(item),
                    (None, Some(d)) => Ok(d),
                    (None, None) => Err(RuntimeError::value_error(format!(
                        "{}() arg is an empty sequence",
                        name
                    ))),
                }
            }
            Builtin::Sorted => {
                let key = take_kwarg(&mut kwargs, "key");
                let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.is_truthy());
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let items = eval::to_items(&args[0])?;
                let sorted = self.sort_values(items, key, reverse, hook)?;
                Ok(Value::list(sorted))
            }
            Builtin::Enumerate => {
                let start_kw = take_kwarg(&mut kwargs, "start");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 2)?;
                let start = match args.get(1).or(start_kw.as_ref()) {
                    Some(v) => int_arg(name, v)?,
                    None => 0,
                };
                let items = eval::to_items(&args[0])?;
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let idx = start.checked_add(i as i64).ok_or_else(RuntimeError::overflow)?;
                    out.push(Value::tuple(vec![Value::Int(idx), item]));
                }
                Ok(Value::list(out))
            }
            Builtin::Dict => {
                arity(name, &args, 0, 1)?;
                let mut entries: IndexMap<Key, Value> = IndexMap::new();
                if let Some(source) = args.first() {
                    match source {
                        Value::Dict(d) => entries = d.borrow().clone(),
                        other => {
                            for pair in eval::to_items(other)? {
                                let kv = eval::to_items(&pair)?;
                                if kv.len() != 2 {
                                    return Err(RuntimeError::value_error(format!(
                                        "dictionary update sequence element has length {}; 2 is required",
                                        kv.len()
                                    )));
                                }
                                entries.insert(Key::from_value(&kv[0])?, kv[1].clone());
                            }
                        }
                    }
                }
                for (k, v) in kwargs {
                    entries.insert(Key::Str(k.into()), v);
                }
                Ok(Value::dict(entries))
            }
            Builtin::Map => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 2, usize::MAX)?;
                let columns = args[1..]
                    .iter()
                    .map(eval::to_items)
                    .collect::<Result<Vec<_>, _>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                let mut out = Vec::with_capacity(len);
                for i in 0..len {
                    let call_args = columns.iter().map(|c| c[i].clone()).collect();
                    out.push(self.call_value(&args[0], call_args, Vec::new(), hook)?);
                }
                Ok(Value::list(out))
            }
            Builtin::Filter => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 2, 2)?;
                let mut out = Vec::new();
                for item in eval::to_items(&args[1])? {
                    let keep = match &args[0] {
                        Value::None => item.is_truthy(),
                        f => self
                            .call_value(f, vec![item.clone()], Vec::new(), hook)?
                            .is_truthy(),
                    };
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Value::list(out))
            }
            Builtin::Input => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 1)?;
                if let Some(prompt) = args.first() {
                    self.write_output(&prompt.to_str())?;
                }
                match self.read_line() {
                    Some(line) => Ok(Value::str(line)),
                    None => Err(RuntimeError::Eof { line: 0 }),
                }
            }
            Builtin::Readline => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 0)?;
                Ok(match self.read_line() {
                    Some(mut line) => {
                        line.push('\n');
                        Value::str(line)
                    }
                    None => Value::str(""),
                })
            }
            Builtin::HeapPush | Builtin::HeapPop | Builtin::Heapify => {
                no_kwargs(name, &kwargs)?;
                heap_op(builtin, &args)
            }
            _ => {
                no_kwargs(name, &kwargs)?;
                call_pure(builtin, &args)
            }
        }
    }

    /// Stable sort by optional key function, as used by `sorted` and
    /// `list.sort`.
    pub(super) fn sort_values(
        &mut self,
        items: Vec<Value>,
        key: Option<Value>,
        reverse: bool,
        hook: &mut dyn ExecutionHook,
    ) -> Result<Vec<Value>, RuntimeError> {
        let keys: Vec<Value> = match key {
            None | Some(Value::None) => items.clone(),
            Some(f) => items
                .iter()
                .map(|v| self.call_value(&f, vec![v.clone()], Vec::new(), hook))
                .collect::<Result<_, _>>()?,
        };
        let mut order: Vec<usize> = (0..items.len()).collect();
        let mut failure = None;
        order.sort_by(|&a, &b| {
            if failure.is_some() {
                return Ordering::Equal;
            }
            match compare_values(&keys[a], &keys[b]) {
                Ok(o) if reverse => o.reverse(),
                Ok(o) => o,
                Err(e) => {
                    failure = Some(e);
                    Ordering::Equal
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        Ok(order.into_iter().map(|i| items[i].clone()).collect())
    }
}

/// Builtins that need no interpreter state.
fn call_pure(builtin: Builtin, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = builtin.name();
    match builtin {
        Builtin::Len => {
            arity(name, args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(l) => l.borrow().len(),
                Value::Tuple(t) => t.len(),
                Value::Dict(d) => d.borrow().len(),
                Value::Set(s) => s.borrow().len(),
                Value::Deque(d) => d.borrow().len(),
                Value::Range { start, stop, step } => range_len(*start, *stop, *step) as usize,
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(len as i64))
        }
        Builtin::Range => {
            arity(name, args, 1, 3)?;
            let ints = args
                .iter()
                .map(|a| int_arg(name, a))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked"),
            };
            if step == 0 {
                return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range { start, stop, step })
        }
        Builtin::Sum => {
            arity(name, args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            for item in eval::to_items(&args[0])? {
                total = eval::binary_op(tracelab_core::ast::BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Abs => {
            arity(name, args, 1, 1)?;
            match num_arg(name, &args[0])? {
                Num::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(RuntimeError::overflow),
                Num::Float(f) => Ok(Value::Float(f.abs())),
            }
        }
        Builtin::List | Builtin::Tuple | Builtin::Set | Builtin::Deque => {
            arity(name, args, 0, 1)?;
            let items = match args.first() {
                Some(v) => eval::to_items(v)?,
                None => Vec::new(),
            };
            Ok(match builtin {
                Builtin::List => Value::list(items),
                Builtin::Tuple => Value::tuple(items),
                Builtin::Deque => Value::deque(items.into_iter().collect::<VecDeque<_>>()),
                _ => Value::set(
                    items
                        .iter()
                        .map(Key::from_value)
                        .collect::<Result<IndexSet<_>, _>>()?,
                ),
            })
        }
        Builtin::Str => {
            arity(name, args, 0, 1)?;
            Ok(Value::str(args.first().map(Value::to_str).unwrap_or_default()))
        }
        Builtin::Bool => {
            arity(name, args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }
        Builtin::Int => {
            arity(name, args, 0, 2)?;
            let Some(value) = args.first() else {
                return Ok(Value::Int(0));
            };
            match (value, args.get(1)) {
                (Value::Str(s), base) => {
                    let base = match base {
                        Some(b) => int_arg(name, b)?,
                        None => 10,
                    };
                    if !(2..=36).contains(&base) {
                        return Err(RuntimeError::value_error("int() base must be >= 2 and <= 36"));
                    }
                    let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
                    i64::from_str_radix(&cleaned, base as u32)
                        .map(Value::Int)
                        .map_err(|_| {
                            RuntimeError::value_error(format!(
                                "invalid literal for int() with base {}: {}",
                                base,
                                value.repr()
                            ))
                        })
                }
                (_, Some(_)) => Err(RuntimeError::type_error(
                    "int() can't convert non-string with explicit base",
                )),
                (Value::Float(f), None) => float_to_int(*f).map(Value::Int),
                (other, None) => match other.as_index() {
                    Some(i) => Ok(Value::Int(i)),
                    None => Err(RuntimeError::type_error(format!(
                        "int() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))),
                },
            }
        }
        Builtin::Float => {
            arity(name, args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => {
                    let text = s.trim().to_ascii_lowercase();
                    text.parse::<f64>().map(Value::Float).map_err(|_| {
                        RuntimeError::value_error(format!(
                            "could not convert string to float: {}",
                            args[0].repr()
                        ))
                    })
                }
                Some(other) => Ok(Value::Float(num_arg(name, other)?.as_f64())),
            }
        }
        Builtin::Reversed => {
            arity(name, args, 1, 1)?;
            let mut items = eval::to_items(&args[0])?;
            items.reverse();
            Ok(Value::list(items))
        }
        Builtin::Zip => {
            let columns = args
                .iter()
                .map(eval::to_items)
                .collect::<Result<Vec<_>, _>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::list(
                (0..len)
                    .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        }
        Builtin::Isinstance => {
            arity(name, args, 2, 2)?;
            let types: Vec<Value> = match &args[1] {
                Value::Tuple(items) => items.to_vec(),
                single => vec![single.clone()],
            };
            for t in &types {
                let matched = match t {
                    Value::Builtin(b) => b.instance_check(&args[0]),
                    _ => None,
                };
                match matched {
                    Some(true) => return Ok(Value::Bool(true)),
                    Some(false) => {}
                    None => {
                        return Err(RuntimeError::type_error(
                            "isinstance() arg 2 must be a type or tuple of types",
                        ))
                    }
                }
            }
            Ok(Value::Bool(false))
        }
        Builtin::Any => {
            arity(name, args, 1, 1)?;
            Ok(Value::Bool(eval::to_items(&args[0])?.iter().any(Value::is_truthy)))
        }
        Builtin::All => {
            arity(name, args, 1, 1)?;
            Ok(Value::Bool(eval::to_items(&args[0])?.iter().all(Value::is_truthy)))
        }
        Builtin::Round => {
            arity(name, args, 1, 2)?;
            let digits = match args.get(1) {
                Some(Value::None) | None => None,
                Some(d) => Some(int_arg(name, d)?),
            };
            match (num_arg(name, &args[0])?, digits) {
                (Num::Int(i), _) => Ok(Value::Int(i)),
                (Num::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
                (Num::Float(f), Some(d)) => {
                    let scale = 10f64.powi(d.clamp(-300, 300) as i32);
                    Ok(Value::Float((f * scale).round_ties_even() / scale))
                }
            }
        }
        Builtin::Ord => {
            arity(name, args, 1, 1)?;
            match &args[0] {
                Value::Str(s) if s.chars().count() == 1 => {
                    Ok(Value::Int(s.chars().next().map_or(0, |c| c as i64)))
                }
                other => Err(RuntimeError::type_error(format!(
                    "ord() expected a character, but got {}",
                    other.repr()
                ))),
            }
        }
        Builtin::Chr => {
            arity(name, args, 1, 1)?;
            let code = int_arg(name, &args[0])?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::str(c.to_string()))
                .ok_or_else(|| RuntimeError::value_error("chr() arg not in range(0x110000)"))
        }
        Builtin::Pow => {
            arity(name, args, 2, 3)?;
            match args.get(2) {
                None => eval::binary_op(tracelab_core::ast::BinOp::Pow, &args[0], &args[1]),
                Some(m) => {
                    let base = int_arg(name, &args[0])?;
                    let exp = int_arg(name, &args[1])?;
                    let modulus = int_arg(name, m)?;
                    if modulus == 0 {
                        return Err(RuntimeError::value_error("pow() 3rd argument cannot be 0"));
                    }
                    if exp < 0 {
                        return Err(RuntimeError::value_error(
                            "pow() 2nd argument cannot be negative when 3rd argument specified",
                        ));
                    }
                    Ok(Value::Int(mod_pow(base, exp, modulus)))
                }
            }
        }
        Builtin::Divmod => {
            arity(name, args, 2, 2)?;
            let q = eval::binary_op(tracelab_core::ast::BinOp::FloorDiv, &args[0], &args[1])?;
            let r = eval::binary_op(tracelab_core::ast::BinOp::Mod, &args[0], &args[1])?;
            Ok(Value::tuple(vec![q, r]))
        }
        Builtin::Sqrt => {
            arity(name, args, 1, 1)?;
            let x = num_arg(name, &args[0])?.as_f64();
            if x < 0.0 {
                return Err(RuntimeError::value_error("math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        }
        Builtin::Floor | Builtin::Ceil => {
            arity(name, args, 1, 1)?;
            match num_arg(name, &args[0])? {
                Num::Int(i) => Ok(Value::Int(i)),
                Num::Float(f) => {
                    let rounded = if builtin == Builtin::Floor {
                        f.floor()
                    } else {
                        f.ceil()
                    };
                    float_to_int(rounded).map(Value::Int)
                }
            }
        }
        Builtin::Gcd => {
            let mut acc: i64 = 0;
            for a in args {
                let mut x = int_arg(name, a)?.unsigned_abs();
                let mut y = acc.unsigned_abs();
                while y != 0 {
                    (x, y) = (y, x % y);
                }
                acc = i64::try_from(x).map_err(|_| RuntimeError::overflow())?;
            }
            Ok(Value::Int(acc))
        }
        Builtin::Log => {
            arity(name, args, 1, 2)?;
            let x = num_arg(name, &args[0])?.as_f64();
            if x <= 0.0 {
                return Err(RuntimeError::value_error("math domain error"));
            }
            match args.get(1) {
                None => Ok(Value::Float(x.ln())),
                Some(b) => {
                    let base = num_arg(name, b)?.as_f64();
                    if base <= 0.0 || base == 1.0 {
                        return Err(RuntimeError::value_error("math domain error"));
                    }
                    Ok(Value::Float(x.ln() / base.ln()))
                }
            }
        }
        Builtin::SetRecursionLimit => {
            arity(name, args, 1, 1)?;
            int_arg(name, &args[0])?;
            Ok(Value::None)
        }
        other => Err(RuntimeError::internal(format!(
            "builtin '{}' dispatched without interpreter state",
            other.name()
        ))),
    }
}

fn mod_pow(base: i64, exp: i64, modulus: i64) -> i64 {
    let m = modulus as i128;
    let mut result: i128 = 1;
    let mut b = (base as i128).rem_euclid(m);
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = result * b % m;
        }
        b = b * b % m;
        e >>= 1;
    }
    // Python gives the result the sign of the modulus.
    let r = result.rem_euclid(m.abs());
    (if m < 0 && r != 0 { r + m } else { r }) as i64
}

fn heap_op(builtin: Builtin, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = builtin.name();
    let expected = if builtin == Builtin::HeapPush { 2 } else { 1 };
    arity(name, args, expected, expected)?;
    let Value::List(list) = &args[0] else {
        return Err(RuntimeError::type_error(format!(
            "{}() argument 1 must be list, not {}",
            name,
            args[0].type_name()
        )));
    };
    let mut heap = std::mem::take(&mut *list.borrow_mut());
    let result = match builtin {
        Builtin::HeapPush => {
            heap.push(args[1].clone());
            check_len(heap.len()).and_then(|_| {
                let last = heap.len() - 1;
                sift_up(&mut heap, last).map(|_| Value::None)
            })
        }
        Builtin::HeapPop => match heap.len() {
            0 => Err(RuntimeError::index_error("index out of range")),
            n => {
                heap.swap(0, n - 1);
                let top = heap.pop().unwrap_or(Value::None);
                sift_down(&mut heap, 0).map(|_| top)
            }
        },
        _ => {
            let mut result = Ok(Value::None);
            for pos in (0..heap.len() / 2).rev() {
                if let Err(e) = sift_down(&mut heap, pos) {
                    result = Err(e);
                    break;
                }
            }
            result
        }
    };
    *list.borrow_mut() = heap;
    result
}

fn sift_up(heap: &mut [Value], mut pos: usize) -> Result<(), RuntimeError> {
    while pos > 0 {
        let parent = (pos - 1) / 2;
        if compare_values(&heap[pos], &heap[parent])? == Ordering::Less {
            heap.swap(pos, parent);
            pos = parent;
        } else {
            break;
        }
    }
    Ok(())
}

fn sift_down(heap: &mut [Value], mut pos: usize) -> Result<(), RuntimeError> {
    let n = heap.len();
    loop {
        let left = 2 * pos + 1;
        if left >= n {
            return Ok(());
        }
        let right = left + 1;
        let mut child = left;
        if right < n && compare_values(&heap[right], &heap[left])? == Ordering::Less {
            child = right;
        }
        if compare_values(&heap[child], &heap[pos])? == Ordering::Less {
            heap.swap(child, pos);
            pos = child;
        } else {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in ["print", "len", "sorted", "deque", "isinstance", "input"] {
            let b = Builtin::from_name(name).unwrap();
            assert_eq!(b.name(), name);
        }
        assert!(Builtin::from_name("open").is_none());
        assert!(Builtin::from_name("eval").is_none());
        assert!(Builtin::from_name("__import__").is_none());
    }

    #[test]
    fn pure_builtins() {
        let len = call_pure(Builtin::Len, &[Value::str("héllo")]).unwrap();
        assert!(matches!(len, Value::Int(5)));
        let r = call_pure(Builtin::Range, &[Value::Int(1), Value::Int(10), Value::Int(3)]).unwrap();
        assert_eq!(eval::to_items(&r).unwrap().len(), 3);
        assert!(call_pure(Builtin::Range, &[Value::Int(1), Value::Int(2), Value::Int(0)]).is_err());
        let parsed = call_pure(Builtin::Int, &[Value::str(" 42 ")]).unwrap();
        assert!(matches!(parsed, Value::Int(42)));
        let inf = call_pure(Builtin::Float, &[Value::str("inf")]).unwrap();
        assert!(matches!(inf, Value::Float(f) if f.is_infinite()));
        let rounded = call_pure(Builtin::Round, &[Value::Float(2.5)]).unwrap();
        assert!(matches!(rounded, Value::Int(2)));
    }

    #[test]
    fn modular_pow_matches_python_signs() {
        assert_eq!(mod_pow(3, 4, 5), 1);
        assert_eq!(mod_pow(-2, 3, 5), 2);
        assert_eq!(mod_pow(2, 3, -5), -2);
    }

    #[test]
    fn heap_operations_keep_min_at_front() {
        let heap = Value::list(Vec::new());
        for v in [5, 1, 4, 2] {
            heap_op(Builtin::HeapPush, &[heap.clone(), Value::Int(v)]).unwrap();
        }
        let mut popped = Vec::new();
        for _ in 0..4 {
            popped.push(heap_op(Builtin::HeapPop, &[heap.clone()]).unwrap().repr());
        }
        assert_eq!(popped, vec!["1", "2", "4", "5"]);
        assert!(heap_op(Builtin::HeapPop, &[heap]).is_err());
    }
}
