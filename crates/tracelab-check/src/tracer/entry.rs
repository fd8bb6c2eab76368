//! Entry function and argument discovery.
//!
//! Resolution is an explicit fallback chain: a caller-supplied function and
//! argument list win; otherwise the first top-level `def` is taken as the
//! entry, and its arguments are read from the first unindented, non-comment,
//! non-definition line that calls it with purely numeric literals. Failing
//! that, the arguments default to `[4]`.
//!
//! The textual scan is best effort. In a program that calls the entry
//! function several times it picks the first qualifying call site, which is
//! not necessarily the interesting one; callers can always pass explicit
//! values instead.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::pattern::Pattern;

static FIRST_DEF: Pattern = Pattern::new(r"(?m)^def\s+([A-Za-z_]\w*)\s*\(");
static NUMBER: Pattern = Pattern::new(r"^-?\d+(\.\d+)?$");

/// Where the resolved arguments came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Supplied by the caller.
    Explicit,
    /// Read from a top-level call in the source.
    Inferred,
    /// Fallback argument list.
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Entry function name; `None` when the source defines no function.
    pub function: Option<String>,
    pub args: Vec<JsonValue>,
    pub source: EntrySource,
}

impl EntryPoint {
    pub fn default_args() -> Vec<JsonValue> {
        vec![JsonValue::from(4)]
    }
}

impl Default for EntryPoint {
    fn default() -> Self {
        EntryPoint {
            function: None,
            args: Self::default_args(),
            source: EntrySource::Default,
        }
    }
}

/// Resolves the entry point for `source`, preferring explicit values.
pub fn resolve_entry(
    source: &str,
    function: Option<&str>,
    args: Option<Vec<JsonValue>>,
) -> EntryPoint {
    let function = function
        .map(str::to_string)
        .or_else(|| FIRST_DEF.captures(source).map(|c| c[1].to_string()));

    if let Some(args) = args {
        return EntryPoint {
            function,
            args,
            source: EntrySource::Explicit,
        };
    }

    match function.as_deref().and_then(|name| infer_args(source, name)) {
        Some(args) => EntryPoint {
            function,
            args,
            source: EntrySource::Inferred,
        },
        None => EntryPoint {
            function,
            args: EntryPoint::default_args(),
            source: EntrySource::Default,
        },
    }
}

fn infer_args(source: &str, function: &str) -> Option<Vec<JsonValue>> {
    let call = regex::Regex::new(&format!(r"\b{}\s*\(([^()]*)\)", regex::escape(function))).ok()?;
    source
        .lines()
        .filter(|line| {
            !line.starts_with(char::is_whitespace)
                && !line.trim_start().starts_with('#')
                && !line.starts_with("def ")
        })
        .find_map(|line| {
            let captures = call.captures(line)?;
            numeric_args(&captures[1])
        })
}

fn numeric_args(text: &str) -> Option<Vec<JsonValue>> {
    let text = text.trim();
    if text.is_empty() {
        return Some(Vec::new());
    }
    text.split(',')
        .map(|arg| {
            let arg = arg.trim();
            if !NUMBER.is_match(arg) {
                return None;
            }
            match arg.parse::<i64>() {
                Ok(int) => Some(JsonValue::from(int)),
                Err(_) => arg.parse::<f64>().ok().map(JsonValue::from),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_values_win() {
        let entry = resolve_entry("def f(n):\n    return n\nf(3)\n", Some("g"), Some(vec![json!(9)]));
        assert_eq!(entry.function.as_deref(), Some("g"));
        assert_eq!(entry.args, vec![json!(9)]);
        assert_eq!(entry.source, EntrySource::Explicit);
    }

    #[test]
    fn arguments_are_inferred_from_top_level_calls() {
        let source = "\
def fib(n):
    return fib(n - 1) if n > 1 else n

# fib(99)
x = fib(k)
print(fib(7))
";
        let entry = resolve_entry(source, None, None);
        assert_eq!(entry.function.as_deref(), Some("fib"));
        assert_eq!(entry.args, vec![json!(7)]);
        assert_eq!(entry.source, EntrySource::Inferred);

        let entry = resolve_entry("def grid(r, c):\n    pass\ngrid(2, 3.5)\n", None, None);
        assert_eq!(entry.args, vec![json!(2), json!(3.5)]);
    }

    #[test]
    fn falls_back_to_default_arguments() {
        let entry = resolve_entry("def f(n):\n    return n\n", None, None);
        assert_eq!(entry.function.as_deref(), Some("f"));
        assert_eq!(entry.args, vec![json!(4)]);
        assert_eq!(entry.source, EntrySource::Default);

        let entry = resolve_entry("x = 1\n", None, None);
        assert_eq!(entry, EntryPoint::default());
    }

    #[test]
    fn patterns_compile() {
        assert!(FIRST_DEF.compiles());
        assert!(NUMBER.compiles());
    }
}
