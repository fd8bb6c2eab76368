//! Heuristic topic classification.
//!
//! [`Classifier`] is the seam the pipeline depends on; [`HeuristicClassifier`]
//! is the default strategy. It looks for independent signals (self-calls,
//! memo tables, graph vocabulary, pointer syntax, indexing) and then resolves
//! them to a single [`Topic`] with a fixed confidence per signal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracelab_core::ast::walk_exprs;
use tracelab_core::{parse_program, Expr, FunctionDef, Program, Stmt, StmtKind};

use crate::pattern::Pattern;

/// Closed set of topics. The topic selects the tracer variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "recursion")]
    Recursion,
    #[serde(rename = "dp-top-down")]
    DpTopDown,
    #[serde(rename = "dp-bottom-up")]
    DpBottomUp,
    #[serde(rename = "graph-bfs")]
    GraphBfs,
    #[serde(rename = "graph-dfs")]
    GraphDfs,
    #[serde(rename = "array")]
    Array,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "pointer")]
    Pointer,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Topic {
    pub const ALL: [Topic; 9] = [
        Topic::Recursion,
        Topic::DpTopDown,
        Topic::DpBottomUp,
        Topic::GraphBfs,
        Topic::GraphDfs,
        Topic::Array,
        Topic::String,
        Topic::Pointer,
        Topic::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Recursion => "recursion",
            Topic::DpTopDown => "dp-top-down",
            Topic::DpBottomUp => "dp-bottom-up",
            Topic::GraphBfs => "graph-bfs",
            Topic::GraphDfs => "graph-dfs",
            Topic::Array => "array",
            Topic::String => "string",
            Topic::Pointer => "pointer",
            Topic::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic '{0}'")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    /// Accepts the wire names, case-insensitively, with `_` for `-`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == normalized)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub topic: Topic,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Maps source text to a topic. Must be a pure function of the text.
pub trait Classifier: Send + Sync {
    fn classify(&self, source: &str) -> ClassificationResult;
}

pub const RECURSION_CONFIDENCE: f64 = 1.0;
pub const DP_CONFIDENCE: f64 = 0.9;
pub const GRAPH_CONFIDENCE: f64 = 0.9;
pub const POINTER_CONFIDENCE: f64 = 0.85;
pub const ARRAY_STRING_CONFIDENCE: f64 = 0.8;
pub const SORT_SEARCH_CONFIDENCE: f64 = 0.7;
pub const UNKNOWN_CONFIDENCE: f64 = 0.25;

static DP_NAME: Pattern = Pattern::new(r"\bdp\b");
static MEMO: Pattern = Pattern::new(r"memo|cache|lru_cache");
static DP_TABLE: Pattern = Pattern::new(r"\bdp\s*=\s*\[");
static GRAPH_WORDS: Pattern = Pattern::new(
    r"(?i)\b(bfs|dfs)\s*\(|\b(dijkstra|kruskal|prim|adjacency|adj|edges|graph)\b",
);
static ADJACENCY_LIST: Pattern = Pattern::new(r"\[\s*\]\s*for\s+_?\s+in\s+range");
static QUEUE_WORDS: Pattern = Pattern::new(r"(?i)\b(deque|queue|bfs)\b");
static STRING_ASSIGN: Pattern = Pattern::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*['"]"#);
static INDEXING: Pattern = Pattern::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\[[^\]]+\]");
static STRING_WORDS: Pattern =
    Pattern::new(r"split\(|join\(|substring|str\(|\.upper\(|\.lower\(|replace\(");
static ARRAY_NAMES: Pattern = Pattern::new(r"\b(arr|nums|array|list|vector)\b");
static POINTER_OPS: Pattern = Pattern::new(r"->|malloc\(|free\(");
static POINTER_DECL: Pattern = Pattern::new(r"\b(int|char|float|double|long)\s*\*");
static SORT_SEARCH: Pattern =
    Pattern::new(r"(?i)sort\(|sorted\(|binary search|binary_search");
static DEF_NAME: Pattern = Pattern::new(r"(?m)^\s*def\s+([A-Za-z_]\w*)\s*\(");

/// The default regex and AST heuristics.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

struct Signals {
    reasons: Vec<String>,
    recursion: bool,
    dp: bool,
    graph: bool,
    pointer: bool,
    array_string: Option<bool>,
}

impl HeuristicClassifier {
    fn signals(source: &str) -> Signals {
        let mut reasons = Vec::new();

        let recursion = match self_calling_function(source) {
            Some(name) => {
                reasons.push(format!("Function '{}' calls itself (recursion)", name));
                true
            }
            None => false,
        };

        let dp = if DP_NAME.is_match(source) {
            reasons.push("Found dp[] usage".to_string());
            true
        } else if MEMO.is_match(source) {
            reasons.push("Memoization keywords detected".to_string());
            true
        } else {
            false
        };

        let graph = if GRAPH_WORDS.is_match(source) {
            reasons.push("Found graph-related keywords (bfs/dfs/dijkstra/adjacency/edges)".to_string());
            true
        } else if ADJACENCY_LIST.is_match(source) {
            reasons.push("Adjacency-list pattern detected".to_string());
            true
        } else {
            false
        };

        // `Some(true)` for string evidence, `Some(false)` for plain indexing.
        let array_string = if string_indexing(source) {
            reasons.push("String indexing detected".to_string());
            Some(true)
        } else if STRING_WORDS.is_match(source) {
            reasons.push("String manipulation keywords detected".to_string());
            Some(true)
        } else if INDEXING.is_match(source) {
            if ARRAY_NAMES.is_match(source) {
                reasons.push("Indexing and array variable names detected".to_string());
            } else {
                reasons.push("Indexing detected".to_string());
            }
            Some(false)
        } else {
            None
        };

        let pointer = if POINTER_OPS.is_match(source) {
            reasons.push("Found C/C++ memory-operation (->, malloc, free)".to_string());
            true
        } else if let Some(c) = POINTER_DECL.captures(source) {
            reasons.push(format!("Detected C-style pointer declaration ({}*)", &c[1]));
            true
        } else {
            false
        };

        Signals {
            reasons,
            recursion,
            dp,
            graph,
            pointer,
            array_string,
        }
    }
}

impl Classifier for HeuristicClassifier {
    fn classify(&self, source: &str) -> ClassificationResult {
        let Signals {
            mut reasons,
            recursion,
            dp,
            graph,
            pointer,
            array_string,
        } = Self::signals(source);

        let (topic, confidence) = if dp {
            if DP_TABLE.is_match(source) {
                (Topic::DpBottomUp, DP_CONFIDENCE)
            } else if recursion || !DP_NAME.is_match(source) {
                (Topic::DpTopDown, DP_CONFIDENCE)
            } else {
                (Topic::DpBottomUp, DP_CONFIDENCE)
            }
        } else if graph {
            if recursion {
                (Topic::GraphDfs, GRAPH_CONFIDENCE)
            } else if QUEUE_WORDS.is_match(source) {
                (Topic::GraphBfs, GRAPH_CONFIDENCE)
            } else {
                (Topic::GraphDfs, GRAPH_CONFIDENCE)
            }
        } else if recursion {
            (Topic::Recursion, RECURSION_CONFIDENCE)
        } else if pointer {
            (Topic::Pointer, POINTER_CONFIDENCE)
        } else if let Some(is_string) = array_string {
            let topic = if is_string { Topic::String } else { Topic::Array };
            (topic, ARRAY_STRING_CONFIDENCE)
        } else if SORT_SEARCH.is_match(source) {
            reasons.push("Sort / search keywords detected".to_string());
            (Topic::Array, SORT_SEARCH_CONFIDENCE)
        } else {
            reasons.push("no heuristics matched".to_string());
            (Topic::Unknown, UNKNOWN_CONFIDENCE)
        };

        ClassificationResult {
            topic,
            confidence,
            reasons,
        }
    }
}

/// A variable assigned a string literal and indexed later.
fn string_indexing(source: &str) -> bool {
    STRING_ASSIGN.captures_iter(source).any(|assign| {
        INDEXING
            .captures_iter(source)
            .any(|index| index[1] == assign[1])
    })
}

/// Name of the first function whose body calls itself, either directly or as
/// a method of the same name.
pub(crate) fn self_calling_function(source: &str) -> Option<String> {
    match parse_program(source) {
        Ok(program) => recursive_functions(&program)
            .first()
            .map(|def| def.name.clone()),
        Err(_) => DEF_NAME.captures_iter(source).find_map(|c| {
            let name = &c[1];
            let calls = regex::Regex::new(&format!(r"\b{}\s*\(", regex::escape(name))).ok()?;
            (calls.find_iter(source).count() > 1).then(|| name.to_string())
        }),
    }
}

/// Every function definition, nested ones included, that calls itself.
pub(crate) fn recursive_functions(program: &Program) -> Vec<&FunctionDef> {
    let mut defs = Vec::new();
    collect_defs(&program.body, &mut defs);
    defs.retain(|def| calls_itself(def));
    defs
}

fn collect_defs<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a FunctionDef>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                out.push(def);
                collect_defs(&def.body, out);
            }
            StmtKind::If { branches, orelse } => {
                for (_, body) in branches {
                    collect_defs(body, out);
                }
                collect_defs(orelse, out);
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => collect_defs(body, out),
            _ => {}
        }
    }
}

fn calls_itself(def: &FunctionDef) -> bool {
    let mut found = false;
    walk_exprs(&def.body, &mut |expr| {
        if let Expr::Call { func, .. } = expr {
            match func.as_ref() {
                Expr::Name(name) | Expr::Attribute { name, .. } if *name == def.name => {
                    found = true
                }
                _ => {}
            }
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(source: &str) -> Topic {
        HeuristicClassifier.classify(source).topic
    }

    #[test]
    fn plain_recursion() {
        let result = HeuristicClassifier.classify(
            "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n",
        );
        assert_eq!(result.topic, Topic::Recursion);
        assert_eq!(result.confidence, RECURSION_CONFIDENCE);
        assert_eq!(result.reasons, vec!["Function 'fact' calls itself (recursion)"]);
    }

    #[test]
    fn dp_variants() {
        assert_eq!(
            topic("n = 5\ndp = [0] * (n + 1)\nfor i in range(1, n + 1):\n    dp[i] = dp[i - 1] + i\n"),
            Topic::DpBottomUp
        );
        assert_eq!(
            topic("memo = {}\ndef fib(n):\n    if n in memo:\n        return memo[n]\n    memo[n] = n if n < 2 else fib(n - 1) + fib(n - 2)\n    return memo[n]\n"),
            Topic::DpTopDown
        );
    }

    #[test]
    fn graph_variants() {
        let bfs = "from collections import deque\ngraph = {'a': ['b']}\nq = deque(['a'])\n";
        assert_eq!(topic(bfs), Topic::GraphBfs);
        let dfs = "graph = {'a': ['b'], 'b': []}\ndef visit(node, seen):\n    seen.add(node)\n    for n in graph[node]:\n        if n not in seen:\n            visit(n, seen)\n";
        assert_eq!(topic(dfs), Topic::GraphDfs);
    }

    #[test]
    fn print_is_not_graph_vocabulary() {
        assert_eq!(topic("x = 1\nprint(x)\n"), Topic::Unknown);
    }

    #[test]
    fn arrays_strings_and_pointers() {
        assert_eq!(topic("nums = [3, 1, 2]\nprint(nums[0])\n"), Topic::Array);
        assert_eq!(topic("s = 'hello'\nprint(s[1])\n"), Topic::String);
        assert_eq!(topic("words = line.split(' ')\n"), Topic::String);
        assert_eq!(topic("int* p = malloc(4);\n"), Topic::Pointer);
        let sorted = HeuristicClassifier.classify("x = sorted(y)\n");
        assert_eq!(sorted.topic, Topic::Array);
        assert_eq!(sorted.confidence, SORT_SEARCH_CONFIDENCE);
    }

    #[test]
    fn unknown_fallback() {
        let result = HeuristicClassifier.classify("x = 1\n");
        assert_eq!(result.topic, Topic::Unknown);
        assert_eq!(result.confidence, UNKNOWN_CONFIDENCE);
        assert_eq!(result.reasons, vec!["no heuristics matched"]);
    }

    #[test]
    fn unparseable_source_falls_back_to_text() {
        assert_eq!(
            self_calling_function("def f(n):\n    return f(n - 1) +\n"),
            Some("f".to_string())
        );
    }

    #[test]
    fn topics_parse_from_wire_names() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>(), Ok(topic));
            assert_eq!(
                serde_json::to_value(topic).unwrap(),
                serde_json::json!(topic.as_str())
            );
        }
        assert_eq!("DP_TOP_DOWN".parse::<Topic>(), Ok(Topic::DpTopDown));
        assert!("heap".parse::<Topic>().is_err());
    }

    #[test]
    fn patterns_compile() {
        for pattern in [
            &DP_NAME,
            &MEMO,
            &DP_TABLE,
            &GRAPH_WORDS,
            &ADJACENCY_LIST,
            &QUEUE_WORDS,
            &STRING_ASSIGN,
            &INDEXING,
            &STRING_WORDS,
            &ARRAY_NAMES,
            &POINTER_OPS,
            &POINTER_DECL,
            &SORT_SEARCH,
            &DEF_NAME,
        ] {
            assert!(pattern.compiles());
        }
    }
}
