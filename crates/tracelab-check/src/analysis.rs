//! Static, per-topic analysis of a submission's syntax tree.
//!
//! Array, string and pointer submissions get an indexing report: every
//! subscript on a named sequence in source order, plus bounds findings for
//! constant indices into sequences whose length is known from a literal.
//! DP submissions get the sites that write the `dp` table or a `memo`/`cache`
//! dictionary. Nothing here executes code.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracelab_core::ast::{walk_expr, walk_target, UnaryOp};
use tracelab_core::{parse_program, Expr, Program, Stmt, StmtKind, Target};

use crate::classify::Topic;

const TABLE_NAMES: [&str; 1] = ["dp"];
const MEMO_NAMES: [&str; 2] = ["memo", "cache"];

/// Methods that change a sequence's length in place.
const RESIZING_METHODS: [&str; 8] = [
    "append", "extend", "insert", "pop", "remove", "clear", "appendleft", "popleft",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaticAnalysis {
    Indexing(IndexAnalysis),
    Dp(DpAnalysis),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
}

/// One `name[index]` occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAccess {
    pub variable: String,
    /// The index expression as written, e.g. `i - 1` or `1:3`.
    pub index: String,
    pub mode: AccessMode,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryIssue {
    pub variable: String,
    pub index: i64,
    pub length: usize,
    pub line: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAnalysis {
    /// Names indexed like sequences, in order of first access.
    pub variables: Vec<String>,
    /// Names bound to dictionaries; their subscripts are key lookups and are
    /// left out of the timeline.
    pub dict_variables: Vec<String>,
    pub timeline: Vec<IndexAccess>,
    pub boundary_issues: Vec<BoundaryIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpStyle {
    BottomUp,
    TopDown,
    None,
}

/// A read or write of a DP table or memo dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpSite {
    pub variable: String,
    pub index: String,
    /// The stored expression; absent for reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpAnalysis {
    pub style: DpStyle,
    pub table_writes: Vec<DpSite>,
    pub memo_reads: Vec<DpSite>,
    pub memo_writes: Vec<DpSite>,
}

/// Runs the analysis that fits `topic`. `None` for topics without one and
/// for sources that do not parse; the tracer reports the syntax error.
pub fn analyze(source: &str, topic: Topic) -> Option<StaticAnalysis> {
    let program = parse_program(source).ok()?;
    match topic {
        Topic::Array | Topic::String | Topic::Pointer => {
            Some(StaticAnalysis::Indexing(analyze_indexing(&program)))
        }
        Topic::DpTopDown | Topic::DpBottomUp => Some(StaticAnalysis::Dp(analyze_dp(&program))),
        Topic::Recursion | Topic::GraphBfs | Topic::GraphDfs | Topic::Unknown => None,
    }
}

/// A subscript found while walking, tagged with its statement line.
struct Subscript<'a> {
    variable: &'a str,
    index: &'a Expr,
    mode: AccessMode,
    line: u32,
    /// The right-hand side for plain and augmented assignments.
    value: Option<String>,
}

pub fn analyze_indexing(program: &Program) -> IndexAnalysis {
    let bindings = Bindings::collect(&program.body);
    let mut analysis = IndexAnalysis {
        dict_variables: bindings.dicts.iter().cloned().collect(),
        ..IndexAnalysis::default()
    };
    analysis.dict_variables.sort();

    for access in subscripts(&program.body) {
        if bindings.dicts.contains(access.variable) {
            continue;
        }
        if !analysis.variables.iter().any(|v| v == access.variable) {
            analysis.variables.push(access.variable.to_string());
        }
        if let (Some(index), Some(&length)) = (
            constant_index(access.index),
            bindings.lengths.get(access.variable),
        ) {
            let in_bounds = if index < 0 {
                index.unsigned_abs() <= length as u64
            } else {
                (index as u64) < length as u64
            };
            if !in_bounds {
                analysis.boundary_issues.push(BoundaryIssue {
                    variable: access.variable.to_string(),
                    index,
                    length,
                    line: access.line,
                    message: format!(
                        "index {} is out of range for '{}' of length {}",
                        index, access.variable, length
                    ),
                });
            }
        }
        analysis.timeline.push(IndexAccess {
            variable: access.variable.to_string(),
            index: access.index.to_string(),
            mode: access.mode,
            line: access.line,
        });
    }
    analysis
}

pub fn analyze_dp(program: &Program) -> DpAnalysis {
    let mut table_writes = Vec::new();
    let mut memo_reads = Vec::new();
    let mut memo_writes = Vec::new();

    for access in subscripts(&program.body) {
        let site = DpSite {
            variable: access.variable.to_string(),
            index: access.index.to_string(),
            value: access.value,
            line: access.line,
        };
        let is_table = TABLE_NAMES.contains(&access.variable);
        let is_memo = MEMO_NAMES.contains(&access.variable);
        match access.mode {
            AccessMode::Write if is_table => table_writes.push(site),
            AccessMode::Write if is_memo => memo_writes.push(site),
            AccessMode::Read if is_memo => memo_reads.push(site),
            _ => {}
        }
    }

    let style = if !table_writes.is_empty() {
        DpStyle::BottomUp
    } else if !memo_writes.is_empty() {
        DpStyle::TopDown
    } else {
        DpStyle::None
    };
    DpAnalysis {
        style,
        table_writes,
        memo_reads,
        memo_writes,
    }
}

/// Every subscript on a bare name, in source order. Writes through an
/// assignment target come before the reads in the same statement.
fn subscripts(stmts: &[Stmt]) -> Vec<Subscript<'_>> {
    let mut out = Vec::new();
    collect_subscripts(stmts, &mut out);
    out
}

fn collect_subscripts<'a>(stmts: &'a [Stmt], out: &mut Vec<Subscript<'a>>) {
    for stmt in stmts {
        let line = stmt.span.line;
        match &stmt.kind {
            StmtKind::Expr(e) => walk_expr(e, &mut read_collector(line, out)),
            StmtKind::Assign { targets, value } => {
                let rendered = value.to_string();
                for target in targets {
                    push_writes(target, line, Some(rendered.as_str()), out);
                }
                let mut reads = read_collector(line, out);
                for target in targets {
                    walk_target(target, &mut reads);
                }
                walk_expr(value, &mut reads);
            }
            StmtKind::AugAssign { target, op, value } => {
                let rendered = format!("{} {} {}", target, op.symbol(), value);
                push_writes(target, line, Some(rendered.as_str()), out);
                let mut reads = read_collector(line, out);
                walk_target(target, &mut reads);
                walk_expr(value, &mut reads);
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    walk_expr(test, &mut read_collector(test_line(body, line), out));
                    collect_subscripts(body, out);
                }
                collect_subscripts(orelse, out);
            }
            StmtKind::While { test, body } => {
                walk_expr(test, &mut read_collector(line, out));
                collect_subscripts(body, out);
            }
            StmtKind::For { target, iter, body } => {
                push_writes(target, line, None, out);
                {
                    let mut reads = read_collector(line, out);
                    walk_target(target, &mut reads);
                    walk_expr(iter, &mut reads);
                }
                collect_subscripts(body, out);
            }
            StmtKind::FunctionDef(def) => {
                for param in &def.params {
                    if let Some(default) = &param.default {
                        walk_expr(default, &mut read_collector(line, out));
                    }
                }
                collect_subscripts(&def.body, out);
            }
            StmtKind::Return(Some(e)) => walk_expr(e, &mut read_collector(line, out)),
            StmtKind::Return(None)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Global(_)
            | StmtKind::Import { .. } => {}
        }
    }
}

/// `elif` tests have no statement of their own; the line before the
/// branch body is the closest position the tree keeps.
fn test_line(body: &[Stmt], fallback: u32) -> u32 {
    body.first()
        .map(|stmt| stmt.span.line.saturating_sub(1).max(fallback))
        .unwrap_or(fallback)
}

fn read_collector<'a, 'o>(
    line: u32,
    out: &'o mut Vec<Subscript<'a>>,
) -> impl FnMut(&'a Expr) + 'o
where
    'a: 'o,
{
    move |expr: &'a Expr| {
        if let Expr::Subscript { object, index } = expr {
            if let Expr::Name(variable) = object.as_ref() {
                out.push(Subscript {
                    variable,
                    index,
                    mode: AccessMode::Read,
                    line,
                    value: None,
                });
            }
        }
    }
}

fn push_writes<'a>(
    target: &'a Target,
    line: u32,
    value: Option<&str>,
    out: &mut Vec<Subscript<'a>>,
) {
    match target {
        Target::Name(_) => {}
        Target::Subscript { object, index } => {
            if let Expr::Name(variable) = object.as_ref() {
                out.push(Subscript {
                    variable,
                    index,
                    mode: AccessMode::Write,
                    line,
                    value: value.map(str::to_string),
                });
            }
        }
        Target::Tuple(items) => {
            for item in items {
                push_writes(item, line, value, out);
            }
        }
    }
}

/// `3`, `-1`; anything else is not a constant index.
fn constant_index(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Int(i) => Some(*i),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match operand.as_ref() {
            Expr::Int(i) => i.checked_neg(),
            _ => None,
        },
        _ => None,
    }
}

/// What the program binds each name to, as far as literals tell.
#[derive(Default)]
struct Bindings {
    dicts: HashSet<String>,
    /// Names bound once to a sequence literal of known length and never
    /// resized in place.
    lengths: HashMap<String, usize>,
}

impl Bindings {
    fn collect(stmts: &[Stmt]) -> Self {
        let mut bindings = Bindings::default();
        let mut unknown: HashSet<String> = HashSet::new();
        bindings.scan(stmts, &mut unknown);

        let mut resized = HashSet::new();
        tracelab_core::ast::walk_exprs(stmts, &mut |expr| {
            if let Expr::Call { func, .. } = expr {
                if let Expr::Attribute { object, name } = func.as_ref() {
                    if let Expr::Name(target) = object.as_ref() {
                        if RESIZING_METHODS.contains(&name.as_str()) {
                            resized.insert(target.clone());
                        }
                    }
                }
            }
        });
        bindings
            .lengths
            .retain(|name, _| !unknown.contains(name) && !resized.contains(name));
        bindings
    }

    fn scan(&mut self, stmts: &[Stmt], unknown: &mut HashSet<String>) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Assign { targets, value } => {
                    for target in targets {
                        self.bind(target, value, unknown);
                    }
                }
                StmtKind::AugAssign { target, .. } | StmtKind::For { target, .. } => {
                    forget(target, unknown)
                }
                _ => {}
            }
            match &stmt.kind {
                StmtKind::If { branches, orelse } => {
                    for (_, body) in branches {
                        self.scan(body, unknown);
                    }
                    self.scan(orelse, unknown);
                }
                StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
                    self.scan(body, unknown)
                }
                StmtKind::FunctionDef(def) => self.scan(&def.body, unknown),
                _ => {}
            }
        }
    }

    fn bind(&mut self, target: &Target, value: &Expr, unknown: &mut HashSet<String>) {
        let Target::Name(name) = target else {
            forget(target, unknown);
            return;
        };
        if is_dict(value) {
            self.dicts.insert(name.clone());
        }
        match literal_len(value) {
            Some(len) if !self.lengths.contains_key(name) => {
                self.lengths.insert(name.clone(), len);
            }
            _ => {
                unknown.insert(name.clone());
            }
        }
    }
}

fn forget(target: &Target, unknown: &mut HashSet<String>) {
    match target {
        Target::Name(name) => {
            unknown.insert(name.clone());
        }
        Target::Subscript { .. } => {}
        Target::Tuple(items) => {
            for item in items {
                forget(item, unknown);
            }
        }
    }
}

fn is_dict(expr: &Expr) -> bool {
    match expr {
        Expr::Dict(_) | Expr::DictComp { .. } => true,
        Expr::Call { func, .. } => {
            matches!(func.as_ref(), Expr::Name(n) if n == "dict" || n == "defaultdict" || n == "Counter")
        }
        _ => false,
    }
}

/// Length of `[..]`, `(..)`, `'..'` or `[x] * n`.
fn literal_len(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::List(items) | Expr::Tuple(items) => Some(items.len()),
        Expr::Str(s) => Some(s.chars().count()),
        Expr::Binary {
            op: tracelab_core::ast::BinOp::Mul,
            left,
            right,
        } => {
            let (seq, count) = match (literal_len(left), constant_index(right)) {
                (Some(seq), Some(count)) => (seq, count),
                _ => (literal_len(right)?, constant_index(left)?),
            };
            seq.checked_mul(usize::try_from(count.max(0)).ok()?)
        }
        _ => None,
    }
}
