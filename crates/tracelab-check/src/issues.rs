//! Advisory static issue scanning.
//!
//! Findings are hints for the explanation stage and the client; they never
//! stop the pipeline.

use serde::{Deserialize, Serialize};
use tracelab_core::ast::walk_exprs;
use tracelab_core::{parse_program, Expr, FunctionDef, Stmt, StmtKind};

use crate::classify::recursive_functions;
use crate::pattern::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Stable machine-readable category, e.g. `infinite_loop`.
    pub kind: String,
    pub detail: String,
    pub severity: Severity,
}

impl Issue {
    fn new(kind: &str, detail: impl Into<String>, severity: Severity) -> Self {
        Issue {
            kind: kind.to_string(),
            detail: detail.into(),
            severity,
        }
    }
}

pub trait IssueScanner: Send + Sync {
    fn scan(&self, source: &str) -> Vec<Issue>;
}

static RETURN: Pattern = Pattern::new(r"\breturn\b");
static IF: Pattern = Pattern::new(r"\bif\b");
static FOR: Pattern = Pattern::new(r"\bfor\b");
static ARR_INDEX: Pattern = Pattern::new(r"\barr\s*\[");
static LEN_CALL: Pattern = Pattern::new(r"\blen\s*\(");
static WHILE: Pattern = Pattern::new(r"\bwhile\b");
static BREAK: Pattern = Pattern::new(r"\bbreak\b");
static LE_LEN: Pattern = Pattern::new(r"<=\s*len\s*\(");

/// Fixed rule set over source text, plus an AST check for base cases.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleScanner;

impl IssueScanner for RuleScanner {
    fn scan(&self, source: &str) -> Vec<Issue> {
        let mut issues = Vec::new();

        if RETURN.is_match(source) && !IF.is_match(source) && !FOR.is_match(source) {
            issues.push(Issue::new(
                "general_warning",
                "Suspicious return statement without flow control.",
                Severity::Low,
            ));
        }

        if ARR_INDEX.is_match(source) && !LEN_CALL.is_match(source) {
            issues.push(Issue::new(
                "index_error",
                "Possible array index out of range.",
                Severity::Medium,
            ));
        }

        if WHILE.is_match(source) && !BREAK.is_match(source) {
            issues.push(Issue::new(
                "infinite_loop",
                "Possible infinite loop: while loop without break.",
                Severity::High,
            ));
        }

        if let Ok(program) = parse_program(source) {
            for def in recursive_functions(&program) {
                if !has_condition(def) {
                    issues.push(Issue::new(
                        "missing_base_case",
                        format!("Recursion missing base case in '{}'.", def.name),
                        Severity::Critical,
                    ));
                }
            }
        }

        if LE_LEN.is_match(source) {
            issues.push(Issue::new(
                "boundary_condition",
                "Possible off-by-one error: using <= with len(array). Use < instead.",
                Severity::Medium,
            ));
        }

        issues
    }
}

/// True if the body branches anywhere: an `if` statement, a `while` test or
/// a conditional expression.
fn has_condition(def: &FunctionDef) -> bool {
    fn stmts_branch(stmts: &[Stmt]) -> bool {
        stmts.iter().any(|stmt| match &stmt.kind {
            StmtKind::If { .. } | StmtKind::While { .. } => true,
            StmtKind::For { body, .. } => stmts_branch(body),
            _ => false,
        })
    }
    if stmts_branch(&def.body) {
        return true;
    }
    let mut found = false;
    walk_exprs(&def.body, &mut |expr| {
        if matches!(expr, Expr::IfExp { .. }) {
            found = true;
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<String> {
        RuleScanner.scan(source).into_iter().map(|i| i.kind).collect()
    }

    #[test]
    fn clean_code_has_no_issues() {
        let source = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n";
        assert!(RuleScanner.scan(source).is_empty());
    }

    #[test]
    fn while_without_break() {
        let issues = RuleScanner.scan("i = 0\nwhile i < 3:\n    i += 1\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, "infinite_loop");
        assert_eq!(issues[0].severity, Severity::High);
    }

    #[test]
    fn recursion_without_base_case() {
        let issues = RuleScanner.scan("def f(n):\n    return f(n - 1)\n");
        let kinds: Vec<&str> = issues.iter().map(|i| i.kind.as_str()).collect();
        assert_eq!(kinds, vec!["general_warning", "missing_base_case"]);
        assert_eq!(issues[1].severity, Severity::Critical);
        assert_eq!(issues[1].detail, "Recursion missing base case in 'f'.");
    }

    #[test]
    fn conditional_expression_counts_as_base_case() {
        assert!(!kinds("def f(n):\n    return 0 if n == 0 else f(n - 1)\n")
            .contains(&"missing_base_case".to_string()));
    }

    #[test]
    fn indexing_and_boundaries() {
        assert_eq!(kinds("arr = [1]\nx = arr[0]\n"), vec!["index_error"]);
        assert_eq!(
            kinds("arr = [1]\nfor i in range(0, 5):\n    if i <= len(arr):\n        pass\n"),
            vec!["boundary_condition"]
        );
    }

    #[test]
    fn severity_serializes_lowercase() {
        let issue = Issue::new("index_error", "x", Severity::Medium);
        assert_eq!(
            serde_json::to_value(&issue).unwrap(),
            serde_json::json!({"kind": "index_error", "detail": "x", "severity": "medium"})
        );
        assert!(Severity::Critical > Severity::High);
    }
}
