//! Abstract syntax tree for Tracelang programs.
//!
//! Statements carry a [`Span`] so the interpreter can report the current
//! line to instrumentation hooks; expressions are span-less and inherit the
//! line of their enclosing statement. [`Expr`] renders back to source-like
//! text through `Display`, for reports that quote an expression.

use std::fmt;
use std::rc::Rc;

use crate::span::Span;

/// A parsed program: the top-level statement list.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    /// Iterates over top-level function definitions in source order.
    pub fn functions(&self) -> impl Iterator<Item = &Rc<FunctionDef>> {
        self.body.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::FunctionDef(def) => Some(def),
            _ => None,
        })
    }
}

/// A statement with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `a = b = value`: every target receives the same value.
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },
    /// `if`/`elif` chain flattened into ordered branches.
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    FunctionDef(Rc<FunctionDef>),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    Global(Vec<String>),
    /// `import m [as n]` or `from m import a [as b], ...`.
    Import {
        module: String,
        names: Vec<(String, Option<String>)>,
        alias: Option<String>,
    },
}

/// A function definition. Shared via `Rc` so runtime function values can
/// refer to it without cloning the body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// An assignment target.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Subscript { object: Box<Expr>, index: Box<Expr> },
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Set(Vec<Expr>),
    ListComp {
        element: Box<Expr>,
        target: Target,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        target: Target,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Chained comparison `a < b <= c`.
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attribute {
        object: Box<Expr>,
        name: String,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    /// A `{expr}` placeholder with its optional format spec (`{x:.2f}`).
    Expr(Expr, Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

/// Calls `visit` for every expression reachable from `stmts`, including
/// nested function bodies and sub-expressions.
pub fn walk_exprs<'a>(stmts: &'a [Stmt], visit: &mut dyn FnMut(&'a Expr)) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Expr(e) => walk_expr(e, visit),
            StmtKind::Assign { targets, value } => {
                for t in targets {
                    walk_target(t, visit);
                }
                walk_expr(value, visit);
            }
            StmtKind::AugAssign { target, value, .. } => {
                walk_target(target, visit);
                walk_expr(value, visit);
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    walk_expr(test, visit);
                    walk_exprs(body, visit);
                }
                walk_exprs(orelse, visit);
            }
            StmtKind::While { test, body } => {
                walk_expr(test, visit);
                walk_exprs(body, visit);
            }
            StmtKind::For { target, iter, body } => {
                walk_target(target, visit);
                walk_expr(iter, visit);
                walk_exprs(body, visit);
            }
            StmtKind::FunctionDef(def) => {
                for param in &def.params {
                    if let Some(d) = &param.default {
                        walk_expr(d, visit);
                    }
                }
                walk_exprs(&def.body, visit);
            }
            StmtKind::Return(Some(e)) => walk_expr(e, visit),
            StmtKind::Return(None)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Global(_)
            | StmtKind::Import { .. } => {}
        }
    }
}

/// Visits the expressions inside an assignment target.
pub fn walk_target<'a>(target: &'a Target, visit: &mut dyn FnMut(&'a Expr)) {
    match target {
        Target::Name(_) => {}
        Target::Subscript { object, index } => {
            walk_expr(object, visit);
            walk_expr(index, visit);
        }
        Target::Tuple(items) => {
            for t in items {
                walk_target(t, visit);
            }
        }
    }
}

/// Visits `expr` and every sub-expression, outermost first.
pub fn walk_expr<'a>(expr: &'a Expr, visit: &mut dyn FnMut(&'a Expr)) {
    visit(expr);
    match expr {
        Expr::None
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Name(_) => {}
        Expr::FString(parts) => {
            for part in parts {
                if let FStringPart::Expr(e, _) = part {
                    walk_expr(e, visit);
                }
            }
        }
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
            for e in items {
                walk_expr(e, visit);
            }
        }
        Expr::Dict(pairs) => {
            for (k, v) in pairs {
                walk_expr(k, visit);
                walk_expr(v, visit);
            }
        }
        Expr::ListComp {
            element,
            target,
            iter,
            condition,
        } => {
            walk_expr(element, visit);
            walk_target(target, visit);
            walk_expr(iter, visit);
            if let Some(c) = condition {
                walk_expr(c, visit);
            }
        }
        Expr::DictComp {
            key,
            value,
            target,
            iter,
            condition,
        } => {
            walk_expr(key, visit);
            walk_expr(value, visit);
            walk_target(target, visit);
            walk_expr(iter, visit);
            if let Some(c) = condition {
                walk_expr(c, visit);
            }
        }
        Expr::Unary { operand, .. } => walk_expr(operand, visit),
        Expr::Binary { left, right, .. } | Expr::BoolOp { left, right, .. } => {
            walk_expr(left, visit);
            walk_expr(right, visit);
        }
        Expr::Compare { left, ops } => {
            walk_expr(left, visit);
            for (_, e) in ops {
                walk_expr(e, visit);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            walk_expr(test, visit);
            walk_expr(body, visit);
            walk_expr(orelse, visit);
        }
        Expr::Call { func, args, kwargs } => {
            walk_expr(func, visit);
            for a in args {
                walk_expr(a, visit);
            }
            for (_, v) in kwargs {
                walk_expr(v, visit);
            }
        }
        Expr::Attribute { object, .. } => walk_expr(object, visit),
        Expr::Subscript { object, index } => {
            walk_expr(object, visit);
            walk_expr(index, visit);
        }
        Expr::Slice { lower, upper, step } => {
            for e in [lower, upper, step].into_iter().flatten() {
                walk_expr(e, visit);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::None => f.write_str("None"),
            Expr::Bool(true) => f.write_str("True"),
            Expr::Bool(false) => f.write_str("False"),
            Expr::Int(i) => write!(f, "{}", i),
            Expr::Float(x) => write!(f, "{:?}", x),
            Expr::Str(s) => write_quoted(f, s),
            Expr::FString(parts) => {
                f.write_str("f'")?;
                for part in parts {
                    match part {
                        FStringPart::Literal(text) => {
                            f.write_str(&text.replace('{', "{{").replace('}', "}}"))?
                        }
                        FStringPart::Expr(e, None) => write!(f, "{{{}}}", e)?,
                        FStringPart::Expr(e, Some(spec)) => write!(f, "{{{}:{}}}", e, spec)?,
                    }
                }
                f.write_str("'")
            }
            Expr::Name(name) => f.write_str(name),
            Expr::List(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Expr::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Expr::Set(items) => {
                f.write_str("{")?;
                write_list(f, items)?;
                f.write_str("}")
            }
            Expr::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Expr::ListComp {
                element,
                target,
                iter,
                condition,
            } => {
                write!(f, "[{} for {} in {}", element, target, iter)?;
                if let Some(c) = condition {
                    write!(f, " if {}", c)?;
                }
                f.write_str("]")
            }
            Expr::DictComp {
                key,
                value,
                target,
                iter,
                condition,
            } => {
                write!(f, "{{{}: {} for {} in {}", key, value, target, iter)?;
                if let Some(c) = condition {
                    write!(f, " if {}", c)?;
                }
                f.write_str("}")
            }
            Expr::Unary { op, operand } => {
                match op {
                    UnaryOp::Neg => f.write_str("-")?,
                    UnaryOp::Pos => f.write_str("+")?,
                    UnaryOp::Not => f.write_str("not ")?,
                }
                write_operand(f, operand)
            }
            Expr::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right)
            }
            Expr::BoolOp { op, left, right } => {
                write_operand(f, left)?;
                f.write_str(match op {
                    BoolOp::And => " and ",
                    BoolOp::Or => " or ",
                })?;
                write_operand(f, right)
            }
            Expr::Compare { left, ops } => {
                write_operand(f, left)?;
                for (op, e) in ops {
                    write!(f, " {} ", op.symbol())?;
                    write_operand(f, e)?;
                }
                Ok(())
            }
            Expr::IfExp { test, body, orelse } => {
                write!(f, "{} if {} else {}", body, test, orelse)
            }
            Expr::Call { func, args, kwargs } => {
                write!(f, "{}(", func)?;
                write_list(f, args)?;
                for (i, (name, value)) in kwargs.iter().enumerate() {
                    if i > 0 || !args.is_empty() {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                f.write_str(")")
            }
            Expr::Attribute { object, name } => {
                write_operand(f, object)?;
                write!(f, ".{}", name)
            }
            Expr::Subscript { object, index } => {
                write_operand(f, object)?;
                write!(f, "[{}]", index)
            }
            Expr::Slice { lower, upper, step } => {
                if let Some(e) = lower {
                    write!(f, "{}", e)?;
                }
                f.write_str(":")?;
                if let Some(e) = upper {
                    write!(f, "{}", e)?;
                }
                if let Some(e) = step {
                    write!(f, ":{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Name(name) => f.write_str(name),
            Target::Subscript { object, index } => {
                write_operand(f, object)?;
                write!(f, "[{}]", index)
            }
            Target::Tuple(items) => {
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                Ok(())
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, e) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", e)?;
    }
    Ok(())
}

/// Parenthesizes operator expressions so nesting survives rendering.
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Unary { .. }
        | Expr::Binary { .. }
        | Expr::BoolOp { .. }
        | Expr::Compare { .. }
        | Expr::IfExp { .. } => write!(f, "({})", expr),
        _ => write!(f, "{}", expr),
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("'")
}
