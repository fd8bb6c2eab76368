//! Front-end for Tracelang, the small indentation-structured language that
//! tracelab executes and instruments.
//!
//! The surface syntax is a strict subset of Python: functions, loops,
//! conditionals, lists, tuples, dicts, sets and list comprehensions. The
//! crate is pure (no I/O) and produces a [`Program`] AST consumed by the
//! interpreter in `tracelab-check`.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

// Re-export commonly used types
pub use ast::{Expr, FunctionDef, Param, Program, Stmt, StmtKind, Target};
pub use error::SyntaxError;
pub use parser::parse_program;
pub use span::Span;
