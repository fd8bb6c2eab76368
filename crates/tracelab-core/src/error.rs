//! Front-end error type.
//!
//! Lexing and parsing share one error shape: a message anchored at the
//! line/column where the problem was detected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::span::Span;

/// A lexical or grammatical error in submitted source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn at(span: Span, message: impl Into<String>) -> Self {
        SyntaxError {
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }
}
