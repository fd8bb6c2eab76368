//! Runtime errors raised while interpreting a Tracelang program.
//!
//! Errors are created where they are detected (often deep inside value
//! helpers that do not know the source position) with `line == 0`, and the
//! statement executor stamps the line of the statement being executed on the
//! way out via [`RuntimeError::at_line`].

use serde::{Deserialize, Serialize};

/// Runtime errors produced by the interpreter. Display strings mirror the
/// exception names a Python programmer would expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum RuntimeError {
    #[error("TypeError: {message} (line {line})")]
    Type { message: String, line: u32 },

    #[error("NameError: name '{name}' is not defined (line {line})")]
    Name { name: String, line: u32 },

    #[error("IndexError: {message} (line {line})")]
    Index { message: String, line: u32 },

    #[error("KeyError: {key} (line {line})")]
    Key { key: String, line: u32 },

    #[error("ZeroDivisionError: {message} (line {line})")]
    ZeroDivision { message: String, line: u32 },

    #[error("ValueError: {message} (line {line})")]
    Value { message: String, line: u32 },

    #[error("AttributeError: {message} (line {line})")]
    Attribute { message: String, line: u32 },

    #[error("ImportError: {message} (line {line})")]
    Import { message: String, line: u32 },

    #[error("OverflowError: integer result does not fit in 64 bits (line {line})")]
    IntegerOverflow { line: u32 },

    #[error("RecursionError: maximum recursion depth ({limit}) exceeded (line {line})")]
    RecursionLimitExceeded { limit: usize, line: u32 },

    #[error("TimeoutError: {reason} (line {line})")]
    Timeout { reason: String, line: u32 },

    #[error("MemoryError: {message} (line {line})")]
    Memory { message: String, line: u32 },

    #[error("EOFError: EOF when reading a line (line {line})")]
    Eof { line: u32 },

    #[error("NotImplementedError: {message} (line {line})")]
    Unsupported { message: String, line: u32 },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>) -> Self {
        RuntimeError::Type {
            message: message.into(),
            line: 0,
        }
    }

    pub fn name_error(name: impl Into<String>) -> Self {
        RuntimeError::Name {
            name: name.into(),
            line: 0,
        }
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        RuntimeError::Index {
            message: message.into(),
            line: 0,
        }
    }

    pub fn key_error(key: impl Into<String>) -> Self {
        RuntimeError::Key {
            key: key.into(),
            line: 0,
        }
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        RuntimeError::ZeroDivision {
            message: message.into(),
            line: 0,
        }
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        RuntimeError::Value {
            message: message.into(),
            line: 0,
        }
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        RuntimeError::Attribute {
            message: message.into(),
            line: 0,
        }
    }

    pub fn import_error(message: impl Into<String>) -> Self {
        RuntimeError::Import {
            message: message.into(),
            line: 0,
        }
    }

    pub fn overflow() -> Self {
        RuntimeError::IntegerOverflow { line: 0 }
    }

    pub fn memory_error(message: impl Into<String>) -> Self {
        RuntimeError::Memory {
            message: message.into(),
            line: 0,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        RuntimeError::Unsupported {
            message: message.into(),
            line: 0,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RuntimeError::Internal {
            message: message.into(),
        }
    }

    /// The source line the error was raised on, if known.
    pub fn line(&self) -> Option<u32> {
        match self {
            RuntimeError::Internal { .. } => None,
            RuntimeError::Type { line, .. }
            | RuntimeError::Name { line, .. }
            | RuntimeError::Index { line, .. }
            | RuntimeError::Key { line, .. }
            | RuntimeError::ZeroDivision { line, .. }
            | RuntimeError::Value { line, .. }
            | RuntimeError::Attribute { line, .. }
            | RuntimeError::Import { line, .. }
            | RuntimeError::IntegerOverflow { line }
            | RuntimeError::RecursionLimitExceeded { line, .. }
            | RuntimeError::Timeout { line, .. }
            | RuntimeError::Memory { line, .. }
            | RuntimeError::Eof { line }
            | RuntimeError::Unsupported { line, .. } => Some(*line).filter(|l| *l > 0),
        }
    }

    /// Stamps `line` onto an error that does not carry one yet.
    pub fn at_line(mut self, at: u32) -> Self {
        match &mut self {
            RuntimeError::Internal { .. } => {}
            RuntimeError::Type { line, .. }
            | RuntimeError::Name { line, .. }
            | RuntimeError::Index { line, .. }
            | RuntimeError::Key { line, .. }
            | RuntimeError::ZeroDivision { line, .. }
            | RuntimeError::Value { line, .. }
            | RuntimeError::Attribute { line, .. }
            | RuntimeError::Import { line, .. }
            | RuntimeError::IntegerOverflow { line }
            | RuntimeError::RecursionLimitExceeded { line, .. }
            | RuntimeError::Timeout { line, .. }
            | RuntimeError::Memory { line, .. }
            | RuntimeError::Eof { line }
            | RuntimeError::Unsupported { line, .. } => {
                if *line == 0 {
                    *line = at;
                }
            }
        }
        self
    }

    /// True for time and step budget exhaustion.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RuntimeError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_is_stamped_only_once() {
        let err = RuntimeError::zero_division("division by zero")
            .at_line(7)
            .at_line(3);
        assert_eq!(err.line(), Some(7));
        assert_eq!(
            err.to_string(),
            "ZeroDivisionError: division by zero (line 7)"
        );
    }

    #[test]
    fn internal_errors_have_no_line() {
        let err = RuntimeError::internal("boom").at_line(4);
        assert_eq!(err.line(), None);
    }
}
