//! Error types shared by the runtime and the embedding layer.
//!
//! Native callables never panic across the VM boundary: they return
//! `Err(RuntimeError)` and the VM records the message, so a nonzero
//! status always has an error message attached.

use thiserror::Error;

/// Category of a reported error, as surfaced by the context.
///
/// The "no error" state is represented by `Option::None` at the context
/// level rather than by a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The parser rejected the input
    Syntax,
    /// The compiler rejected the AST
    Semantic,
    /// The VM (or a native callable) raised during execution
    Runtime,
    /// Anything else originating in the context itself (I/O, bad paths)
    Generic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Semantic => "semantic error",
            ErrorKind::Runtime => "runtime error",
            ErrorKind::Generic => "error",
        };
        f.write_str(name)
    }
}

/// An error raised during bytecode execution or by a native callable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
        }
    }
}

/// A categorized error, as stored by the context's discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SparkError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SparkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        SparkError {
            kind,
            message: message.into(),
        }
    }
}

impl From<RuntimeError> for SparkError {
    fn from(e: RuntimeError) -> Self {
        SparkError::new(ErrorKind::Runtime, e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let e = RuntimeError::new("division by zero");
        assert_eq!(e.to_string(), "division by zero");
    }

    #[test]
    fn test_spark_error_carries_kind() {
        let e = SparkError::new(ErrorKind::Syntax, "unexpected token");
        assert_eq!(e.kind, ErrorKind::Syntax);
        assert_eq!(e.to_string(), "unexpected token");
    }

    #[test]
    fn test_runtime_error_converts_to_runtime_kind() {
        let e: SparkError = RuntimeError::new("boom").into();
        assert_eq!(e.kind, ErrorKind::Runtime);
    }
}
