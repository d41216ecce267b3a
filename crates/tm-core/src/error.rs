//! Shared error taxonomy.
//!
//! Every subsystem defines its own `thiserror` enum; each exposes `kind()` so
//! the tool dispatcher and HTTP surface can render a uniform envelope without
//! matching on the concrete error type.

use std::fmt;

/// Coarse error classification used at the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Forbidden,
    Timeout,
    External,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Timeout => "timeout",
            ErrorKind::External => "external",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Implemented by every subsystem error so callers can classify without
/// downcasting.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Errors raised by `tm-core` itself: path safety and front-matter parsing.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("path '{path}' escapes root '{root}'")]
    PathEscape { root: String, path: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed front matter: {0}")]
    FrontMatter(String),
}

impl Classify for CoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::PathEscape { .. } => ErrorKind::Forbidden,
            CoreError::Io(_) => ErrorKind::Internal,
            CoreError::FrontMatter(_) => ErrorKind::InvalidInput,
        }
    }
}

/// A uniform, client-facing error envelope.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestions: Vec::new() }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

impl<E: Classify + fmt::Display> From<&E> for ErrorEnvelope {
    fn from(err: &E) -> Self {
        ErrorEnvelope::new(err.kind(), err.to_string())
    }
}
