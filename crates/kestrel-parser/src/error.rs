//! Parser diagnostics (spec.md §4.2: `ParseError{message, position}`,
//! resynchronising at statement boundaries rather than aborting).

use kestrel_lexer::Span;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span }
    }
}
