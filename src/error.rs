//! Unified compile error carrying the failing stage, a message, and an
//! optional source span. Errors are fatal for the compilation unit.

use std::fmt;

use thiserror::Error;

use crate::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Parse,
    Emit,
    Verify,
    Backend,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Lex => "lex error",
            ErrorKind::Parse => "parse error",
            ErrorKind::Emit => "emit error",
            ErrorKind::Verify => "verifier error",
            ErrorKind::Backend => "backend error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn emit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Emit, message)
    }

    /// Render the error against the source it came from. With a span this
    /// reproduces the offending line, pads with `-` up to the token column
    /// and marks the token extent with `^`:
    ///
    /// ```text
    /// for (i=0; i < 10 ++i) {
    /// ----------------^^
    /// parse error: expected ';' after condition
    /// ```
    pub fn render(&self, src: &str) -> String {
        match self.span {
            Some(span) => {
                let (line, _, column) = span.surrounding_line(src);
                let carets = span.len().max(1) as usize;
                format!(
                    "{}\n{}{}\n{}: {}",
                    line,
                    "-".repeat(column as usize),
                    "^".repeat(carets),
                    self.kind,
                    self.message
                )
            }
            None => format!("{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_with_span() {
        let src = "x = 1 +;\n";
        let err = CompileError::with_span(ErrorKind::Parse, Span::new(7, 8), "unexpected token");
        let rendered = err.render(src);
        assert_eq!(rendered, "x = 1 +;\n-------^\nparse error: unexpected token");
    }

    #[test]
    fn render_without_span() {
        let err = CompileError::new(ErrorKind::Emit, "unknown variable name: x");
        assert_eq!(err.render(""), "emit error: unknown variable name: x");
    }
}
