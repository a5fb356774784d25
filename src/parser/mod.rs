//! Recursive-descent parser: token stream → AST.
//!
//! One token of lookahead through [`Lexer::peek`] plus one token of rollback
//! through [`Lexer::rollback`]. Every error carries the span of the token it
//! tripped over.

mod expressions;
mod statements;

use crate::error::{CompileError, ErrorKind};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::TypeKind;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self { lexer }
    }

    pub fn source(&self) -> &'a str {
        self.lexer.source()
    }

    // Token utilities shared by the expression and statement grammars.

    pub(crate) fn current(&self) -> &Token {
        self.lexer.current()
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.lexer.current().kind
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    pub(crate) fn advance(&mut self) -> Result<(), CompileError> {
        self.lexer.advance()
    }

    pub(crate) fn rollback(&mut self) {
        self.lexer.rollback();
    }

    pub(crate) fn peek_kind(&mut self) -> Result<TokenKind, CompileError> {
        Ok(self.lexer.peek()?.kind)
    }

    /// Consume the current token if it matches.
    pub(crate) fn match_kind(&mut self, kind: TokenKind) -> Result<bool, CompileError> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume the current token, which must match, or fail pointing at it.
    pub(crate) fn consume(&mut self, kind: TokenKind, context: &str) -> Result<(), CompileError> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.error_here(format!(
                "expected {} {}, found {}",
                kind.describe(),
                context,
                self.kind().describe()
            )))
        }
    }

    /// Lexeme of the current token; empty for tokens that carry none.
    pub(crate) fn lexeme(&self) -> &str {
        self.lexer.current().lexeme.as_deref().unwrap_or("")
    }

    /// True when the current token is an identifier spelling a type name.
    pub(crate) fn at_type_name(&self) -> bool {
        self.check(TokenKind::Ident) && TypeKind::from_name(self.lexeme()).is_some()
    }

    pub(crate) fn error_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::with_span(ErrorKind::Parse, self.current().span, message.into())
    }

    pub(crate) fn unexpected(&self, context: &str) -> CompileError {
        self.error_here(format!(
            "unexpected {} {}",
            self.kind().describe(),
            context
        ))
    }
}
