//! Statement grammar and the top-level entry point.

use crate::ast::{Block, CondBranch, LoopKind, Param, ProtoFunction, Stmt};
use crate::error::CompileError;
use crate::lexer::TokenKind;
use crate::types::{SemType, TypeKind};

use super::Parser;

impl Parser<'_> {
    /// The next top-level node, or `None` at end of stream.
    pub fn next_node(&mut self) -> Result<Option<Stmt>, CompileError> {
        if self.at_end() {
            return Ok(None);
        }
        self.parse_statement().map(Some)
    }

    pub(crate) fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        // `ident '='` starts an assignment; a bare identifier falls through
        // to the expression grammar after a one-token rollback.
        if let Some(assign) = self.try_parse_assignment(true)? {
            return Ok(assign);
        }
        if self.at_type_name() {
            return self.parse_declaration();
        }
        match self.kind() {
            TokenKind::Def => {
                self.advance()?;
                self.parse_function_def()
            }
            TokenKind::If => {
                self.advance()?;
                self.parse_if_statement()
            }
            TokenKind::For => {
                self.advance()?;
                self.parse_for_statement()
            }
            TokenKind::While => {
                self.advance()?;
                self.parse_while_statement()
            }
            TokenKind::Do => {
                self.advance()?;
                self.parse_do_while_statement()
            }
            TokenKind::Return => {
                self.advance()?;
                self.parse_return_statement()
            }
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_brace_block()?)),
            _ => {
                let expr = self.parse_expression()?;
                self.consume(TokenKind::Semicolon, "after expression statement")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// `Ident '=' Expr [';']`. Returns `None` (with the lexer rolled back)
    /// when the identifier is not followed by `=`.
    pub(crate) fn try_parse_assignment(
        &mut self,
        consume_semicolon: bool,
    ) -> Result<Option<Stmt>, CompileError> {
        if !self.check(TokenKind::Ident) {
            return Ok(None);
        }
        let name = self.lexeme().to_string();
        self.advance()?;
        if !self.check(TokenKind::Assign) {
            self.rollback();
            return Ok(None);
        }
        self.advance()?; // '='
        let rvalue = self.parse_expression()?;
        if consume_semicolon {
            self.consume(TokenKind::Semicolon, "after assignment")?;
        }
        Ok(Some(Stmt::Assign { name, rvalue }))
    }

    /// `type ['*'] Ident ['=' Expr] ';'`.
    fn parse_declaration(&mut self) -> Result<Stmt, CompileError> {
        let ty = self.parse_type_annotation()?;
        if !self.check(TokenKind::Ident) {
            return Err(self.unexpected("in declaration, expected a variable name"));
        }
        let name = self.lexeme().to_string();
        self.advance()?;
        let init = if self.match_kind(TokenKind::Assign)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "after declaration")?;
        Ok(Stmt::Declaration { ty, name, init })
    }

    /// A type keyword with an optional one-level `*`. The caller has checked
    /// `at_type_name`.
    fn parse_type_annotation(&mut self) -> Result<SemType, CompileError> {
        let kind = match TypeKind::from_name(self.lexeme()) {
            Some(kind) => kind,
            None => return Err(self.unexpected("where a type name was expected")),
        };
        self.advance()?;
        let pointer = self.match_kind(TokenKind::Star)?;
        Ok(SemType { kind, pointer })
    }

    /// After `def`: `Ident '(' params ')' [type] ( ';' | Block )`.
    /// Untyped parameters and an omitted return type default to `double`.
    fn parse_function_def(&mut self) -> Result<Stmt, CompileError> {
        if !self.check(TokenKind::Ident) {
            return Err(self.unexpected("after 'def', expected a function name"));
        }
        let name = self.lexeme().to_string();
        self.advance()?;

        self.consume(TokenKind::LParen, "after function name")?;
        let mut params = Vec::new();
        let mut is_var_args = false;
        if !self.check(TokenKind::RParen) {
            loop {
                if self.check(TokenKind::Ellipsis) {
                    // A trailing `...` marks the prototype variadic.
                    self.advance()?;
                    is_var_args = true;
                    break;
                }
                params.push(self.parse_param()?);
                if !self.match_kind(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "to close the parameter list")?;

        let return_type = if self.at_type_name() {
            self.parse_type_annotation()?
        } else {
            SemType::DOUBLE
        };

        let proto = ProtoFunction {
            name,
            params,
            return_type,
            is_var_args,
        };

        if self.match_kind(TokenKind::Semicolon)? {
            return Ok(Stmt::Proto(proto));
        }
        if self.check(TokenKind::LBrace) {
            let body = self.parse_brace_block()?;
            return Ok(Stmt::Function { proto, body });
        }
        Err(self.unexpected("after function prototype, expected '{' or ';'"))
    }

    fn parse_param(&mut self) -> Result<Param, CompileError> {
        let ty = if self.at_type_name() {
            self.parse_type_annotation()?
        } else {
            SemType::DOUBLE
        };
        if !self.check(TokenKind::Ident) {
            return Err(self.unexpected("in parameter list, expected a parameter name"));
        }
        let name = self.lexeme().to_string();
        self.advance()?;
        Ok(Param { ty, name })
    }

    /// After `if`: `Expr Block ('else' 'if' Expr Block)* ('else' Block)?`.
    fn parse_if_statement(&mut self) -> Result<Stmt, CompileError> {
        let if_branch = self.parse_cond_branch()?;
        let mut else_if_branches = Vec::new();
        let mut else_branch = None;

        while self.match_kind(TokenKind::Else)? {
            if self.match_kind(TokenKind::If)? {
                else_if_branches.push(self.parse_cond_branch()?);
            } else {
                else_branch = Some(self.parse_block()?);
                break;
            }
        }

        Ok(Stmt::If {
            if_branch,
            else_if_branches,
            else_branch,
        })
    }

    fn parse_cond_branch(&mut self) -> Result<CondBranch, CompileError> {
        let cond = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(CondBranch { cond, body })
    }

    /// After `for`: `'(' initAssign? ';' condExpr ';' stepExpr ')' Block`.
    fn parse_for_statement(&mut self) -> Result<Stmt, CompileError> {
        self.consume(TokenKind::LParen, "after 'for'")?;

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else {
            match self.try_parse_assignment(false)? {
                Some(assign) => Some(Box::new(assign)),
                None => {
                    return Err(self.unexpected("in for initializer, expected an assignment"))
                }
            }
        };
        self.consume(TokenKind::Semicolon, "after init statement")?;

        let cond = self.parse_expression()?;
        self.consume(TokenKind::Semicolon, "after condition")?;

        let step = self.parse_expression()?;
        self.consume(TokenKind::RParen, "to close the for header")?;

        let body = self.parse_block()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    /// After `while`: `'(' Expr ')' Block`.
    fn parse_while_statement(&mut self) -> Result<Stmt, CompileError> {
        self.consume(TokenKind::LParen, "after 'while'")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RParen, "after condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::Loop {
            kind: LoopKind::While,
            cond,
            body,
        })
    }

    /// After `do`: `Block 'while' '(' Expr ')' ';'`.
    fn parse_do_while_statement(&mut self) -> Result<Stmt, CompileError> {
        let body = self.parse_block()?;
        self.consume(TokenKind::While, "after do body")?;
        self.consume(TokenKind::LParen, "after 'while'")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RParen, "after condition")?;
        self.consume(TokenKind::Semicolon, "after do-while")?;
        Ok(Stmt::Loop {
            kind: LoopKind::DoWhile,
            cond,
            body,
        })
    }

    fn parse_return_statement(&mut self) -> Result<Stmt, CompileError> {
        let expr = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "after return")?;
        Ok(Stmt::Return { expr })
    }

    /// A block is a brace-enclosed statement sequence, or a single
    /// expression statement.
    pub(crate) fn parse_block(&mut self) -> Result<Block, CompileError> {
        if self.check(TokenKind::LBrace) {
            return self.parse_brace_block();
        }
        let expr = self.parse_expression()?;
        self.consume(TokenKind::Semicolon, "after expression statement")?;
        Ok(Block {
            statements: vec![Stmt::Expr(expr)],
        })
    }

    fn parse_brace_block(&mut self) -> Result<Block, CompileError> {
        self.consume(TokenKind::LBrace, "to open the block")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            statements.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RBrace, "to close the block")?;
        Ok(Block { statements })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::lexer::Lexer;

    fn parse_one(src: &str) -> Stmt {
        let lexer = Lexer::new(src).unwrap();
        let mut parser = Parser::new(lexer);
        let node = parser.next_node().unwrap().expect("a node");
        assert!(parser.next_node().unwrap().is_none(), "extra input");
        node
    }

    #[test]
    fn assignment_statement() {
        match parse_one("x = 1 + 2;") {
            Stmt::Assign { name, .. } => assert_eq!(name, "x"),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn bare_identifier_is_an_expression() {
        match parse_one("x;") {
            Stmt::Expr(Expr::Ident { name }) => assert_eq!(name, "x"),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn typed_declaration() {
        match parse_one("int x = 5;") {
            Stmt::Declaration { ty, name, init } => {
                assert_eq!(ty, SemType::INTEGER);
                assert_eq!(name, "x");
                assert!(init.is_some());
            }
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn pointer_declaration_without_init() {
        match parse_one("double* p;") {
            Stmt::Declaration { ty, init, .. } => {
                assert_eq!(ty, SemType::pointer_to(TypeKind::Double));
                assert!(init.is_none());
            }
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn prototype_with_default_types() {
        match parse_one("def print(param);") {
            Stmt::Proto(proto) => {
                assert_eq!(proto.name, "print");
                assert_eq!(proto.params.len(), 1);
                assert_eq!(proto.params[0].ty, SemType::DOUBLE);
                assert_eq!(proto.return_type, SemType::DOUBLE);
            }
            other => panic!("expected prototype, got {other:?}"),
        }
    }

    #[test]
    fn variadic_prototype() {
        match parse_one("def logf(str fmt, ...);") {
            Stmt::Proto(proto) => {
                assert!(proto.is_var_args);
                assert_eq!(proto.params.len(), 1);
                assert_eq!(proto.params[0].ty, SemType::STR);
            }
            other => panic!("expected prototype, got {other:?}"),
        }
    }

    #[test]
    fn variadic_marker_must_be_last() {
        let lexer = Lexer::new("def f(..., int x);").unwrap();
        let mut parser = Parser::new(lexer);
        assert!(parser.next_node().is_err());
    }

    #[test]
    fn function_with_typed_signature() {
        match parse_one("def narrow(int a, byte b) char { return a; }") {
            Stmt::Function { proto, body } => {
                assert_eq!(proto.params[0].ty, SemType::INTEGER);
                assert_eq!(proto.params[1].ty, SemType::BYTE);
                assert_eq!(proto.return_type, SemType::CHAR);
                assert_eq!(body.statements.len(), 1);
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn else_if_chain() {
        let src = "if a { 1; } else if b { 2; } else if c { 3; } else { 4; }";
        match parse_one(src) {
            Stmt::If {
                else_if_branches,
                else_branch,
                ..
            } => {
                assert_eq!(else_if_branches.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn single_expression_block() {
        match parse_one("if x print(x);") {
            Stmt::If { if_branch, .. } => {
                assert_eq!(if_branch.body.statements.len(), 1);
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn for_with_empty_init() {
        match parse_one("for (; i < 10; ++i) { print(i); }") {
            Stmt::For { init, .. } => assert!(init.is_none()),
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn do_while_requires_trailing_semicolon() {
        let lexer = Lexer::new("do { x; } while (x)").unwrap();
        let mut parser = Parser::new(lexer);
        assert!(parser.next_node().is_err());
    }

    #[test]
    fn missing_semicolon_error_points_at_token() {
        let lexer = Lexer::new("x = 1\ny = 2;").unwrap();
        let mut parser = Parser::new(lexer);
        let err = parser.next_node().unwrap_err();
        let span = err.span.expect("span");
        assert_eq!(span.fragment("x = 1\ny = 2;"), "y");
    }
}
