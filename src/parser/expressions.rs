//! Expression grammar, lowest to highest precedence:
//!
//! ```text
//! expr      := orExpr
//! orExpr    := andExpr ( '||' andExpr )*
//! andExpr   := compare ( '&&' compare )*
//! compare   := additive (( '<' | '<=' | '>' | '>=' | '==' | '!=' ) additive)*
//! additive  := term (( '+' | '-' ) term)*
//! term      := factor (( '*' | '/' | '&' | '|' | '^' ) factor)*
//! factor    := '(' expr ')' | literal | identifierTail
//!            | ('+' | '-' | '!') factor | ('++' | '--') factor
//! ```
//!
//! All levels fold left. A `+`/`-` immediately followed by a number literal
//! is absorbed into the literal as its sign; between two atoms it stays a
//! binary operator because the left operand has already been claimed by the
//! time the sign is seen.

use crate::ast::{BinOp, Expr, UnaryOp, UnaryPosition};
use crate::error::CompileError;
use crate::lexer::TokenKind;

use super::Parser;

impl Parser<'_> {
    pub fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_and()?;
        while self.match_kind(TokenKind::OrOr)? {
            let rhs = self.parse_and()?;
            lhs = binary(BinOp::LogicalOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_comparison()?;
        while self.match_kind(TokenKind::AndAnd)? {
            let rhs = self.parse_comparison()?;
            lhs = binary(BinOp::LogicalAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance()?;
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance()?;
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Amp => BinOp::BitAnd,
                TokenKind::Pipe => BinOp::BitOr,
                TokenKind::Caret => BinOp::BitXor,
                _ => break,
            };
            self.advance()?;
            let rhs = self.parse_factor()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, CompileError> {
        match self.kind() {
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.consume(TokenKind::RParen, "to close the group")?;
                Ok(expr)
            }
            TokenKind::Number => self.parse_number(false),
            TokenKind::Str => {
                let bytes = self.lexeme().as_bytes().to_vec();
                self.advance()?;
                Ok(Expr::Str { bytes })
            }
            TokenKind::Boolean => {
                let value = self.lexeme() == "true";
                self.advance()?;
                Ok(Expr::Boolean(value))
            }
            TokenKind::Ident => self.parse_identifier_tail(),
            TokenKind::Plus | TokenKind::Minus => {
                // A sign directly before a number literal belongs to the
                // literal; anything else is a prefix sign operator.
                if self.peek_kind()? == TokenKind::Number {
                    return self.parse_signed_number();
                }
                let op = if self.check(TokenKind::Plus) {
                    UnaryOp::Plus
                } else {
                    UnaryOp::Minus
                };
                self.advance()?;
                let operand = self.parse_factor()?;
                Ok(prefix(op, operand))
            }
            TokenKind::Not => {
                self.advance()?;
                let operand = self.parse_factor()?;
                Ok(prefix(UnaryOp::Not, operand))
            }
            TokenKind::PlusPlus => {
                self.advance()?;
                let operand = self.parse_factor()?;
                Ok(prefix(UnaryOp::Increment, operand))
            }
            TokenKind::MinusMinus => {
                self.advance()?;
                let operand = self.parse_factor()?;
                Ok(prefix(UnaryOp::Decrement, operand))
            }
            _ => Err(self.unexpected("in expression")),
        }
    }

    fn parse_signed_number(&mut self) -> Result<Expr, CompileError> {
        let negative = self.check(TokenKind::Minus);
        self.advance()?;
        self.parse_number(negative)
    }

    fn parse_number(&mut self, negative: bool) -> Result<Expr, CompileError> {
        let lexeme = self.lexeme().to_string();
        let is_float = lexeme.contains('.');
        let value: f64 = lexeme
            .parse()
            .map_err(|_| self.error_here(format!("malformed numeric literal '{}'", lexeme)))?;
        self.advance()?;
        Ok(Expr::Number {
            value: if negative { -value } else { value },
            is_float,
        })
    }

    /// An identifier factor: the name alone, a postfix `++`/`--`, or a call.
    fn parse_identifier_tail(&mut self) -> Result<Expr, CompileError> {
        let name = self.lexeme().to_string();
        self.advance()?;

        match self.kind() {
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.check(TokenKind::PlusPlus) {
                    UnaryOp::Increment
                } else {
                    UnaryOp::Decrement
                };
                self.advance()?;
                Ok(Expr::Unary {
                    op,
                    position: UnaryPosition::Postfix,
                    operand: Box::new(Expr::Ident { name }),
                })
            }
            TokenKind::LParen => {
                let args = self.parse_call_args()?;
                Ok(Expr::Call { callee: name, args })
            }
            _ => Ok(Expr::Ident { name }),
        }
    }

    /// `'(' (expr (',' expr)*)? ')'` — a trailing comma is rejected.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.consume(TokenKind::LParen, "to open the argument list")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_kind(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "to close the argument list")?;
        Ok(args)
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn prefix(op: UnaryOp, operand: Expr) -> Expr {
    Expr::Unary {
        op,
        position: UnaryPosition::Prefix,
        operand: Box::new(operand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Expr {
        let lexer = Lexer::new(src).unwrap();
        let mut parser = Parser::new(lexer);
        let expr = parser.parse_expression().unwrap();
        assert!(parser.check(TokenKind::Semicolon) || parser.at_end());
        expr
    }

    fn num(value: f64, is_float: bool) -> Expr {
        Expr::Number { value, is_float }
    }

    #[test]
    fn precedence_layers() {
        // 1 + 2 * 3 groups the product first.
        let expr = parse("1 + 2 * 3");
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(num(1.0, false)),
                rhs: Box::new(Expr::Binary {
                    op: BinOp::Mul,
                    lhs: Box::new(num(2.0, false)),
                    rhs: Box::new(num(3.0, false)),
                }),
            }
        );
    }

    #[test]
    fn left_associativity() {
        let expr = parse("1 - 2 - 3");
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinOp::Sub,
                lhs: Box::new(Expr::Binary {
                    op: BinOp::Sub,
                    lhs: Box::new(num(1.0, false)),
                    rhs: Box::new(num(2.0, false)),
                }),
                rhs: Box::new(num(3.0, false)),
            }
        );
    }

    #[test]
    fn logic_below_comparison() {
        let expr = parse("a < b && c > d || e == f");
        match expr {
            Expr::Binary {
                op: BinOp::LogicalOr,
                lhs,
                ..
            } => match *lhs {
                Expr::Binary {
                    op: BinOp::LogicalAnd,
                    ..
                } => {}
                other => panic!("expected '&&' under '||', got {other:?}"),
            },
            other => panic!("expected '||' at the top, got {other:?}"),
        }
    }

    #[test]
    fn sign_absorbed_into_literal() {
        // "-1-21.2" is a binary minus whose lhs is the signed literal -1.
        let expr = parse("-1-21.2");
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinOp::Sub,
                lhs: Box::new(num(-1.0, false)),
                rhs: Box::new(num(21.2, true)),
            }
        );
    }

    #[test]
    fn prefix_minus_on_identifier() {
        let expr = parse("-x");
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Minus,
                position: UnaryPosition::Prefix,
                operand: Box::new(Expr::Ident {
                    name: "x".to_string()
                }),
            }
        );
    }

    #[test]
    fn postfix_increment_binds_to_identifier() {
        let expr = parse("i++");
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Increment,
                position: UnaryPosition::Postfix,
                operand: Box::new(Expr::Ident {
                    name: "i".to_string()
                }),
            }
        );
    }

    #[test]
    fn call_arguments() {
        let expr = parse("foo(1, x, 2 + 3)");
        match expr {
            Expr::Call { callee, args } => {
                assert_eq!(callee, "foo");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn trailing_comma_rejected() {
        let lexer = Lexer::new("foo(1,)").unwrap();
        let mut parser = Parser::new(lexer);
        assert!(parser.parse_expression().is_err());
    }

    #[test]
    fn bitwise_at_term_level() {
        let expr = parse("a ^ b & c");
        // Folds left: (a ^ b) & c.
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinOp::BitAnd,
                lhs: Box::new(Expr::Binary {
                    op: BinOp::BitXor,
                    lhs: Box::new(Expr::Ident {
                        name: "a".to_string()
                    }),
                    rhs: Box::new(Expr::Ident {
                        name: "b".to_string()
                    }),
                }),
                rhs: Box::new(Expr::Ident {
                    name: "c".to_string()
                }),
            }
        );
    }
}
