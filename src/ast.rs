//! Abstract syntax tree.
//!
//! Plain owning enums; the parser builds them and nothing mutates them
//! afterwards. `Display` prints canonical surface syntax that re-parses to a
//! structurally equal tree, which the round-trip tests rely on.

use std::fmt;

use crate::types::SemType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::LogicalAnd => "&&",
            BinOp::LogicalOr => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    Increment,
    Decrement,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "!",
            UnaryOp::Increment => "++",
            UnaryOp::Decrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryPosition {
    Prefix,
    Postfix,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number {
        value: f64,
        is_float: bool,
    },
    Str {
        bytes: Vec<u8>,
    },
    Boolean(bool),
    Ident {
        name: String,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        position: UnaryPosition,
        operand: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    /// In the data model but not producible from the token set; the emitter
    /// rejects it.
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// See [`Expr::Ternary`].
    FieldAccess {
        target: Box<Expr>,
        field: String,
    },
    /// See [`Expr::Ternary`].
    MethodCall {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: SemType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtoFunction {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: SemType,
    pub is_var_args: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CondBranch {
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    DoWhile,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign {
        name: String,
        rvalue: Expr,
    },
    Declaration {
        ty: SemType,
        name: String,
        init: Option<Expr>,
    },
    Proto(ProtoFunction),
    Function {
        proto: ProtoFunction,
        body: Block,
    },
    If {
        if_branch: CondBranch,
        else_if_branches: Vec<CondBranch>,
        else_branch: Option<Block>,
    },
    Loop {
        kind: LoopKind,
        cond: Expr,
        body: Block,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Expr,
        step: Expr,
        body: Block,
    },
    Return {
        expr: Option<Expr>,
    },
    Block(Block),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number { value, is_float } => {
                if !*is_float {
                    write!(f, "{}", *value as i64)
                } else if value.fract() == 0.0 {
                    // Keep the decimal point so the literal re-parses as a
                    // float.
                    write!(f, "{:.1}", value)
                } else {
                    write!(f, "{}", value)
                }
            }
            Expr::Str { bytes } => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            Expr::Boolean(value) => write!(f, "{}", value),
            Expr::Ident { name } => f.write_str(name),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Unary {
                op,
                position: UnaryPosition::Prefix,
                operand,
            } => write!(f, "{}{}", op.symbol(), operand),
            Expr::Unary {
                op,
                position: UnaryPosition::Postfix,
                operand,
            } => write!(f, "{}{}", operand, op.symbol()),
            Expr::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                write_comma_separated(f, args)?;
                f.write_str(")")
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => write!(f, "({} ? {} : {})", cond, then_expr, else_expr),
            Expr::FieldAccess { target, field } => write!(f, "{}.{}", target, field),
            Expr::MethodCall { target, name, args } => {
                write!(f, "{}.{}(", target, name)?;
                write_comma_separated(f, args)?;
                f.write_str(")")
            }
        }
    }
}

fn write_comma_separated(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", expr)?;
    }
    Ok(())
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for stmt in &self.statements {
            write!(f, "{} ", stmt)?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for ProtoFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", param.ty, param.name)?;
        }
        if self.is_var_args {
            if !self.params.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("...")?;
        }
        write!(f, ") {}", self.return_type)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Expr(expr) => write!(f, "{};", expr),
            Stmt::Assign { name, rvalue } => write!(f, "{} = {};", name, rvalue),
            Stmt::Declaration { ty, name, init } => match init {
                Some(init) => write!(f, "{} {} = {};", ty, name, init),
                None => write!(f, "{} {};", ty, name),
            },
            Stmt::Proto(proto) => write!(f, "{};", proto),
            Stmt::Function { proto, body } => write!(f, "{} {}", proto, body),
            Stmt::If {
                if_branch,
                else_if_branches,
                else_branch,
            } => {
                write!(f, "if {} {}", if_branch.cond, if_branch.body)?;
                for branch in else_if_branches {
                    write!(f, " else if {} {}", branch.cond, branch.body)?;
                }
                if let Some(body) = else_branch {
                    write!(f, " else {}", body)?;
                }
                Ok(())
            }
            Stmt::Loop {
                kind: LoopKind::While,
                cond,
                body,
            } => write!(f, "while ({}) {}", cond, body),
            Stmt::Loop {
                kind: LoopKind::DoWhile,
                cond,
                body,
            } => write!(f, "do {} while ({});", body, cond),
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                f.write_str("for (")?;
                if let Some(init) = init {
                    // The initializer is a bare assignment; its own Display
                    // ends with ';' which doubles as the first separator.
                    write!(f, "{}", init)?;
                } else {
                    f.write_str(";")?;
                }
                write!(f, " {}; {}) {}", cond, step, body)
            }
            Stmt::Return { expr: Some(expr) } => write!(f, "return {};", expr),
            Stmt::Return { expr: None } => f.write_str("return;"),
            Stmt::Block(block) => write!(f, "{}", block),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_display_keeps_integerness() {
        let int = Expr::Number {
            value: 2.0,
            is_float: false,
        };
        let float = Expr::Number {
            value: 21.2,
            is_float: true,
        };
        assert_eq!(int.to_string(), "2");
        assert_eq!(float.to_string(), "21.2");
    }

    #[test]
    fn binary_display_parenthesizes() {
        let expr = Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::Number {
                value: 2.0,
                is_float: false,
            }),
            rhs: Box::new(Expr::Binary {
                op: BinOp::Sub,
                lhs: Box::new(Expr::Number {
                    value: 1.0,
                    is_float: false,
                }),
                rhs: Box::new(Expr::Ident {
                    name: "x".to_string(),
                }),
            }),
        };
        assert_eq!(expr.to_string(), "(2 * (1 - x))");
    }

    #[test]
    fn unary_display_positions() {
        let prefix = Expr::Unary {
            op: UnaryOp::Increment,
            position: UnaryPosition::Prefix,
            operand: Box::new(Expr::Ident {
                name: "i".to_string(),
            }),
        };
        let postfix = Expr::Unary {
            op: UnaryOp::Decrement,
            position: UnaryPosition::Postfix,
            operand: Box::new(Expr::Ident {
                name: "i".to_string(),
            }),
        };
        assert_eq!(prefix.to_string(), "++i");
        assert_eq!(postfix.to_string(), "i--");
    }
}
