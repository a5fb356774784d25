//! Pipeline orchestration for one compilation unit.
//!
//! The driver pulls one top-level node at a time from the parser. Function
//! definitions, prototypes and global declarations are emitted as they
//! arrive; every other node is collected and wrapped into the synthetic
//! entry function `_start` once the unit is complete. On success the
//! finished module is handed to the JIT collaborator.

use log::debug;

use crate::ast::{Block, Expr, ProtoFunction, Stmt};
use crate::backend::JitRuntime;
use crate::error::CompileError;
use crate::ir::lowering::{Emitter, ModuleContext};
use crate::ir::Module;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::types::SemType;

/// Name of the synthetic entry function collecting top-level statements.
pub const START_SYMBOL: &str = "_start";

pub struct CompiledUnit {
    pub module: Module,
    pub context: ModuleContext,
}

/// Compile one source unit to verified IR.
pub fn compile_source(source: &str) -> Result<CompiledUnit, CompileError> {
    let lexer = Lexer::new(source)?;
    let mut parser = Parser::new(lexer);

    let mut module = Module::new("flint");
    let mut cx = ModuleContext::new();
    register_embedded_functions(&mut cx);

    let mut entry_body = Vec::new();
    {
        let mut emitter = Emitter::new(&mut module, &mut cx);
        while let Some(node) = parser.next_node()? {
            match node {
                Stmt::Function { .. } | Stmt::Proto(_) | Stmt::Declaration { .. } => {
                    emitter.emit_top(&node)?;
                }
                other => entry_body.push(other),
            }
        }

        if !entry_body.is_empty() {
            let start = synthesize_start(entry_body);
            emitter.emit_top(&start)?;
        }
    }

    debug!("compiled unit:\n{}", module);
    Ok(CompiledUnit {
        module,
        context: cx,
    })
}

/// Compile and execute one source unit. Returns the value of `_start`, or
/// `None` for units that only define functions and globals.
pub fn run_source(source: &str) -> Result<Option<f64>, CompileError> {
    let unit = compile_source(source)?;
    let mut jit = JitRuntime::new()?;
    jit.compile(&unit.module)?;
    Ok(jit.run_start()?)
}

/// Environment-provided externs, pre-registered into every unit's context
/// and resolved by the JIT's symbol namespace.
fn register_embedded_functions(cx: &mut ModuleContext) {
    cx.register_proto(ProtoFunction {
        name: "print".to_string(),
        params: vec![crate::ast::Param {
            ty: SemType::DOUBLE,
            name: "param".to_string(),
        }],
        return_type: SemType::DOUBLE,
        is_var_args: false,
    });
}

/// Wrap the collected top-level statements into `_start() -> double`. A
/// trailing expression statement becomes the return value; otherwise the
/// function returns zero.
fn synthesize_start(mut body: Vec<Stmt>) -> Stmt {
    let tail = match body.pop() {
        Some(Stmt::Expr(expr)) => Stmt::Return { expr: Some(expr) },
        Some(other) => {
            body.push(other);
            Stmt::Return {
                expr: Some(Expr::Number {
                    value: 0.0,
                    is_float: true,
                }),
            }
        }
        None => Stmt::Return {
            expr: Some(Expr::Number {
                value: 0.0,
                is_float: true,
            }),
        },
    };
    body.push(tail);

    Stmt::Function {
        proto: ProtoFunction {
            name: START_SYMBOL.to_string(),
            params: Vec::new(),
            return_type: SemType::DOUBLE,
            is_var_args: false,
        },
        body: Block { statements: body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_without_statements_has_no_start() {
        let unit = compile_source("def id(x) { return x; }").unwrap();
        assert!(unit.module.function(START_SYMBOL).is_none());
        assert!(unit.module.function("id").is_some());
    }

    #[test]
    fn trailing_expression_becomes_start_result() {
        let unit = compile_source("1 + 2;").unwrap();
        let start = unit.module.function(START_SYMBOL).expect("_start");
        assert!(!start.is_declaration());
    }

    #[test]
    fn print_is_preregistered() {
        let unit = compile_source("print(1);").unwrap();
        let print = unit.module.function("print").expect("print declaration");
        assert!(print.is_declaration());
    }
}
