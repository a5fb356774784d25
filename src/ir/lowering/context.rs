//! Module-level emission context and the top-level emitter.

use std::collections::HashMap;

use log::debug;

use crate::ast::{Expr, ProtoFunction, Stmt};
use crate::error::{CompileError, ErrorKind};
use crate::ir::verify;
use crate::ir::{
    ConstValue, FuncBuilder, Function, GlobalData, GlobalInit, IrType, Linkage, Module,
};
use crate::types::{SemType, TypeKind};

use super::scopes::SymbolTable;

#[derive(Debug, Clone, Copy)]
pub struct GlobalBinding {
    pub ty: SemType,
    pub constant: bool,
}

/// Per-unit emission state: globals, known prototypes, and the symbol
/// table for function-local names. Constructed fresh for every compilation
/// unit and consumed together with the finished module.
pub struct ModuleContext {
    pub globals: HashMap<String, GlobalBinding>,
    pub protos: HashMap<String, ProtoFunction>,
    pub symbols: SymbolTable,
}

impl ModuleContext {
    pub fn new() -> Self {
        Self {
            globals: HashMap::new(),
            protos: HashMap::new(),
            symbols: SymbolTable::new(),
        }
    }

    /// Register a prototype without emitting anything. Used by the driver
    /// for environment-provided functions such as `print`.
    pub fn register_proto(&mut self, proto: ProtoFunction) {
        self.protos.insert(proto.name.clone(), proto);
    }
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Emitter<'a> {
    pub(crate) module: &'a mut Module,
    pub(crate) cx: &'a mut ModuleContext,
}

impl<'a> Emitter<'a> {
    pub fn new(module: &'a mut Module, cx: &'a mut ModuleContext) -> Self {
        Self { module, cx }
    }

    /// Emit one top-level node. Only functions, prototypes and global
    /// declarations live at module scope; the driver wraps everything else
    /// into the synthetic entry function.
    pub fn emit_top(&mut self, node: &Stmt) -> Result<(), CompileError> {
        match node {
            Stmt::Proto(proto) => {
                self.declare_function(proto)?;
                Ok(())
            }
            Stmt::Function { proto, body } => self.emit_function(proto, body),
            Stmt::Declaration { ty, name, init } => self.emit_global(*ty, name, init.as_ref()),
            _ => Err(CompileError::emit(
                "only functions, prototypes and declarations are allowed at module scope",
            )),
        }
    }

    /// Ensure `proto` exists in the module as at least a declaration and
    /// remember it for call resolution.
    pub(crate) fn declare_function(&mut self, proto: &ProtoFunction) -> Result<(), CompileError> {
        for param in &proto.params {
            if param.ty.kind == TypeKind::Void && !param.ty.pointer {
                return Err(CompileError::emit(format!(
                    "parameter '{}' of '{}' cannot have type void",
                    param.name, proto.name
                )));
            }
        }
        self.cx.protos.insert(proto.name.clone(), proto.clone());
        if self.module.function(&proto.name).is_none() {
            self.module.add_function(declaration_of(proto));
        }
        Ok(())
    }

    pub(crate) fn emit_function(
        &mut self,
        proto: &ProtoFunction,
        body: &crate::ast::Block,
    ) -> Result<(), CompileError> {
        debug!("emitting function '{}'", proto.name);
        if let Some(existing) = self.module.function(&proto.name) {
            if !existing.is_declaration() {
                return Err(CompileError::emit(format!(
                    "function '{}' is already defined",
                    proto.name
                )));
            }
        }
        self.declare_function(proto)?;

        let ir_params: Vec<(String, IrType)> = proto
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ty.lower()))
            .collect();
        let func = Function::new(
            proto.name.clone(),
            ir_params,
            proto.return_type.lower(),
            proto.is_var_args,
            Linkage::External,
        );

        let mut lower = super::stmt::FuncLower {
            module: &mut *self.module,
            cx: &mut *self.cx,
            builder: FuncBuilder::new(func),
            return_type: proto.return_type,
            func_name: proto.name.clone(),
        };

        // One scope covers parameters and body locals; it is popped on
        // every exit path, error paths included.
        lower.cx.symbols.enter_scope();
        let result = lower.lower_function_body(proto, body);
        lower.cx.symbols.exit_scope();
        result?;

        let func = lower.builder.finish();
        if let Err(errors) = verify::verify_function(self.module, &func) {
            let detail: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(CompileError::new(
                ErrorKind::Verify,
                format!(
                    "function verification failed for '{}': {}",
                    proto.name,
                    detail.join("; ")
                ),
            ));
        }
        self.module.add_function(func);
        Ok(())
    }

    /// Module-scope declaration: an internal-linkage constant global with a
    /// constant initializer (zero-filled when absent).
    pub(crate) fn emit_global(
        &mut self,
        ty: SemType,
        name: &str,
        init: Option<&Expr>,
    ) -> Result<(), CompileError> {
        if ty.kind == TypeKind::Void && !ty.pointer {
            return Err(CompileError::emit(format!(
                "cannot declare variable '{}' of type void",
                name
            )));
        }
        if self.cx.globals.contains_key(name) {
            return Err(CompileError::emit(format!(
                "redeclaration of variable: {}",
                name
            )));
        }

        let ir_ty = ty.lower();
        let init = match init {
            None => GlobalInit::Zero,
            // A string literal is a constant: intern its bytes and point the
            // global at them, the same way function bodies materialize
            // string values.
            Some(Expr::Str { bytes }) => {
                if ir_ty != IrType::Ptr(Box::new(IrType::I8)) {
                    return Err(CompileError::emit(format!(
                        "unsupported cast in initializer of '{}' to {}",
                        name, ir_ty
                    )));
                }
                let data = self.module.intern_string(bytes);
                GlobalInit::StrPtr(data)
            }
            Some(expr) => GlobalInit::Scalar(fold_global_init(expr, &ir_ty, name)?),
        };

        self.module.add_global(GlobalData {
            name: name.to_string(),
            ty: ir_ty,
            init,
            constant: true,
            linkage: Linkage::Internal,
        });
        self.cx.globals.insert(
            name.to_string(),
            GlobalBinding { ty, constant: true },
        );
        Ok(())
    }
}

fn declaration_of(proto: &ProtoFunction) -> Function {
    let params = proto
        .params
        .iter()
        .map(|p| (p.name.clone(), p.ty.lower()))
        .collect();
    Function::new(
        proto.name.clone(),
        params,
        proto.return_type.lower(),
        proto.is_var_args,
        Linkage::External,
    )
}

/// Evaluate a scalar global initializer. Number and boolean literals are
/// the constant expressions here (string literals take the interned-bytes
/// path in `emit_global`); the value is converted to the global's type.
fn fold_global_init(expr: &Expr, ty: &IrType, name: &str) -> Result<ConstValue, CompileError> {
    let not_constant = || {
        CompileError::emit(format!(
            "global variable initializer must be constant: {}",
            name
        ))
    };

    match expr {
        Expr::Number { value, .. } => match ty {
            IrType::I8 | IrType::I32 => Ok(ConstValue::Int {
                ty: ty.clone(),
                value: *value as i64,
            }),
            IrType::F64 => Ok(ConstValue::Float(*value)),
            other => Err(CompileError::emit(format!(
                "unsupported cast in initializer of '{}' to {}",
                name, other
            ))),
        },
        Expr::Boolean(value) => match ty {
            IrType::I1 => Ok(ConstValue::Bool(*value)),
            IrType::I8 | IrType::I32 => Ok(ConstValue::Int {
                ty: ty.clone(),
                value: *value as i64,
            }),
            IrType::F64 => Ok(ConstValue::Float(if *value { 1.0 } else { 0.0 })),
            other => Err(CompileError::emit(format!(
                "unsupported cast in initializer of '{}' to {}",
                name, other
            ))),
        },
        _ => Err(not_constant()),
    }
}
