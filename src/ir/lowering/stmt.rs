//! Statement lowering: declarations, assignment, control flow, returns,
//! and function bodies.

use crate::ast::{Block, CondBranch, Expr, LoopKind, ProtoFunction, Stmt};
use crate::error::CompileError;
use crate::ir::{FuncBuilder, Module, Terminator};
use crate::types::{SemType, TypeKind};

use super::context::ModuleContext;
use super::scopes::Slot;

/// Per-function lowering state: the instruction builder plus borrowed
/// module/context so calls can declare externs and literals can intern
/// strings while a body is being emitted.
pub(crate) struct FuncLower<'a> {
    pub(crate) module: &'a mut Module,
    pub(crate) cx: &'a mut ModuleContext,
    pub(crate) builder: FuncBuilder,
    pub(crate) return_type: SemType,
    pub(crate) func_name: String,
}

impl FuncLower<'_> {
    /// Parameter spill and body emission. The caller has already opened the
    /// function scope and guarantees it is closed again.
    pub(crate) fn lower_function_body(
        &mut self,
        proto: &ProtoFunction,
        body: &Block,
    ) -> Result<(), CompileError> {
        for (index, param) in proto.params.iter().enumerate() {
            let slot = self.builder.create_entry_alloca(param.ty.lower(), &param.name);
            let incoming = self.builder.param_value(index);
            self.builder.store(incoming, slot);
            if self
                .cx
                .symbols
                .insert(&param.name, Slot { ptr: slot, ty: param.ty })
                .is_err()
            {
                return Err(CompileError::emit(format!(
                    "duplicate parameter name: {}",
                    param.name
                )));
            }
        }

        self.lower_statements(&body.statements)?;

        if !self.builder.is_terminated() {
            if self.return_type == SemType::VOID {
                self.builder.terminate(Terminator::Ret(None));
            } else {
                return Err(CompileError::emit(format!(
                    "missing return in non-void function '{}'",
                    self.func_name
                )));
            }
        }
        Ok(())
    }

    /// Emit a statement sequence into the current block. Anything after a
    /// terminator is unreachable and skipped.
    fn lower_statements(&mut self, statements: &[Stmt]) -> Result<(), CompileError> {
        for stmt in statements {
            if self.builder.is_terminated() {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            Stmt::Assign { name, rvalue } => self.lower_assign(name, rvalue),
            Stmt::Declaration { ty, name, init } => {
                self.lower_declaration(*ty, name, init.as_ref())
            }
            Stmt::Return { expr } => self.lower_return(expr.as_ref()),
            Stmt::If {
                if_branch,
                else_if_branches,
                else_branch,
            } => self.lower_if(if_branch, else_if_branches, else_branch.as_ref()),
            Stmt::Loop {
                kind: LoopKind::While,
                cond,
                body,
            } => self.lower_while(cond, body),
            Stmt::Loop {
                kind: LoopKind::DoWhile,
                cond,
                body,
            } => self.lower_do_while(cond, body),
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => self.lower_for(init.as_deref(), cond, step, body),
            Stmt::Block(block) => self.lower_block(block),
            Stmt::Proto(_) | Stmt::Function { .. } => Err(CompileError::emit(
                "nested function definitions are not supported",
            )),
        }
    }

    /// Open a scope around `body`, guaranteeing the matching exit on every
    /// path out, and stop at a terminator like any statement sequence.
    pub(crate) fn lower_block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.cx.symbols.enter_scope();
        let result = self.lower_statements(&block.statements);
        self.cx.symbols.exit_scope();
        result
    }

    fn lower_assign(&mut self, name: &str, rvalue: &Expr) -> Result<(), CompileError> {
        let value = self.lower_expr(rvalue)?;

        if let Some(slot) = self.cx.symbols.lookup(name) {
            let casted = self.ensure_cast(value.expect_value("assignment value")?,
                &value.ty.lower(),
                &slot.ty.lower(),
            )?;
            self.builder.store(casted, slot.ptr);
            return Ok(());
        }

        if let Some(binding) = self.cx.globals.get(name).copied() {
            if binding.constant {
                return Err(CompileError::emit(format!(
                    "variable '{}' is constant",
                    name
                )));
            }
            let addr = self.builder.global_addr(name, binding.ty.lower());
            let casted = self.ensure_cast(
                value.expect_value("assignment value")?,
                &value.ty.lower(),
                &binding.ty.lower(),
            )?;
            self.builder.store(casted, addr);
            return Ok(());
        }

        Err(CompileError::emit(format!("undefined variable: {}", name)))
    }

    fn lower_declaration(
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

        let ir_ty = ty.lower();
        let init_value = match init {
            Some(expr) => {
                let value = self.lower_expr(expr)?;
                let raw = value.expect_value("initializer")?;
                self.ensure_cast(raw, &value.ty.lower(), &ir_ty)?
            }
            None => self.zero_value(&ty)?,
        };

        let slot = self.builder.create_entry_alloca(ir_ty, name);
        self.builder.store(init_value, slot);

        if self.cx.symbols.insert(name, Slot { ptr: slot, ty }).is_err() {
            return Err(CompileError::emit(format!(
                "redeclaration of variable: {}",
                name
            )));
        }
        Ok(())
    }

    fn lower_return(&mut self, expr: Option<&Expr>) -> Result<(), CompileError> {
        match expr {
            Some(expr) => {
                if self.return_type == SemType::VOID {
                    return Err(CompileError::emit(format!(
                        "cannot return a value from void function '{}'",
                        self.func_name
                    )));
                }
                let value = self.lower_expr(expr)?;
                let raw = value.expect_value("return value")?;
                let casted =
                    self.ensure_cast(raw, &value.ty.lower(), &self.return_type.lower())?;
                self.builder.terminate(Terminator::Ret(Some(casted)));
            }
            None => {
                if self.return_type != SemType::VOID {
                    return Err(CompileError::emit(format!(
                        "missing return value in non-void function '{}'",
                        self.func_name
                    )));
                }
                self.builder.terminate(Terminator::Ret(None));
            }
        }
        Ok(())
    }

    /// `if`/`else if`/`else` lowering. Each arm that does not terminate
    /// branches to the join block; when every arm terminates the join block
    /// is never created and emission continues in a terminated block, which
    /// makes any following statements unreachable.
    fn lower_if(
        &mut self,
        if_branch: &CondBranch,
        else_ifs: &[CondBranch],
        else_branch: Option<&Block>,
    ) -> Result<(), CompileError> {
        let cond = self.lower_condition(&if_branch.cond)?;

        let then_block = self.builder.create_block("if.then");
        let has_else = !else_ifs.is_empty() || else_branch.is_some();

        if !has_else {
            let join = self.builder.create_block("if.join");
            self.builder.terminate(Terminator::CondBr {
                cond,
                then_block,
                else_block: join,
            });
            self.builder.switch_to(then_block);
            self.lower_block(&if_branch.body)?;
            if !self.builder.is_terminated() {
                self.builder.terminate(Terminator::Br(join));
            }
            self.builder.switch_to(join);
            return Ok(());
        }

        let else_block = self.builder.create_block("if.else");
        self.builder.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });

        self.builder.switch_to(then_block);
        self.lower_block(&if_branch.body)?;
        let then_end = (!self.builder.is_terminated()).then(|| self.builder.current_block());

        self.builder.switch_to(else_block);
        match else_ifs.split_first() {
            // An else-if chain is the same statement nested in the else arm.
            Some((head, tail)) => self.lower_if(head, tail, else_branch)?,
            None => {
                if let Some(block) = else_branch {
                    self.lower_block(block)?;
                }
            }
        }
        let else_end = (!self.builder.is_terminated()).then(|| self.builder.current_block());

        if then_end.is_none() && else_end.is_none() {
            return Ok(());
        }

        let join = self.builder.create_block("if.join");
        for end in [then_end, else_end].into_iter().flatten() {
            self.builder.switch_to(end);
            self.builder.terminate(Terminator::Br(join));
        }
        self.builder.switch_to(join);
        Ok(())
    }

    /// `while`: header evaluates the condition, body loops back to it.
    fn lower_while(&mut self, cond: &Expr, body: &Block) -> Result<(), CompileError> {
        let header = self.builder.create_block("while.header");
        self.builder.terminate(Terminator::Br(header));

        self.builder.switch_to(header);
        let cond = self.lower_condition(cond)?;
        let body_block = self.builder.create_block("while.body");
        let exit = self.builder.create_block("while.exit");
        self.builder.terminate(Terminator::CondBr {
            cond,
            then_block: body_block,
            else_block: exit,
        });

        self.builder.switch_to(body_block);
        self.lower_block(body)?;
        if !self.builder.is_terminated() {
            self.builder.terminate(Terminator::Br(header));
        }

        self.builder.switch_to(exit);
        Ok(())
    }

    /// `do … while`: the body runs first, the latch evaluates the condition
    /// and loops back.
    fn lower_do_while(&mut self, cond: &Expr, body: &Block) -> Result<(), CompileError> {
        let body_block = self.builder.create_block("do.body");
        self.builder.terminate(Terminator::Br(body_block));

        self.builder.switch_to(body_block);
        self.lower_block(body)?;
        if self.builder.is_terminated() {
            // The body always leaves; the latch would be unreachable.
            return Ok(());
        }

        let latch = self.builder.create_block("do.latch");
        self.builder.terminate(Terminator::Br(latch));
        self.builder.switch_to(latch);
        let cond = self.lower_condition(cond)?;
        let exit = self.builder.create_block("do.exit");
        self.builder.terminate(Terminator::CondBr {
            cond,
            then_block: body_block,
            else_block: exit,
        });

        self.builder.switch_to(exit);
        Ok(())
    }

    /// `for`: init in the current block, then header (condition), body,
    /// step, exit. The induction variable lives in a scope of its own; an
    /// init assignment to an unbound name declares it there with the type
    /// of its right-hand side.
    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: &Expr,
        step: &Expr,
        body: &Block,
    ) -> Result<(), CompileError> {
        self.cx.symbols.enter_scope();
        let result = self.lower_for_inner(init, cond, step, body);
        self.cx.symbols.exit_scope();
        result
    }

    fn lower_for_inner(
        &mut self,
        init: Option<&Stmt>,
        cond: &Expr,
        step: &Expr,
        body: &Block,
    ) -> Result<(), CompileError> {
        if let Some(init) = init {
            match init {
                Stmt::Assign { name, rvalue }
                    if self.cx.symbols.lookup(name).is_none()
                        && !self.cx.globals.contains_key(name.as_str()) =>
                {
                    // Implicit loop-variable declaration.
                    let value = self.lower_expr(rvalue)?;
                    let raw = value.expect_value("loop initializer")?;
                    let slot = self.builder.create_entry_alloca(value.ty.lower(), name);
                    self.builder.store(raw, slot);
                    if self
                        .cx
                        .symbols
                        .insert(name, Slot { ptr: slot, ty: value.ty })
                        .is_err()
                    {
                        return Err(CompileError::emit(format!(
                            "redeclaration of variable: {}",
                            name
                        )));
                    }
                }
                other => self.lower_stmt(other)?,
            }
        }

        let header = self.builder.create_block("for.header");
        self.builder.terminate(Terminator::Br(header));

        self.builder.switch_to(header);
        let cond = self.lower_condition(cond)?;
        let body_block = self.builder.create_block("for.body");
        let step_block = self.builder.create_block("for.step");
        let exit = self.builder.create_block("for.exit");
        self.builder.terminate(Terminator::CondBr {
            cond,
            then_block: body_block,
            else_block: exit,
        });

        self.builder.switch_to(body_block);
        self.lower_block(body)?;
        if !self.builder.is_terminated() {
            self.builder.terminate(Terminator::Br(step_block));
        }

        self.builder.switch_to(step_block);
        self.lower_expr(step)?;
        self.builder.terminate(Terminator::Br(header));

        self.builder.switch_to(exit);
        Ok(())
    }
}
