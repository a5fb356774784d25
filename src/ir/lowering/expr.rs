//! Expression lowering: every expression produces a typed SSA value.

use crate::ast::{BinOp, Expr, UnaryOp, UnaryPosition};
use crate::error::CompileError;
use crate::ir::{BinaryOp, CastOp, FloatPredicate, IntPredicate, IrType, ValueId};
use crate::types::{SemType, TypeKind};

use super::scopes::Slot;
use super::stmt::FuncLower;

/// An SSA value paired with its semantic type. Void calls carry no value.
pub(crate) struct TypedValue {
    pub value: Option<ValueId>,
    pub ty: SemType,
}

impl TypedValue {
    fn new(value: ValueId, ty: SemType) -> Self {
        Self {
            value: Some(value),
            ty,
        }
    }

    fn void() -> Self {
        Self {
            value: None,
            ty: SemType::VOID,
        }
    }

    pub fn expect_value(&self, what: &str) -> Result<ValueId, CompileError> {
        self.value
            .ok_or_else(|| CompileError::emit(format!("{} has no value (type void)", what)))
    }
}

impl FuncLower<'_> {
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Result<TypedValue, CompileError> {
        match expr {
            Expr::Number { value, is_float } => {
                if *is_float {
                    let v = self.builder.const_f64(*value);
                    Ok(TypedValue::new(v, SemType::DOUBLE))
                } else {
                    let v = self.builder.const_int(IrType::I32, *value as i64);
                    Ok(TypedValue::new(v, SemType::INTEGER))
                }
            }
            Expr::Boolean(value) => {
                let v = self.builder.const_bool(*value);
                Ok(TypedValue::new(v, SemType::BOOLEAN))
            }
            Expr::Str { bytes } => self.lower_string(bytes),
            Expr::Ident { name } => self.lower_ident(name),
            Expr::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            Expr::Unary {
                op,
                position,
                operand,
            } => self.lower_unary(*op, *position, operand),
            Expr::Call { callee, args } => self.lower_call(callee, args),
            Expr::Ternary { .. } | Expr::FieldAccess { .. } | Expr::MethodCall { .. } => Err(
                CompileError::emit("unsupported expression in this context"),
            ),
        }
    }

    /// A string literal is a private constant byte array; its value is the
    /// pointer to the first byte.
    fn lower_string(&mut self, bytes: &[u8]) -> Result<TypedValue, CompileError> {
        let name = self.module.intern_string(bytes);
        let addr = self.builder.global_addr(name, IrType::I8);
        let zero = self.builder.const_int(IrType::I32, 0);
        let ptr = self.builder.gep(IrType::I8, addr, zero);
        Ok(TypedValue::new(ptr, SemType::STR))
    }

    /// Load from the nearest local slot, falling back to module globals.
    fn lower_ident(&mut self, name: &str) -> Result<TypedValue, CompileError> {
        if let Some(slot) = self.cx.symbols.lookup(name) {
            let value = self.builder.load(slot.ty.lower(), slot.ptr);
            return Ok(TypedValue::new(value, slot.ty));
        }
        if let Some(binding) = self.cx.globals.get(name).copied() {
            let addr = self.builder.global_addr(name, binding.ty.lower());
            let value = self.builder.load(binding.ty.lower(), addr);
            return Ok(TypedValue::new(value, binding.ty));
        }
        Err(CompileError::emit(format!(
            "unknown variable name: {}",
            name
        )))
    }

    fn lower_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<TypedValue, CompileError> {
        let lhs = self.lower_expr(lhs)?;
        let rhs = self.lower_expr(rhs)?;

        if lhs.ty.is_pointer_like() || rhs.ty.is_pointer_like() {
            return Err(CompileError::emit(format!(
                "unsupported operation '{}' on pointer operands",
                op.symbol()
            )));
        }

        let result_ty = if lhs.ty == rhs.ty {
            lhs.ty
        } else {
            match lhs.ty.promote(&rhs.ty) {
                Some(ty) => ty,
                None => {
                    return Err(CompileError::emit(format!(
                        "type mismatch: {} and {}",
                        lhs.ty, rhs.ty
                    )))
                }
            }
        };

        if !result_ty.supports_binary(op, &result_ty) {
            return Err(CompileError::emit(format!(
                "operation '{}' is not supported for {}",
                op.symbol(),
                result_ty
            )));
        }

        let lhs_raw = lhs.expect_value("left operand")?;
        let rhs_raw = rhs.expect_value("right operand")?;
        let lhs_cast = self.ensure_cast(lhs_raw, &lhs.ty.lower(), &result_ty.lower())?;
        let rhs_cast = self.ensure_cast(rhs_raw, &rhs.ty.lower(), &result_ty.lower())?;

        self.emit_binary_op(op, result_ty, lhs_cast, rhs_cast)
    }

    /// Operands are already cast to `ty`; pick the instruction by operator
    /// and by the type's float/signedness split.
    fn emit_binary_op(
        &mut self,
        op: BinOp,
        ty: SemType,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<TypedValue, CompileError> {
        if op.is_comparison() {
            let value = if ty.is_float() {
                let pred = match op {
                    BinOp::Eq => FloatPredicate::Oeq,
                    BinOp::Ne => FloatPredicate::One,
                    BinOp::Lt => FloatPredicate::Olt,
                    BinOp::Le => FloatPredicate::Ole,
                    BinOp::Gt => FloatPredicate::Ogt,
                    _ => FloatPredicate::Oge,
                };
                self.builder.fcmp(pred, lhs, rhs)
            } else {
                let signed = ty.is_signed();
                let pred = match op {
                    BinOp::Eq => IntPredicate::Eq,
                    BinOp::Ne => IntPredicate::Ne,
                    BinOp::Lt => {
                        if signed {
                            IntPredicate::Slt
                        } else {
                            IntPredicate::Ult
                        }
                    }
                    BinOp::Le => {
                        if signed {
                            IntPredicate::Sle
                        } else {
                            IntPredicate::Ule
                        }
                    }
                    BinOp::Gt => {
                        if signed {
                            IntPredicate::Sgt
                        } else {
                            IntPredicate::Ugt
                        }
                    }
                    _ => {
                        if signed {
                            IntPredicate::Sge
                        } else {
                            IntPredicate::Uge
                        }
                    }
                };
                self.builder.icmp(pred, lhs, rhs)
            };
            return Ok(TypedValue::new(value, SemType::BOOLEAN));
        }

        let ir_ty = ty.lower();
        let ir_op = match op {
            BinOp::Add => {
                if ty.is_float() {
                    BinaryOp::FAdd
                } else {
                    BinaryOp::Add
                }
            }
            BinOp::Sub => {
                if ty.is_float() {
                    BinaryOp::FSub
                } else {
                    BinaryOp::Sub
                }
            }
            BinOp::Mul => {
                if ty.is_float() {
                    BinaryOp::FMul
                } else {
                    BinaryOp::Mul
                }
            }
            BinOp::Div => {
                if ty.is_float() {
                    BinaryOp::FDiv
                } else if ty.is_signed() {
                    BinaryOp::SDiv
                } else {
                    BinaryOp::UDiv
                }
            }
            // Non-short-circuiting logic on i1.
            BinOp::LogicalAnd | BinOp::BitAnd => BinaryOp::And,
            BinOp::LogicalOr | BinOp::BitOr => BinaryOp::Or,
            BinOp::BitXor => BinaryOp::Xor,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                unreachable!("comparisons handled above")
            }
        };
        let value = self.builder.binary(ir_op, ir_ty, lhs, rhs);
        Ok(TypedValue::new(value, ty))
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        position: UnaryPosition,
        operand: &Expr,
    ) -> Result<TypedValue, CompileError> {
        match op {
            UnaryOp::Increment | UnaryOp::Decrement => {
                self.lower_step(op, position, operand)
            }
            UnaryOp::Plus | UnaryOp::Minus | UnaryOp::Not => {
                let value = self.lower_expr(operand)?;
                if !value.ty.supports_unary(op) {
                    return Err(CompileError::emit(format!(
                        "unary '{}' is not supported for {}",
                        op.symbol(),
                        value.ty
                    )));
                }
                let raw = value.expect_value("unary operand")?;
                match op {
                    UnaryOp::Plus => Ok(TypedValue::new(raw, value.ty)),
                    UnaryOp::Minus => {
                        // Negation as subtraction from zero.
                        let result = if value.ty.is_float() {
                            let zero = self.builder.const_f64(0.0);
                            self.builder.binary(BinaryOp::FSub, IrType::F64, zero, raw)
                        } else {
                            let ir_ty = value.ty.lower();
                            let zero = self.builder.const_int(ir_ty.clone(), 0);
                            self.builder.binary(BinaryOp::Sub, ir_ty, zero, raw)
                        };
                        Ok(TypedValue::new(result, value.ty))
                    }
                    UnaryOp::Not => {
                        let t = self.builder.const_bool(true);
                        let result = self.builder.binary(BinaryOp::Xor, IrType::I1, raw, t);
                        Ok(TypedValue::new(result, SemType::BOOLEAN))
                    }
                    _ => unreachable!(),
                }
            }
        }
    }

    /// `++`/`--` load the variable, add the delta, store the result back,
    /// and yield the new value for the prefix form or the old value for the
    /// postfix form.
    fn lower_step(
        &mut self,
        op: UnaryOp,
        position: UnaryPosition,
        operand: &Expr,
    ) -> Result<TypedValue, CompileError> {
        let name = match operand {
            Expr::Ident { name } => name,
            _ => {
                return Err(CompileError::emit(format!(
                    "'{}' requires a variable operand",
                    op.symbol()
                )))
            }
        };
        let slot = self.resolve_mutable_slot(name)?;
        if !slot.ty.supports_unary(op) {
            return Err(CompileError::emit(format!(
                "unary '{}' is not supported for {}",
                op.symbol(),
                slot.ty
            )));
        }

        let old = self.builder.load(slot.ty.lower(), slot.ptr);
        let delta = if op == UnaryOp::Increment { 1 } else { -1 };
        let new = if slot.ty.is_float() {
            let one = self.builder.const_f64(delta as f64);
            self.builder.binary(BinaryOp::FAdd, IrType::F64, old, one)
        } else {
            let ir_ty = slot.ty.lower();
            let one = self.builder.const_int(ir_ty.clone(), delta);
            self.builder.binary(BinaryOp::Add, ir_ty, old, one)
        };
        self.builder.store(new, slot.ptr);

        let result = match position {
            UnaryPosition::Prefix => new,
            UnaryPosition::Postfix => old,
        };
        Ok(TypedValue::new(result, slot.ty))
    }

    fn resolve_mutable_slot(&mut self, name: &str) -> Result<Slot, CompileError> {
        if let Some(slot) = self.cx.symbols.lookup(name) {
            return Ok(slot);
        }
        if let Some(binding) = self.cx.globals.get(name) {
            if binding.constant {
                return Err(CompileError::emit(format!(
                    "variable '{}' is constant",
                    name
                )));
            }
            let ty = binding.ty;
            let addr = self.builder.global_addr(name, ty.lower());
            return Ok(Slot { ptr: addr, ty });
        }
        Err(CompileError::emit(format!(
            "unknown variable name: {}",
            name
        )))
    }

    /// Resolve the callee to a module function or a registered prototype
    /// (declared on demand), check arity, cast arguments to the known
    /// parameter types, and emit the call.
    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> Result<TypedValue, CompileError> {
        let proto = match self.cx.protos.get(callee) {
            Some(proto) => proto.clone(),
            None => {
                return Err(CompileError::emit(format!(
                    "undefined reference: '{}'",
                    callee
                )))
            }
        };

        // Prototypes known only from a declaration are materialized in the
        // module the first time they are called.
        if self.module.function(callee).is_none() {
            let params = proto
                .params
                .iter()
                .map(|p| (p.name.clone(), p.ty.lower()))
                .collect();
            self.module.add_function(crate::ir::Function::new(
                proto.name.clone(),
                params,
                proto.return_type.lower(),
                proto.is_var_args,
                crate::ir::Linkage::External,
            ));
        }

        let fixed = proto.params.len();
        let arity_ok = if proto.is_var_args {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if !arity_ok {
            return Err(CompileError::emit(format!(
                "argument count mismatch in call to '{}': expected {}, got {}",
                callee,
                fixed,
                args.len()
            )));
        }

        let mut lowered = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let value = self.lower_expr(arg)?;
            let raw = value.expect_value("call argument")?;
            let casted = if i < fixed {
                self.ensure_cast(raw, &value.ty.lower(), &proto.params[i].ty.lower())?
            } else {
                raw
            };
            lowered.push(casted);
        }

        let ret = proto.return_type;
        match self.builder.call(callee, ret.lower(), lowered) {
            Some(value) => Ok(TypedValue::new(value, ret)),
            None => Ok(TypedValue::void()),
        }
    }

    /// Coerce a condition to i1: booleans pass through, numerics compare
    /// against zero.
    pub(crate) fn lower_condition(&mut self, expr: &Expr) -> Result<ValueId, CompileError> {
        let value = self.lower_expr(expr)?;
        let raw = value.expect_value("condition")?;
        match value.ty.kind {
            TypeKind::Boolean if !value.ty.pointer => Ok(raw),
            TypeKind::Byte | TypeKind::Char | TypeKind::Integer if !value.ty.pointer => {
                let zero = self.builder.const_int(value.ty.lower(), 0);
                Ok(self.builder.icmp(IntPredicate::Ne, raw, zero))
            }
            TypeKind::Double if !value.ty.pointer => {
                let zero = self.builder.const_f64(0.0);
                Ok(self.builder.fcmp(FloatPredicate::One, raw, zero))
            }
            _ => Err(CompileError::emit(format!(
                "unsupported condition type: {}",
                value.ty
            ))),
        }
    }

    /// Insert the implicit conversion from `from` to `to`, or fail when no
    /// legal cast exists. Casting into i1 is never implicit.
    pub(crate) fn ensure_cast(
        &mut self,
        value: ValueId,
        from: &IrType,
        to: &IrType,
    ) -> Result<ValueId, CompileError> {
        if from == to {
            return Ok(value);
        }

        let unsupported = || {
            CompileError::emit(format!("unsupported cast from {} to {}", from, to))
        };

        if *to == IrType::I1 {
            return Err(unsupported());
        }
        if from.is_float() && to.is_int() {
            return Ok(self.builder.cast(CastOp::FpToSi, value, to.clone()));
        }
        if from.is_int() && to.is_float() {
            return Ok(self.builder.cast(CastOp::SiToFp, value, to.clone()));
        }
        if from.is_int() && to.is_int() {
            let src = from.int_width().unwrap_or(0);
            let dst = to.int_width().unwrap_or(0);
            let op = if src == 1 {
                CastOp::Zext
            } else if dst > src {
                CastOp::Sext
            } else {
                CastOp::Trunc
            };
            return Ok(self.builder.cast(op, value, to.clone()));
        }
        Err(unsupported())
    }

    /// Zero of a semantic type, used for initializer-less declarations.
    pub(crate) fn zero_value(&mut self, ty: &SemType) -> Result<ValueId, CompileError> {
        if ty.is_pointer_like() {
            return Err(CompileError::emit(format!(
                "variable of type {} requires an initializer",
                ty
            )));
        }
        Ok(match ty.kind {
            TypeKind::Boolean => self.builder.const_bool(false),
            TypeKind::Double => self.builder.const_f64(0.0),
            _ => self.builder.const_int(ty.lower(), 0),
        })
    }
}
