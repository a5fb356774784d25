//! IR → Cranelift translation.
//!
//! Globals and interned strings become data objects; every defined function
//! is translated block-for-block with a `FunctionBuilder`. Allocas map to
//! explicit stack slots whose address feeds the IR's loads and stores, phis
//! map to block parameters fed through branch arguments.

use std::collections::HashMap;

use cranelift::prelude::*;
use cranelift_codegen::ir::{FuncRef, GlobalValue};
use cranelift_codegen::settings;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};

use super::runtime;
use super::BackendError;
use crate::ir;
use crate::ir::{
    BinaryOp, BlockId, CastOp, ConstValue, FloatPredicate, GlobalInit, Inst, IntPredicate, IrType,
    Terminator, ValueId,
};

pub struct ClifCodegen {
    module: JITModule,
    ctx: codegen::Context,
    builder_ctx: FunctionBuilderContext,
    func_ids: HashMap<String, FuncId>,
    data_ids: HashMap<String, DataId>,
    /// Functions with bodies, resolvable to addresses after finalization.
    defined: HashMap<String, FuncId>,
    ptr_type: Type,
}

impl ClifCodegen {
    pub fn new() -> Result<Self, BackendError> {
        let mut flag_builder = settings::builder();
        for (flag, value) in [
            ("use_colocated_libcalls", "false"),
            ("is_pic", "false"),
            ("enable_verifier", "true"),
        ] {
            flag_builder
                .set(flag, value)
                .map_err(|e| BackendError::Codegen(format!("invalid flag {}: {}", flag, e)))?;
        }

        let isa_builder = cranelift_native::builder()
            .map_err(|e| BackendError::Codegen(format!("host ISA unavailable: {}", e)))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| BackendError::Codegen(format!("failed to build ISA: {}", e)))?;

        let mut jit_builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        // Environment functions linked into every unit.
        jit_builder.symbol("print", runtime::print as *const u8);

        let module = JITModule::new(jit_builder);
        let ctx = module.make_context();
        let ptr_type = module.target_config().pointer_type();

        Ok(Self {
            module,
            ctx,
            builder_ctx: FunctionBuilderContext::new(),
            func_ids: HashMap::new(),
            data_ids: HashMap::new(),
            defined: HashMap::new(),
            ptr_type,
        })
    }

    /// Translate and compile a whole IR module.
    pub fn compile_module(&mut self, unit: &ir::Module) -> Result<(), BackendError> {
        self.define_globals(unit)?;

        for func in &unit.functions {
            let sig = self.signature(func);
            let linkage = if func.is_declaration() {
                Linkage::Import
            } else {
                Linkage::Export
            };
            let id = self
                .module
                .declare_function(&func.name, linkage, &sig)
                .map_err(|e| {
                    BackendError::Codegen(format!("failed to declare '{}': {}", func.name, e))
                })?;
            self.func_ids.insert(func.name.clone(), id);
        }

        for func in unit.functions.iter().filter(|f| !f.is_declaration()) {
            self.define_function(unit, func)?;
        }

        self.module
            .finalize_definitions()
            .map_err(|e| BackendError::Jit(format!("failed to finalize module: {}", e)))?;
        Ok(())
    }

    /// Address of a compiled function. Only valid after `compile_module`.
    pub fn finalized_function(&self, name: &str) -> Option<*const u8> {
        self.defined
            .get(name)
            .map(|id| self.module.get_finalized_function(*id))
    }

    fn define_globals(&mut self, unit: &ir::Module) -> Result<(), BackendError> {
        // Declare everything first so pointer initializers can reference
        // their target regardless of declaration order.
        for global in &unit.globals {
            let id = self
                .module
                .declare_data(&global.name, Linkage::Local, !global.constant, false)
                .map_err(|e| {
                    BackendError::Codegen(format!("failed to declare '{}': {}", global.name, e))
                })?;
            self.data_ids.insert(global.name.clone(), id);
        }

        let mut data_desc = DataDescription::new();
        for global in &unit.globals {
            match &global.init {
                GlobalInit::Bytes(bytes) => {
                    data_desc.define(bytes.clone().into_boxed_slice());
                }
                GlobalInit::Scalar(value) => {
                    data_desc.define(scalar_bytes(value).into_boxed_slice());
                }
                GlobalInit::Zero => {
                    data_desc.define(vec![0; global.ty.byte_size() as usize].into_boxed_slice());
                }
                GlobalInit::StrPtr(target) => {
                    // A pointer-sized cell relocated to the target global.
                    data_desc
                        .define(vec![0; self.ptr_type.bytes() as usize].into_boxed_slice());
                    let target_id = self.data_ids.get(target).ok_or_else(|| {
                        BackendError::Codegen(format!("unknown global '{}'", target))
                    })?;
                    let gv = self.module.declare_data_in_data(*target_id, &mut data_desc);
                    data_desc.write_data_addr(0, gv, 0);
                }
            }
            let id = match self.data_ids.get(&global.name) {
                Some(id) => *id,
                None => {
                    return Err(BackendError::Codegen(format!(
                        "global '{}' was never declared",
                        global.name
                    )))
                }
            };
            self.module.define_data(id, &data_desc).map_err(|e| {
                BackendError::Codegen(format!("failed to define '{}': {}", global.name, e))
            })?;
            data_desc.clear();
        }
        Ok(())
    }

    fn signature(&self, func: &ir::Function) -> Signature {
        let mut sig = self.module.make_signature();
        for (_, ty) in &func.params {
            sig.params.push(AbiParam::new(clif_type(ty, self.ptr_type)));
        }
        if func.return_type != IrType::Void {
            sig.returns
                .push(AbiParam::new(clif_type(&func.return_type, self.ptr_type)));
        }
        sig
    }

    fn define_function(
        &mut self,
        unit: &ir::Module,
        func: &ir::Function,
    ) -> Result<(), BackendError> {
        self.ctx.clear();
        self.ctx.func.signature = self.signature(func);

        {
            let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
            let mut translator = FnTranslator {
                builder: &mut builder,
                module: &mut self.module,
                func_ids: &self.func_ids,
                data_ids: &self.data_ids,
                unit,
                func,
                ptr_type: self.ptr_type,
                values: HashMap::new(),
                blocks: HashMap::new(),
                func_refs: HashMap::new(),
                globals: HashMap::new(),
                phis: HashMap::new(),
            };
            translator.translate()?;
            builder.seal_all_blocks();
            builder.finalize();
        }

        let id = match self.func_ids.get(&func.name) {
            Some(id) => *id,
            None => {
                return Err(BackendError::Codegen(format!(
                    "function '{}' was never declared",
                    func.name
                )))
            }
        };
        self.module.define_function(id, &mut self.ctx).map_err(|e| {
            BackendError::Codegen(format!("failed to compile '{}': {}", func.name, e))
        })?;
        self.defined.insert(func.name.clone(), id);
        Ok(())
    }
}

fn clif_type(ty: &IrType, ptr_type: Type) -> Type {
    match ty {
        // No single-bit type; booleans travel as i8.
        IrType::I1 | IrType::I8 => types::I8,
        IrType::I32 => types::I32,
        IrType::F64 => types::F64,
        IrType::Ptr(_) => ptr_type,
        IrType::Void => types::I8,
    }
}

fn scalar_bytes(value: &ConstValue) -> Vec<u8> {
    match value {
        ConstValue::Int {
            ty: IrType::I8 | IrType::I1,
            value,
        } => vec![*value as u8],
        ConstValue::Int { value, .. } => (*value as i32).to_le_bytes().to_vec(),
        ConstValue::Float(value) => value.to_le_bytes().to_vec(),
        ConstValue::Bool(value) => vec![*value as u8],
    }
}

struct PhiSpec {
    dst: ValueId,
    ty: IrType,
    incomings: Vec<(BlockId, ValueId)>,
}

struct FnTranslator<'a, 'b> {
    builder: &'a mut FunctionBuilder<'b>,
    module: &'a mut JITModule,
    func_ids: &'a HashMap<String, FuncId>,
    data_ids: &'a HashMap<String, DataId>,
    unit: &'a ir::Module,
    func: &'a ir::Function,
    ptr_type: Type,
    values: HashMap<ValueId, Value>,
    blocks: HashMap<BlockId, Block>,
    func_refs: HashMap<String, FuncRef>,
    globals: HashMap<String, GlobalValue>,
    phis: HashMap<BlockId, Vec<PhiSpec>>,
}

impl FnTranslator<'_, '_> {
    fn translate(&mut self) -> Result<(), BackendError> {
        // Phis become block parameters; collect them up front so branch
        // translation can pass the matching arguments.
        for block in &self.func.blocks {
            let specs: Vec<PhiSpec> = block
                .insts
                .iter()
                .filter_map(|inst| match inst {
                    Inst::Phi {
                        dst,
                        ty,
                        incomings,
                    } => Some(PhiSpec {
                        dst: *dst,
                        ty: ty.clone(),
                        incomings: incomings.clone(),
                    }),
                    _ => None,
                })
                .collect();
            if !specs.is_empty() {
                self.phis.insert(block.id, specs);
            }
        }

        for block in &self.func.blocks {
            let clif_block = self.builder.create_block();
            if let Some(specs) = self.phis.get(&block.id) {
                for spec in specs {
                    self.builder
                        .append_block_param(clif_block, clif_type(&spec.ty, self.ptr_type));
                }
            }
            self.blocks.insert(block.id, clif_block);
        }

        for (index, block) in self.func.blocks.iter().enumerate() {
            let clif_block = self.blocks[&block.id];
            if index == 0 {
                self.builder
                    .append_block_params_for_function_params(clif_block);
                self.builder.switch_to_block(clif_block);
                let params = self.builder.block_params(clif_block).to_vec();
                for (i, value) in params.iter().enumerate() {
                    self.values.insert(self.func.param_value(i), *value);
                }
            } else {
                self.builder.switch_to_block(clif_block);
                if let Some(specs) = self.phis.get(&block.id) {
                    let params = self.builder.block_params(clif_block).to_vec();
                    for (spec, value) in specs.iter().zip(params) {
                        self.values.insert(spec.dst, value);
                    }
                }
            }

            for inst in &block.insts {
                self.translate_inst(inst)?;
            }

            match &block.terminator {
                Some(term) => self.translate_terminator(block.id, term)?,
                None => {
                    return Err(BackendError::Codegen(format!(
                        "block {} reached the backend without a terminator",
                        block.id
                    )))
                }
            }
        }

        Ok(())
    }

    fn value(&self, id: ValueId) -> Result<Value, BackendError> {
        self.values
            .get(&id)
            .copied()
            .ok_or_else(|| BackendError::Codegen(format!("undefined value {}", id)))
    }

    fn ir_type(&self, id: ValueId) -> Result<&IrType, BackendError> {
        self.func
            .value_type(id)
            .ok_or_else(|| BackendError::Codegen(format!("untyped value {}", id)))
    }

    fn translate_inst(&mut self, inst: &Inst) -> Result<(), BackendError> {
        match inst {
            Inst::Const { dst, value } => {
                let v = match value {
                    ConstValue::Int { ty, value } => self
                        .builder
                        .ins()
                        .iconst(clif_type(ty, self.ptr_type), *value),
                    ConstValue::Float(value) => self.builder.ins().f64const(*value),
                    ConstValue::Bool(value) => {
                        self.builder.ins().iconst(types::I8, *value as i64)
                    }
                };
                self.values.insert(*dst, v);
            }

            Inst::Alloca { dst, ty, .. } => {
                let size = ty.byte_size().max(1);
                let align_shift = match size {
                    1 => 0,
                    4 => 2,
                    _ => 3,
                };
                let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
                    StackSlotKind::ExplicitSlot,
                    size,
                    align_shift,
                ));
                let addr = self.builder.ins().stack_addr(self.ptr_type, slot, 0);
                self.values.insert(*dst, addr);
            }

            Inst::Load { dst, ty, ptr } => {
                let addr = self.value(*ptr)?;
                let v = self.builder.ins().load(
                    clif_type(ty, self.ptr_type),
                    MemFlags::new(),
                    addr,
                    0,
                );
                self.values.insert(*dst, v);
            }

            Inst::Store { value, ptr } => {
                let v = self.value(*value)?;
                let addr = self.value(*ptr)?;
                self.builder.ins().store(MemFlags::new(), v, addr, 0);
            }

            Inst::Binary { dst, op, lhs, rhs } => {
                let l = self.value(*lhs)?;
                let r = self.value(*rhs)?;
                let ins = self.builder.ins();
                let v = match op {
                    BinaryOp::Add => ins.iadd(l, r),
                    BinaryOp::Sub => ins.isub(l, r),
                    BinaryOp::Mul => ins.imul(l, r),
                    BinaryOp::SDiv => ins.sdiv(l, r),
                    BinaryOp::UDiv => ins.udiv(l, r),
                    BinaryOp::FAdd => ins.fadd(l, r),
                    BinaryOp::FSub => ins.fsub(l, r),
                    BinaryOp::FMul => ins.fmul(l, r),
                    BinaryOp::FDiv => ins.fdiv(l, r),
                    BinaryOp::And => ins.band(l, r),
                    BinaryOp::Or => ins.bor(l, r),
                    BinaryOp::Xor => ins.bxor(l, r),
                };
                self.values.insert(*dst, v);
            }

            Inst::ICmp {
                dst,
                pred,
                lhs,
                rhs,
            } => {
                let l = self.value(*lhs)?;
                let r = self.value(*rhs)?;
                let cc = match pred {
                    IntPredicate::Eq => IntCC::Equal,
                    IntPredicate::Ne => IntCC::NotEqual,
                    IntPredicate::Slt => IntCC::SignedLessThan,
                    IntPredicate::Sle => IntCC::SignedLessThanOrEqual,
                    IntPredicate::Sgt => IntCC::SignedGreaterThan,
                    IntPredicate::Sge => IntCC::SignedGreaterThanOrEqual,
                    IntPredicate::Ult => IntCC::UnsignedLessThan,
                    IntPredicate::Ule => IntCC::UnsignedLessThanOrEqual,
                    IntPredicate::Ugt => IntCC::UnsignedGreaterThan,
                    IntPredicate::Uge => IntCC::UnsignedGreaterThanOrEqual,
                };
                let v = self.builder.ins().icmp(cc, l, r);
                self.values.insert(*dst, v);
            }

            Inst::FCmp {
                dst,
                pred,
                lhs,
                rhs,
            } => {
                let l = self.value(*lhs)?;
                let r = self.value(*rhs)?;
                let cc = match pred {
                    FloatPredicate::Oeq => FloatCC::Equal,
                    FloatPredicate::One => FloatCC::NotEqual,
                    FloatPredicate::Olt => FloatCC::LessThan,
                    FloatPredicate::Ole => FloatCC::LessThanOrEqual,
                    FloatPredicate::Ogt => FloatCC::GreaterThan,
                    FloatPredicate::Oge => FloatCC::GreaterThanOrEqual,
                };
                let v = self.builder.ins().fcmp(cc, l, r);
                self.values.insert(*dst, v);
            }

            Inst::Cast {
                dst,
                op,
                value,
                to,
            } => {
                let v = self.value(*value)?;
                let from_clif = clif_type(self.ir_type(*value)?, self.ptr_type);
                let to_clif = clif_type(to, self.ptr_type);
                let out = if from_clif == to_clif {
                    // i1 widening to i8 is a no-op at this level.
                    v
                } else {
                    let ins = self.builder.ins();
                    match op {
                        CastOp::Sext => ins.sextend(to_clif, v),
                        CastOp::Zext => ins.uextend(to_clif, v),
                        CastOp::Trunc => ins.ireduce(to_clif, v),
                        CastOp::FpToSi => ins.fcvt_to_sint(to_clif, v),
                        CastOp::SiToFp => ins.fcvt_from_sint(to_clif, v),
                    }
                };
                self.values.insert(*dst, out);
            }

            Inst::Call { dst, callee, args } => {
                if let Some(target) = self.unit.function(callee) {
                    if target.is_var_args && args.len() > target.params.len() {
                        return Err(BackendError::Unsupported(format!(
                            "variadic call to '{}' with extra arguments",
                            callee
                        )));
                    }
                }
                let func_ref = self.func_ref(callee)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.value(*arg)?);
                }
                let call = self.builder.ins().call(func_ref, &arg_values);
                if let Some(dst) = dst {
                    let results = self.builder.inst_results(call);
                    match results.first() {
                        Some(v) => {
                            let v = *v;
                            self.values.insert(*dst, v);
                        }
                        None => {
                            return Err(BackendError::Codegen(format!(
                                "call to '{}' produced no result",
                                callee
                            )))
                        }
                    }
                }
            }

            // Handled as block parameters during block setup.
            Inst::Phi { .. } => {}

            Inst::GlobalAddr { dst, name } => {
                let gv = self.global_ref(name)?;
                let addr = self.builder.ins().global_value(self.ptr_type, gv);
                self.values.insert(*dst, addr);
            }

            Inst::Gep {
                dst,
                elem,
                base,
                index,
            } => {
                let base_val = self.value(*base)?;
                let index_val = self.value(*index)?;
                let index_clif = clif_type(self.ir_type(*index)?, self.ptr_type);
                let extended = if index_clif == self.ptr_type {
                    index_val
                } else {
                    self.builder.ins().sextend(self.ptr_type, index_val)
                };
                let size = elem.byte_size().max(1) as i64;
                let offset = if size == 1 {
                    extended
                } else {
                    self.builder.ins().imul_imm(extended, size)
                };
                let addr = self.builder.ins().iadd(base_val, offset);
                self.values.insert(*dst, addr);
            }
        }
        Ok(())
    }

    fn translate_terminator(
        &mut self,
        from: BlockId,
        term: &Terminator,
    ) -> Result<(), BackendError> {
        match term {
            Terminator::Br(target) => {
                let args = self.branch_args(from, *target)?;
                let block = self.blocks[target];
                self.builder.ins().jump(block, &args);
            }
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                let cond_val = self.value(*cond)?;
                let then_args = self.branch_args(from, *then_block)?;
                let else_args = self.branch_args(from, *else_block)?;
                let t = self.blocks[then_block];
                let e = self.blocks[else_block];
                self.builder
                    .ins()
                    .brif(cond_val, t, &then_args, e, &else_args);
            }
            Terminator::Ret(value) => match value {
                Some(value) => {
                    let v = self.value(*value)?;
                    self.builder.ins().return_(&[v]);
                }
                None => {
                    self.builder.ins().return_(&[]);
                }
            },
            Terminator::Unreachable => {
                self.builder.ins().trap(TrapCode::user(1).expect("user trap code"));
            }
        }
        Ok(())
    }

    /// Branch arguments feeding the target block's phis, in phi order.
    fn branch_args(&self, from: BlockId, to: BlockId) -> Result<Vec<Value>, BackendError> {
        let specs = match self.phis.get(&to) {
            Some(specs) => specs,
            None => return Ok(Vec::new()),
        };
        let mut args = Vec::with_capacity(specs.len());
        for spec in specs {
            let incoming = spec
                .incomings
                .iter()
                .find(|(block, _)| *block == from)
                .map(|(_, value)| *value)
                .ok_or_else(|| {
                    BackendError::Codegen(format!(
                        "phi {} in {} has no incoming for predecessor {}",
                        spec.dst, to, from
                    ))
                })?;
            args.push(self.value(incoming)?);
        }
        Ok(args)
    }

    fn func_ref(&mut self, name: &str) -> Result<FuncRef, BackendError> {
        if let Some(func_ref) = self.func_refs.get(name) {
            return Ok(*func_ref);
        }
        let id = self
            .func_ids
            .get(name)
            .ok_or_else(|| BackendError::Codegen(format!("call to undeclared '{}'", name)))?;
        let func_ref = self.module.declare_func_in_func(*id, self.builder.func);
        self.func_refs.insert(name.to_string(), func_ref);
        Ok(func_ref)
    }

    fn global_ref(&mut self, name: &str) -> Result<GlobalValue, BackendError> {
        if let Some(gv) = self.globals.get(name) {
            return Ok(*gv);
        }
        let id = self
            .data_ids
            .get(name)
            .ok_or_else(|| BackendError::Codegen(format!("unknown global '{}'", name)))?;
        let gv = self.module.declare_data_in_func(*id, self.builder.func);
        self.globals.insert(name.to_string(), gv);
        Ok(gv)
    }
}
