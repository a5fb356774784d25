//! Instruction builder.
//!
//! Owns the function while it is being built and tracks the current
//! insertion block, mirroring how the native backends drive their own
//! function builders. Allocas always land at the top of the entry block no
//! matter where emission currently is.

use super::{
    BasicBlock, BinaryOp, BlockId, CastOp, ConstValue, FloatPredicate, Function, Inst,
    IntPredicate, IrType, Terminator, ValueId,
};

pub struct FuncBuilder {
    func: Function,
    current: BlockId,
}

impl FuncBuilder {
    /// Wrap a fresh function and open its entry block.
    pub fn new(mut func: Function) -> Self {
        debug_assert!(func.blocks.is_empty());
        let entry = func.alloc_block("entry");
        Self {
            func,
            current: entry,
        }
    }

    pub fn finish(self) -> Function {
        self.func
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn switch_to(&mut self, block: BlockId) {
        debug_assert!((block.0 as usize) < self.func.blocks.len());
        self.current = block;
    }

    pub fn create_block(&mut self, label: impl Into<String>) -> BlockId {
        self.func.alloc_block(label)
    }

    /// Whether the current block already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.func.block(self.current).is_terminated()
    }

    pub fn terminate(&mut self, terminator: Terminator) {
        let block = self.func.block_mut(self.current);
        debug_assert!(block.terminator.is_none(), "block terminated twice");
        block.terminator = Some(terminator);
    }

    pub fn param_value(&self, index: usize) -> ValueId {
        self.func.param_value(index)
    }

    pub fn value_type(&self, value: ValueId) -> Option<&IrType> {
        self.func.value_type(value)
    }

    fn push(&mut self, inst: Inst) {
        let block = self.func.block_mut(self.current);
        debug_assert!(
            block.terminator.is_none(),
            "instruction after terminator in {}",
            block.id
        );
        block.insts.push(inst);
    }

    pub fn const_value(&mut self, value: ConstValue) -> ValueId {
        let dst = self.func.alloc_value(value.ty());
        self.push(Inst::Const { dst, value });
        dst
    }

    pub fn const_int(&mut self, ty: IrType, value: i64) -> ValueId {
        self.const_value(ConstValue::Int { ty, value })
    }

    pub fn const_f64(&mut self, value: f64) -> ValueId {
        self.const_value(ConstValue::Float(value))
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.const_value(ConstValue::Bool(value))
    }

    /// Stack slot in the entry block, inserted after any existing allocas.
    /// The produced value is a pointer to `ty`.
    pub fn create_entry_alloca(&mut self, ty: IrType, name: impl Into<String>) -> ValueId {
        let dst = self.func.alloc_value(IrType::Ptr(Box::new(ty.clone())));
        let entry = self.func.entry_block();
        let block = self.func.block_mut(entry);
        let at = block
            .insts
            .iter()
            .take_while(|inst| matches!(inst, Inst::Alloca { .. }))
            .count();
        block.insts.insert(
            at,
            Inst::Alloca {
                dst,
                ty,
                name: name.into(),
            },
        );
        dst
    }

    pub fn load(&mut self, ty: IrType, ptr: ValueId) -> ValueId {
        let dst = self.func.alloc_value(ty.clone());
        self.push(Inst::Load { dst, ty, ptr });
        dst
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) {
        self.push(Inst::Store { value, ptr });
    }

    pub fn binary(&mut self, op: BinaryOp, ty: IrType, lhs: ValueId, rhs: ValueId) -> ValueId {
        let dst = self.func.alloc_value(ty);
        self.push(Inst::Binary { dst, op, lhs, rhs });
        dst
    }

    pub fn icmp(&mut self, pred: IntPredicate, lhs: ValueId, rhs: ValueId) -> ValueId {
        let dst = self.func.alloc_value(IrType::I1);
        self.push(Inst::ICmp {
            dst,
            pred,
            lhs,
            rhs,
        });
        dst
    }

    pub fn fcmp(&mut self, pred: FloatPredicate, lhs: ValueId, rhs: ValueId) -> ValueId {
        let dst = self.func.alloc_value(IrType::I1);
        self.push(Inst::FCmp {
            dst,
            pred,
            lhs,
            rhs,
        });
        dst
    }

    pub fn cast(&mut self, op: CastOp, value: ValueId, to: IrType) -> ValueId {
        let dst = self.func.alloc_value(to.clone());
        self.push(Inst::Cast {
            dst,
            op,
            value,
            to,
        });
        dst
    }

    /// Call by symbol name. `return_type` of `Void` produces no value.
    pub fn call(
        &mut self,
        callee: impl Into<String>,
        return_type: IrType,
        args: Vec<ValueId>,
    ) -> Option<ValueId> {
        let dst = if return_type == IrType::Void {
            None
        } else {
            Some(self.func.alloc_value(return_type))
        };
        self.push(Inst::Call {
            dst,
            callee: callee.into(),
            args,
        });
        dst
    }

    pub fn phi(&mut self, ty: IrType, incomings: Vec<(BlockId, ValueId)>) -> ValueId {
        let dst = self.func.alloc_value(ty.clone());
        self.push(Inst::Phi {
            dst,
            ty,
            incomings,
        });
        dst
    }

    pub fn global_addr(&mut self, name: impl Into<String>, pointee: IrType) -> ValueId {
        let dst = self.func.alloc_value(IrType::Ptr(Box::new(pointee)));
        self.push(Inst::GlobalAddr {
            dst,
            name: name.into(),
        });
        dst
    }

    pub fn gep(&mut self, elem: IrType, base: ValueId, index: ValueId) -> ValueId {
        let dst = self.func.alloc_value(IrType::Ptr(Box::new(elem.clone())));
        self.push(Inst::Gep {
            dst,
            elem,
            base,
            index,
        });
        dst
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.func.block(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Linkage;

    fn empty_func() -> Function {
        Function::new("t", vec![], IrType::Void, false, Linkage::External)
    }

    #[test]
    fn allocas_stay_at_entry_top() {
        let mut b = FuncBuilder::new(empty_func());
        let one = b.const_int(IrType::I32, 1);
        let slot_a = b.create_entry_alloca(IrType::I32, "a");
        b.store(one, slot_a);

        let body = b.create_block("body");
        b.terminate(Terminator::Br(body));
        b.switch_to(body);
        let slot_b = b.create_entry_alloca(IrType::F64, "b");
        b.terminate(Terminator::Ret(None));

        let func = b.finish();
        let entry = func.block(func.entry_block());
        assert!(matches!(entry.insts[0], Inst::Alloca { dst, .. } if dst == slot_a));
        assert!(matches!(entry.insts[1], Inst::Alloca { dst, .. } if dst == slot_b));
        assert!(matches!(entry.insts[2], Inst::Const { .. }));
    }

    #[test]
    fn value_types_are_tracked() {
        let mut b = FuncBuilder::new(empty_func());
        let c = b.const_f64(1.5);
        assert_eq!(b.value_type(c), Some(&IrType::F64));
        let slot = b.create_entry_alloca(IrType::I8, "x");
        assert_eq!(b.value_type(slot), Some(&IrType::Ptr(Box::new(IrType::I8))));
        let loaded = b.load(IrType::I8, slot);
        assert_eq!(b.value_type(loaded), Some(&IrType::I8));
    }

    #[test]
    fn void_call_produces_no_value() {
        let mut b = FuncBuilder::new(empty_func());
        assert!(b.call("f", IrType::Void, vec![]).is_none());
        assert!(b.call("g", IrType::I32, vec![]).is_some());
    }
}
