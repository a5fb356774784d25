//! JIT runtime: owns the compiled module and hands out callable entry
//! points. Compiled function pointers stay valid for the lifetime of this
//! value.

use log::debug;

use super::cranelift::ClifCodegen;
use super::BackendError;
use crate::ir;

pub struct JitRuntime {
    codegen: ClifCodegen,
}

impl JitRuntime {
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self {
            codegen: ClifCodegen::new()?,
        })
    }

    /// Compile a verified IR module to native code.
    pub fn compile(&mut self, unit: &ir::Module) -> Result<(), BackendError> {
        debug!(
            "jit-compiling module '{}' ({} functions, {} globals)",
            unit.name,
            unit.functions.len(),
            unit.globals.len()
        );
        self.codegen.compile_module(unit)
    }

    /// Address of a compiled (defined) function.
    pub fn function_addr(&self, name: &str) -> Option<*const u8> {
        self.codegen.finalized_function(name)
    }

    /// Invoke the synthetic entry function if the unit produced one.
    /// `_start` takes no arguments and returns a double.
    pub fn run_start(&self) -> Result<Option<f64>, BackendError> {
        let addr = match self.function_addr("_start") {
            Some(addr) => addr,
            None => return Ok(None),
        };
        // Safety: the signature is fixed by the driver when it synthesizes
        // `_start`, and the module was verified before compilation.
        let start: extern "C" fn() -> f64 = unsafe { std::mem::transmute(addr) };
        Ok(Some(start()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        BinaryOp, FuncBuilder, Function, IntPredicate, IrType, Linkage, Module, Terminator,
    };

    #[test]
    fn compile_constant_function() {
        let mut func = FuncBuilder::new(Function::new(
            "answer",
            vec![],
            IrType::F64,
            false,
            Linkage::External,
        ));
        let v = func.const_f64(42.0);
        func.terminate(Terminator::Ret(Some(v)));

        let mut module = Module::new("t");
        module.add_function(func.finish());

        let mut jit = JitRuntime::new().unwrap();
        jit.compile(&module).unwrap();

        let addr = jit.function_addr("answer").unwrap();
        let answer: extern "C" fn() -> f64 = unsafe { std::mem::transmute(addr) };
        assert_eq!(answer(), 42.0);
    }

    /// A hand-built phi diamond: phis translate to block parameters fed by
    /// branch arguments.
    #[test]
    fn compile_phi_merge() {
        let mut b = FuncBuilder::new(Function::new(
            "abs",
            vec![("x".to_string(), IrType::I32)],
            IrType::I32,
            false,
            Linkage::External,
        ));
        let x = b.param_value(0);
        let zero = b.const_int(IrType::I32, 0);
        let negative = b.icmp(IntPredicate::Slt, x, zero);

        let neg_block = b.create_block("neg");
        let join = b.create_block("join");
        b.terminate(Terminator::CondBr {
            cond: negative,
            then_block: neg_block,
            else_block: join,
        });

        b.switch_to(neg_block);
        let negated = b.binary(BinaryOp::Sub, IrType::I32, zero, x);
        b.terminate(Terminator::Br(join));

        b.switch_to(join);
        let entry = b.func().entry_block();
        let merged = b.phi(IrType::I32, vec![(entry, x), (neg_block, negated)]);
        b.terminate(Terminator::Ret(Some(merged)));

        let mut module = Module::new("t");
        module.add_function(b.finish());

        let mut jit = JitRuntime::new().unwrap();
        jit.compile(&module).unwrap();

        let addr = jit.function_addr("abs").unwrap();
        let abs: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(addr) };
        assert_eq!(abs(-5), 5);
        assert_eq!(abs(7), 7);
        assert_eq!(abs(0), 0);
    }
}
