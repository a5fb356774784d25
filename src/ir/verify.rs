//! IR verification.
//!
//! Runs after each function is emitted and before the module reaches the
//! native backend. Checks structure (every block terminated, jump targets
//! exist), the SSA property (single definition, no use of undefined
//! values), and type consistency of instructions against the recorded
//! value types.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::{BlockId, Function, Inst, IrType, Module, Terminator, ValueId};

#[derive(Debug)]
pub enum VerifyError {
    MissingTerminator(BlockId),
    MultipleDefinitions(ValueId),
    UndefinedValue(ValueId, BlockId),
    InvalidBlockTarget(BlockId, BlockId),
    TypeMismatch {
        context: String,
        expected: IrType,
        got: IrType,
    },
    NonPointerMemoryAccess(ValueId, BlockId),
    UnknownCallee(String),
    ArgumentCount {
        callee: String,
        expected: usize,
        got: usize,
    },
    BadPhiIncoming {
        block: BlockId,
        incoming: BlockId,
    },
    ReturnTypeMismatch {
        expected: IrType,
        got: Option<IrType>,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::MissingTerminator(block) => {
                write!(f, "block {} has no terminator", block)
            }
            VerifyError::MultipleDefinitions(value) => {
                write!(f, "value {} defined more than once", value)
            }
            VerifyError::UndefinedValue(value, block) => {
                write!(f, "value {} used in {} but never defined", value, block)
            }
            VerifyError::InvalidBlockTarget(from, to) => {
                write!(f, "branch from {} to non-existent block {}", from, to)
            }
            VerifyError::TypeMismatch {
                context,
                expected,
                got,
            } => write!(f, "{}: expected {}, got {}", context, expected, got),
            VerifyError::NonPointerMemoryAccess(value, block) => {
                write!(f, "memory access through non-pointer {} in {}", value, block)
            }
            VerifyError::UnknownCallee(name) => write!(f, "call to unknown function '{}'", name),
            VerifyError::ArgumentCount {
                callee,
                expected,
                got,
            } => write!(
                f,
                "call to '{}' with {} arguments, expected {}",
                callee, got, expected
            ),
            VerifyError::BadPhiIncoming { block, incoming } => write!(
                f,
                "phi in {} names {} which is not a predecessor",
                block, incoming
            ),
            VerifyError::ReturnTypeMismatch { expected, got } => match got {
                Some(got) => write!(f, "return of {} from a function returning {}", got, expected),
                None => write!(f, "bare return from a function returning {}", expected),
            },
        }
    }
}

struct Verifier<'a> {
    module: &'a Module,
    func: &'a Function,
    defined: HashSet<ValueId>,
    errors: Vec<VerifyError>,
}

impl<'a> Verifier<'a> {
    fn new(module: &'a Module, func: &'a Function) -> Self {
        Self {
            module,
            func,
            defined: HashSet::new(),
            errors: Vec::new(),
        }
    }

    fn verify(mut self) -> Vec<VerifyError> {
        self.check_structure();
        self.check_ssa();
        self.check_types();
        self.errors
    }

    fn check_structure(&mut self) {
        let block_count = self.func.blocks.len() as u32;
        for block in &self.func.blocks {
            match &block.terminator {
                None => self.errors.push(VerifyError::MissingTerminator(block.id)),
                Some(term) => {
                    for succ in term.successors() {
                        if succ.0 >= block_count {
                            self.errors
                                .push(VerifyError::InvalidBlockTarget(block.id, succ));
                        }
                    }
                }
            }
        }
    }

    fn check_ssa(&mut self) {
        for i in 0..self.func.params.len() {
            self.defined.insert(self.func.param_value(i));
        }

        let mut definitions: HashMap<ValueId, BlockId> = HashMap::new();
        for block in &self.func.blocks {
            for inst in &block.insts {
                if let Some(dst) = inst.dst() {
                    if definitions.insert(dst, block.id).is_some() || !self.defined.insert(dst) {
                        self.errors.push(VerifyError::MultipleDefinitions(dst));
                    }
                }
            }
        }

        for block in &self.func.blocks {
            for inst in &block.insts {
                for used in inst.uses() {
                    if !self.defined.contains(&used) {
                        self.errors.push(VerifyError::UndefinedValue(used, block.id));
                    }
                }
            }
            if let Some(term) = &block.terminator {
                for used in term.uses() {
                    if !self.defined.contains(&used) {
                        self.errors.push(VerifyError::UndefinedValue(used, block.id));
                    }
                }
            }
        }
    }

    fn ty_of(&self, value: ValueId) -> Option<IrType> {
        self.func.value_type(value).cloned()
    }

    fn expect_type(&mut self, context: &str, value: ValueId, expected: &IrType) {
        if let Some(got) = self.ty_of(value) {
            if &got != expected {
                self.errors.push(VerifyError::TypeMismatch {
                    context: context.to_string(),
                    expected: expected.clone(),
                    got,
                });
            }
        }
    }

    fn check_types(&mut self) {
        // Predecessors for phi checking; work on a local copy since the
        // verifier takes the function by shared reference.
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for block in &self.func.blocks {
            if let Some(term) = &block.terminator {
                for succ in term.successors() {
                    preds.entry(succ).or_default().push(block.id);
                }
            }
        }

        for block in &self.func.blocks {
            for inst in &block.insts {
                match inst {
                    Inst::Load { dst, ty, ptr } => {
                        match self.ty_of(*ptr) {
                            Some(IrType::Ptr(pointee)) => {
                                if pointee.as_ref() != ty {
                                    self.errors.push(VerifyError::TypeMismatch {
                                        context: format!("load {}", dst),
                                        expected: ty.clone(),
                                        got: pointee.as_ref().clone(),
                                    });
                                }
                            }
                            Some(_) => self
                                .errors
                                .push(VerifyError::NonPointerMemoryAccess(*ptr, block.id)),
                            None => {}
                        }
                    }
                    Inst::Store { value, ptr } => match self.ty_of(*ptr) {
                        Some(IrType::Ptr(pointee)) => {
                            self.expect_type("store operand", *value, pointee.as_ref());
                        }
                        Some(_) => self
                            .errors
                            .push(VerifyError::NonPointerMemoryAccess(*ptr, block.id)),
                        None => {}
                    },
                    Inst::Binary { dst, op, lhs, rhs } => {
                        if let Some(ty) = self.ty_of(*dst) {
                            self.expect_type("binary lhs", *lhs, &ty);
                            self.expect_type("binary rhs", *rhs, &ty);
                            if op.is_float_op() != ty.is_float() {
                                self.errors.push(VerifyError::TypeMismatch {
                                    context: format!("{} result", op.name()),
                                    expected: IrType::F64,
                                    got: ty,
                                });
                            }
                        }
                    }
                    Inst::ICmp { lhs, rhs, .. } => {
                        if let Some(ty) = self.ty_of(*lhs) {
                            self.expect_type("icmp rhs", *rhs, &ty);
                            if !ty.is_int() {
                                self.errors.push(VerifyError::TypeMismatch {
                                    context: "icmp operand".to_string(),
                                    expected: IrType::I32,
                                    got: ty,
                                });
                            }
                        }
                    }
                    Inst::FCmp { lhs, rhs, .. } => {
                        self.expect_type("fcmp lhs", *lhs, &IrType::F64);
                        self.expect_type("fcmp rhs", *rhs, &IrType::F64);
                    }
                    Inst::Phi {
                        dst,
                        ty,
                        incomings,
                    } => {
                        let block_preds = preds.get(&block.id).cloned().unwrap_or_default();
                        for (incoming, value) in incomings {
                            if !block_preds.contains(incoming) {
                                self.errors.push(VerifyError::BadPhiIncoming {
                                    block: block.id,
                                    incoming: *incoming,
                                });
                            }
                            self.expect_type(&format!("phi {}", dst), *value, ty);
                        }
                    }
                    Inst::Call { dst, callee, args } => {
                        match self.module.function(callee) {
                            None => self.errors.push(VerifyError::UnknownCallee(callee.clone())),
                            Some(target) => {
                                let fixed = target.params.len();
                                let ok = if target.is_var_args {
                                    args.len() >= fixed
                                } else {
                                    args.len() == fixed
                                };
                                if !ok {
                                    self.errors.push(VerifyError::ArgumentCount {
                                        callee: callee.clone(),
                                        expected: fixed,
                                        got: args.len(),
                                    });
                                } else {
                                    for (arg, (_, want)) in args.iter().zip(&target.params) {
                                        let want = want.clone();
                                        self.expect_type("call argument", *arg, &want);
                                    }
                                }
                                if let Some(dst) = dst {
                                    let want = target.return_type.clone();
                                    self.expect_type("call result", *dst, &want);
                                }
                            }
                        }
                    }
                    Inst::Const { .. }
                    | Inst::Alloca { .. }
                    | Inst::Cast { .. }
                    | Inst::GlobalAddr { .. }
                    | Inst::Gep { .. } => {}
                }
            }

            match &block.terminator {
                Some(Terminator::CondBr { cond, .. }) => {
                    self.expect_type("branch condition", *cond, &IrType::I1);
                }
                Some(Terminator::Ret(value)) => {
                    let expected = self.func.return_type.clone();
                    match value {
                        Some(value) => {
                            if expected == IrType::Void {
                                self.errors.push(VerifyError::ReturnTypeMismatch {
                                    expected,
                                    got: self.ty_of(*value),
                                });
                            } else {
                                self.expect_type("return value", *value, &expected);
                            }
                        }
                        None => {
                            if expected != IrType::Void {
                                self.errors.push(VerifyError::ReturnTypeMismatch {
                                    expected,
                                    got: None,
                                });
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Verify one defined function against its module. Declarations pass
/// trivially.
pub fn verify_function(module: &Module, func: &Function) -> Result<(), Vec<VerifyError>> {
    if func.is_declaration() {
        return Ok(());
    }
    let errors = Verifier::new(module, func).verify();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn verify_module(module: &Module) -> Result<(), Vec<VerifyError>> {
    let mut all = Vec::new();
    for func in &module.functions {
        if let Err(errors) = verify_function(module, func) {
            all.extend(errors);
        }
    }
    if all.is_empty() {
        Ok(())
    } else {
        Err(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, ConstValue, FuncBuilder, Linkage};

    fn module() -> Module {
        Module::new("t")
    }

    #[test]
    fn valid_function_passes() {
        let m = module();
        let mut b = FuncBuilder::new(Function::new(
            "f",
            vec![],
            IrType::I32,
            false,
            Linkage::External,
        ));
        let one = b.const_int(IrType::I32, 1);
        let two = b.const_int(IrType::I32, 2);
        let sum = b.binary(BinaryOp::Add, IrType::I32, one, two);
        b.terminate(Terminator::Ret(Some(sum)));
        assert!(verify_function(&m, &b.finish()).is_ok());
    }

    #[test]
    fn missing_terminator_is_reported() {
        let m = module();
        let mut func = Function::new("f", vec![], IrType::Void, false, Linkage::External);
        func.alloc_block("entry");
        let errors = verify_function(&m, &func).unwrap_err();
        assert!(matches!(errors[0], VerifyError::MissingTerminator(_)));
    }

    #[test]
    fn undefined_value_is_reported() {
        let m = module();
        let mut func = Function::new("f", vec![], IrType::Void, false, Linkage::External);
        let entry = func.alloc_block("entry");
        func.block_mut(entry).terminator = Some(Terminator::CondBr {
            cond: ValueId(99),
            then_block: entry,
            else_block: entry,
        });
        let errors = verify_function(&m, &func).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::UndefinedValue(ValueId(99), _))));
    }

    #[test]
    fn non_boolean_condition_is_reported() {
        let m = module();
        let mut b = FuncBuilder::new(Function::new(
            "f",
            vec![],
            IrType::Void,
            false,
            Linkage::External,
        ));
        let exit = b.create_block("exit");
        let n = b.const_int(IrType::I32, 1);
        b.terminate(Terminator::CondBr {
            cond: n,
            then_block: exit,
            else_block: exit,
        });
        b.switch_to(exit);
        b.terminate(Terminator::Ret(None));
        let errors = verify_function(&m, &b.finish()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::TypeMismatch { .. })));
    }

    #[test]
    fn phi_incoming_must_be_predecessor() {
        let m = module();
        let mut b = FuncBuilder::new(Function::new(
            "f",
            vec![],
            IrType::Void,
            false,
            Linkage::External,
        ));
        let next = b.create_block("next");
        let stray = b.create_block("stray");
        let one = b.const_int(IrType::I32, 1);
        b.terminate(Terminator::Br(next));
        b.switch_to(next);
        b.phi(IrType::I32, vec![(stray, one)]);
        b.terminate(Terminator::Ret(None));
        b.switch_to(stray);
        b.terminate(Terminator::Unreachable);
        let errors = verify_function(&m, &b.finish()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::BadPhiIncoming { .. })));
    }

    #[test]
    fn call_is_checked_against_module() {
        let mut m = module();
        m.add_function(Function::new(
            "callee",
            vec![("x".to_string(), IrType::F64)],
            IrType::F64,
            false,
            Linkage::External,
        ));

        let mut b = FuncBuilder::new(Function::new(
            "f",
            vec![],
            IrType::Void,
            false,
            Linkage::External,
        ));
        b.call("callee", IrType::F64, vec![]);
        b.terminate(Terminator::Ret(None));
        let errors = verify_function(&m, &b.finish()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::ArgumentCount { .. })));
    }

    #[test]
    fn declarations_pass() {
        let m = module();
        let func = Function::new("ext", vec![], IrType::Void, false, Linkage::External);
        assert!(verify_function(&m, &func).is_ok());
    }
}
