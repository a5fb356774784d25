//! SSA intermediate representation.
//!
//! A module holds globals and functions; a function holds basic blocks of
//! instructions, each block ending in exactly one terminator. Values are
//! numbered per function and typed. The instruction set is deliberately
//! small: stack slots (`alloca`) plus loads and stores carry mutable
//! variables, everything else is a pure SSA value.
//!
//! The emitter builds IR through [`FuncBuilder`]; [`verify`] checks the
//! result before it reaches the native backend.

pub mod builder;
pub mod lowering;
pub mod verify;

pub use builder::FuncBuilder;

use std::collections::HashMap;
use std::fmt;

/// Backend-level value types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    I1,
    I8,
    I32,
    F64,
    Ptr(Box<IrType>),
    Void,
}

impl IrType {
    pub fn is_int(&self) -> bool {
        matches!(self, IrType::I1 | IrType::I8 | IrType::I32)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F64)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    pub fn int_width(&self) -> Option<u32> {
        match self {
            IrType::I1 => Some(1),
            IrType::I8 => Some(8),
            IrType::I32 => Some(32),
            _ => None,
        }
    }

    /// Size in bytes when stored in memory.
    pub fn byte_size(&self) -> u32 {
        match self {
            IrType::I1 | IrType::I8 => 1,
            IrType::I32 => 4,
            IrType::F64 | IrType::Ptr(_) => 8,
            IrType::Void => 0,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::I1 => f.write_str("i1"),
            IrType::I8 => f.write_str("i8"),
            IrType::I32 => f.write_str("i32"),
            IrType::F64 => f.write_str("f64"),
            IrType::Ptr(inner) => write!(f, "ptr.{}", inner),
            IrType::Void => f.write_str("void"),
        }
    }
}

/// Unique identifier of an SSA value within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Unique identifier of a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int { ty: IrType, value: i64 },
    Float(f64),
    Bool(bool),
}

impl ConstValue {
    pub fn ty(&self) -> IrType {
        match self {
            ConstValue::Int { ty, .. } => ty.clone(),
            ConstValue::Float(_) => IrType::F64,
            ConstValue::Bool(_) => IrType::I1,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int { ty, value } => write!(f, "{} {}", ty, value),
            ConstValue::Float(value) => write!(f, "f64 {}", value),
            ConstValue::Bool(value) => write!(f, "i1 {}", value),
        }
    }
}

/// Two-operand arithmetic and bitwise operations. Operands and result share
/// one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    FAdd,
    FSub,
    FMul,
    FDiv,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::UDiv => "udiv",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }

    pub fn is_float_op(&self) -> bool {
        matches!(
            self,
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IntPredicate {
    pub fn name(&self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
        }
    }
}

/// Ordered float comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl FloatPredicate {
    pub fn name(&self) -> &'static str {
        match self {
            FloatPredicate::Oeq => "oeq",
            FloatPredicate::One => "one",
            FloatPredicate::Olt => "olt",
            FloatPredicate::Ole => "ole",
            FloatPredicate::Ogt => "ogt",
            FloatPredicate::Oge => "oge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Sext,
    Zext,
    Trunc,
    FpToSi,
    SiToFp,
}

impl CastOp {
    pub fn name(&self) -> &'static str {
        match self {
            CastOp::Sext => "sext",
            CastOp::Zext => "zext",
            CastOp::Trunc => "trunc",
            CastOp::FpToSi => "fptosi",
            CastOp::SiToFp => "sitofp",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Const {
        dst: ValueId,
        value: ConstValue,
    },
    /// Stack slot in the function entry block; the result is a pointer.
    Alloca {
        dst: ValueId,
        ty: IrType,
        name: String,
    },
    Load {
        dst: ValueId,
        ty: IrType,
        ptr: ValueId,
    },
    Store {
        value: ValueId,
        ptr: ValueId,
    },
    Binary {
        dst: ValueId,
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    ICmp {
        dst: ValueId,
        pred: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    FCmp {
        dst: ValueId,
        pred: FloatPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cast {
        dst: ValueId,
        op: CastOp,
        value: ValueId,
        to: IrType,
    },
    Call {
        /// Absent for void callees.
        dst: Option<ValueId>,
        callee: String,
        args: Vec<ValueId>,
    },
    Phi {
        dst: ValueId,
        ty: IrType,
        incomings: Vec<(BlockId, ValueId)>,
    },
    /// Address of a module global or interned string.
    GlobalAddr {
        dst: ValueId,
        name: String,
    },
    /// Element pointer: `base + index * sizeof(elem)`.
    Gep {
        dst: ValueId,
        elem: IrType,
        base: ValueId,
        index: ValueId,
    },
}

impl Inst {
    pub fn dst(&self) -> Option<ValueId> {
        match self {
            Inst::Const { dst, .. }
            | Inst::Alloca { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::Binary { dst, .. }
            | Inst::ICmp { dst, .. }
            | Inst::FCmp { dst, .. }
            | Inst::Cast { dst, .. }
            | Inst::Phi { dst, .. }
            | Inst::GlobalAddr { dst, .. }
            | Inst::Gep { dst, .. } => Some(*dst),
            Inst::Call { dst, .. } => *dst,
            Inst::Store { .. } => None,
        }
    }

    pub fn uses(&self) -> Vec<ValueId> {
        match self {
            Inst::Const { .. } | Inst::Alloca { .. } | Inst::GlobalAddr { .. } => vec![],
            Inst::Load { ptr, .. } => vec![*ptr],
            Inst::Store { value, ptr } => vec![*value, *ptr],
            Inst::Binary { lhs, rhs, .. }
            | Inst::ICmp { lhs, rhs, .. }
            | Inst::FCmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Cast { value, .. } => vec![*value],
            Inst::Call { args, .. } => args.clone(),
            Inst::Phi { incomings, .. } => incomings.iter().map(|(_, v)| *v).collect(),
            Inst::Gep { base, index, .. } => vec![*base, *index],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Option<ValueId>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Ret(_) | Terminator::Unreachable => vec![],
        }
    }

    pub fn uses(&self) -> Vec<ValueId> {
        match self {
            Terminator::CondBr { cond, .. } => vec![*cond],
            Terminator::Ret(Some(value)) => vec![*value],
            _ => vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
    /// Filled by [`Function::compute_predecessors`].
    pub predecessors: Vec<BlockId>,
}

impl BasicBlock {
    fn new(id: BlockId, label: String) -> Self {
        Self {
            id,
            label,
            insts: Vec::new(),
            terminator: None,
            predecessors: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Internal,
    External,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub return_type: IrType,
    pub is_var_args: bool,
    pub linkage: Linkage,
    /// Empty for declarations; the first block is the entry otherwise.
    pub blocks: Vec<BasicBlock>,
    pub value_types: HashMap<ValueId, IrType>,
    next_value: u32,
    next_block: u32,
}

impl Function {
    /// A function whose parameters occupy `ValueId(0)..ValueId(n)`.
    pub fn new(
        name: impl Into<String>,
        params: Vec<(String, IrType)>,
        return_type: IrType,
        is_var_args: bool,
        linkage: Linkage,
    ) -> Self {
        let mut value_types = HashMap::new();
        for (i, (_, ty)) in params.iter().enumerate() {
            value_types.insert(ValueId(i as u32), ty.clone());
        }
        let next_value = params.len() as u32;
        Self {
            name: name.into(),
            params,
            return_type,
            is_var_args,
            linkage,
            blocks: Vec::new(),
            value_types,
            next_value,
        next_block: 0,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn param_value(&self, index: usize) -> ValueId {
        debug_assert!(index < self.params.len());
        ValueId(index as u32)
    }

    pub fn alloc_value(&mut self, ty: IrType) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        self.value_types.insert(id, ty);
        id
    }

    pub fn alloc_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.push(BasicBlock::new(id, label.into()));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn value_type(&self, id: ValueId) -> Option<&IrType> {
        self.value_types.get(&id)
    }

    pub fn compute_predecessors(&mut self) {
        for block in &mut self.blocks {
            block.predecessors.clear();
        }
        let mut edges = Vec::new();
        for block in &self.blocks {
            if let Some(term) = &block.terminator {
                for succ in term.successors() {
                    edges.push((block.id, succ));
                }
            }
        }
        for (pred, succ) in edges {
            if (succ.0 as usize) < self.blocks.len() {
                self.blocks[succ.0 as usize].predecessors.push(pred);
            }
        }
    }
}

/// Initializer of a module global.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalInit {
    Scalar(ConstValue),
    Bytes(Vec<u8>),
    /// Pointer to the named global; used for string-literal initializers,
    /// which point at their interned byte array.
    StrPtr(String),
    Zero,
}

#[derive(Debug, Clone)]
pub struct GlobalData {
    pub name: String,
    pub ty: IrType,
    pub init: GlobalInit,
    pub constant: bool,
    pub linkage: Linkage,
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalData>,
    next_string: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            next_string: 0,
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Add a function, replacing an existing declaration of the same name.
    pub fn add_function(&mut self, func: Function) {
        if let Some(existing) = self.functions.iter_mut().find(|f| f.name == func.name) {
            *existing = func;
        } else {
            self.functions.push(func);
        }
    }

    pub fn global(&self, name: &str) -> Option<&GlobalData> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn add_global(&mut self, global: GlobalData) {
        self.globals.push(global);
    }

    /// Intern a string literal as a private constant byte array and return
    /// the generated global name.
    pub fn intern_string(&mut self, bytes: &[u8]) -> String {
        let name = format!("str.{}", self.next_string);
        self.next_string += 1;
        self.globals.push(GlobalData {
            name: name.clone(),
            ty: IrType::Ptr(Box::new(IrType::I8)),
            init: GlobalInit::Bytes(bytes.to_vec()),
            constant: true,
            linkage: Linkage::Internal,
        });
        name
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Const { dst, value } => write!(f, "{} = const {}", dst, value),
            Inst::Alloca { dst, ty, name } => write!(f, "{} = alloca {} ; {}", dst, ty, name),
            Inst::Load { dst, ty, ptr } => write!(f, "{} = load {}, {}", dst, ty, ptr),
            Inst::Store { value, ptr } => write!(f, "store {}, {}", value, ptr),
            Inst::Binary { dst, op, lhs, rhs } => {
                write!(f, "{} = {} {}, {}", dst, op.name(), lhs, rhs)
            }
            Inst::ICmp {
                dst,
                pred,
                lhs,
                rhs,
            } => write!(f, "{} = icmp.{} {}, {}", dst, pred.name(), lhs, rhs),
            Inst::FCmp {
                dst,
                pred,
                lhs,
                rhs,
            } => write!(f, "{} = fcmp.{} {}, {}", dst, pred.name(), lhs, rhs),
            Inst::Cast {
                dst,
                op,
                value,
                to,
            } => write!(f, "{} = {} {} to {}", dst, op.name(), value, to),
            Inst::Call { dst, callee, args } => {
                if let Some(dst) = dst {
                    write!(f, "{} = ", dst)?;
                }
                write!(f, "call @{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Inst::Phi {
                dst,
                ty,
                incomings,
            } => {
                write!(f, "{} = phi {} ", dst, ty)?;
                for (i, (block, value)) in incomings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[{}: {}]", block, value)?;
                }
                Ok(())
            }
            Inst::GlobalAddr { dst, name } => write!(f, "{} = global.addr @{}", dst, name),
            Inst::Gep {
                dst,
                elem,
                base,
                index,
            } => write!(f, "{} = gep {}, {}, {}", dst, elem, base, index),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Br(target) => write!(f, "br {}", target),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(f, "condbr {}, {}, {}", cond, then_block, else_block),
            Terminator::Ret(Some(value)) => write!(f, "ret {}", value),
            Terminator::Ret(None) => f.write_str("ret void"),
            Terminator::Unreachable => f.write_str("unreachable"),
        }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ; {}", self.id, self.label)?;
        for inst in &self.insts {
            writeln!(f, "    {}", inst)?;
        }
        match &self.terminator {
            Some(term) => writeln!(f, "    {}", term),
            None => writeln!(f, "    <unterminated>"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect();
        let variadic = if self.is_var_args { ", ..." } else { "" };
        if self.is_declaration() {
            return writeln!(
                f,
                "declare @{}({}{}) -> {}",
                self.name,
                params.join(", "),
                variadic,
                self.return_type
            );
        }
        writeln!(
            f,
            "fn @{}({}{}) -> {} {{",
            self.name,
            params.join(", "),
            variadic,
            self.return_type
        )?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for global in &self.globals {
            let kind = if global.constant { "const" } else { "global" };
            match &global.init {
                GlobalInit::Scalar(value) => {
                    writeln!(f, "{} @{}: {} = {}", kind, global.name, global.ty, value)?
                }
                GlobalInit::Bytes(bytes) => writeln!(
                    f,
                    "{} @{}: {} = \"{}\"",
                    kind,
                    global.name,
                    global.ty,
                    String::from_utf8_lossy(bytes)
                )?,
                GlobalInit::StrPtr(target) => {
                    writeln!(f, "{} @{}: {} = &@{}", kind, global.name, global.ty, target)?
                }
                GlobalInit::Zero => {
                    writeln!(f, "{} @{}: {} = zero", kind, global.name, global.ty)?
                }
            }
        }
        for func in &self.functions {
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_display_contains_blocks() {
        let mut func = Function::new(
            "add",
            vec![
                ("a".to_string(), IrType::I32),
                ("b".to_string(), IrType::I32),
            ],
            IrType::I32,
            false,
            Linkage::External,
        );
        let entry = func.alloc_block("entry");
        let a = func.param_value(0);
        let b = func.param_value(1);
        let sum = func.alloc_value(IrType::I32);
        func.block_mut(entry).insts.push(Inst::Binary {
            dst: sum,
            op: BinaryOp::Add,
            lhs: a,
            rhs: b,
        });
        func.block_mut(entry).terminator = Some(Terminator::Ret(Some(sum)));

        let printed = func.to_string();
        assert!(printed.contains("fn @add"));
        assert!(printed.contains("add v0, v1"));
        assert!(printed.contains("ret v2"));
    }

    #[test]
    fn predecessors_follow_terminators() {
        let mut func = Function::new("f", vec![], IrType::Void, false, Linkage::External);
        let entry = func.alloc_block("entry");
        let then_block = func.alloc_block("then");
        let else_block = func.alloc_block("else");
        let cond = func.alloc_value(IrType::I1);
        func.block_mut(entry).insts.push(Inst::Const {
            dst: cond,
            value: ConstValue::Bool(true),
        });
        func.block_mut(entry).terminator = Some(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
        func.block_mut(then_block).terminator = Some(Terminator::Ret(None));
        func.block_mut(else_block).terminator = Some(Terminator::Ret(None));

        func.compute_predecessors();
        assert_eq!(func.block(then_block).predecessors, vec![entry]);
        assert_eq!(func.block(else_block).predecessors, vec![entry]);
        assert!(func.block(entry).predecessors.is_empty());
    }

    #[test]
    fn interned_strings_get_fresh_names() {
        let mut module = Module::new("m");
        let a = module.intern_string(b"hi");
        let b = module.intern_string(b"there");
        assert_eq!(a, "str.0");
        assert_eq!(b, "str.1");
        assert!(module.global("str.0").is_some());
    }

    #[test]
    fn add_function_replaces_declaration() {
        let mut module = Module::new("m");
        module.add_function(Function::new(
            "f",
            vec![],
            IrType::Void,
            false,
            Linkage::External,
        ));
        assert!(module.function("f").map(Function::is_declaration) == Some(true));

        let mut defined = Function::new("f", vec![], IrType::Void, false, Linkage::External);
        let entry = defined.alloc_block("entry");
        defined.block_mut(entry).terminator = Some(Terminator::Ret(None));
        module.add_function(defined);

        assert_eq!(module.functions.len(), 1);
        assert!(module.function("f").map(Function::is_declaration) == Some(false));
    }
}
