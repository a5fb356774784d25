use std::fmt;

use crate::ast::{BinOp, UnaryOp};
use crate::ir::IrType;

/// Base semantic types of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Boolean,
    /// Unsigned 8-bit.
    Byte,
    /// Signed 8-bit.
    Char,
    /// Signed 32-bit.
    Integer,
    Double,
    /// Pointer to byte.
    Str,
    Void,
}

impl TypeKind {
    /// Surface spelling of the type keyword, or `None` for an identifier
    /// that is not a type name.
    pub fn from_name(name: &str) -> Option<TypeKind> {
        match name {
            "bool" => Some(TypeKind::Boolean),
            "byte" => Some(TypeKind::Byte),
            "char" => Some(TypeKind::Char),
            "int" => Some(TypeKind::Integer),
            "double" => Some(TypeKind::Double),
            "str" => Some(TypeKind::Str),
            "void" => Some(TypeKind::Void),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Boolean => "bool",
            TypeKind::Byte => "byte",
            TypeKind::Char => "char",
            TypeKind::Integer => "int",
            TypeKind::Double => "double",
            TypeKind::Str => "str",
            TypeKind::Void => "void",
        }
    }
}

/// A semantic type: a base kind plus at most one level of pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemType {
    pub kind: TypeKind,
    pub pointer: bool,
}

impl SemType {
    pub const BOOLEAN: SemType = SemType::new(TypeKind::Boolean);
    pub const BYTE: SemType = SemType::new(TypeKind::Byte);
    pub const CHAR: SemType = SemType::new(TypeKind::Char);
    pub const INTEGER: SemType = SemType::new(TypeKind::Integer);
    pub const DOUBLE: SemType = SemType::new(TypeKind::Double);
    pub const STR: SemType = SemType::new(TypeKind::Str);
    pub const VOID: SemType = SemType::new(TypeKind::Void);

    pub const fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            pointer: false,
        }
    }

    pub const fn pointer_to(kind: TypeKind) -> Self {
        Self {
            kind,
            pointer: true,
        }
    }

    /// True for values represented as a pointer: explicit pointers and `str`.
    pub fn is_pointer_like(&self) -> bool {
        self.pointer || self.kind == TypeKind::Str
    }

    pub fn is_numeric(&self) -> bool {
        !self.pointer
            && matches!(
                self.kind,
                TypeKind::Byte | TypeKind::Char | TypeKind::Integer | TypeKind::Double
            )
    }

    pub fn is_integer(&self) -> bool {
        !self.pointer
            && matches!(self.kind, TypeKind::Byte | TypeKind::Char | TypeKind::Integer)
    }

    pub fn is_float(&self) -> bool {
        !self.pointer && self.kind == TypeKind::Double
    }

    /// Signedness matters for division and ordered comparisons; `byte` is
    /// the only unsigned numeric type.
    pub fn is_signed(&self) -> bool {
        matches!(self.kind, TypeKind::Char | TypeKind::Integer | TypeKind::Double)
    }

    fn bit_width(&self) -> u32 {
        match self.kind {
            TypeKind::Boolean => 1,
            TypeKind::Byte | TypeKind::Char => 8,
            TypeKind::Integer => 32,
            TypeKind::Double => 64,
            TypeKind::Str | TypeKind::Void => 0,
        }
    }

    /// Which binary operations this type supports against `other`.
    pub fn supports_binary(&self, op: BinOp, other: &SemType) -> bool {
        if self.is_pointer_like() || other.is_pointer_like() {
            return false;
        }
        match self.kind {
            TypeKind::Boolean => {
                other.kind == TypeKind::Boolean
                    && matches!(
                        op,
                        BinOp::Eq | BinOp::Ne | BinOp::LogicalAnd | BinOp::LogicalOr
                    )
            }
            TypeKind::Byte => {
                other.is_numeric()
                    && matches!(
                        op,
                        BinOp::Add
                            | BinOp::Sub
                            | BinOp::Mul
                            | BinOp::Div
                            | BinOp::Eq
                            | BinOp::Ne
                            | BinOp::Lt
                            | BinOp::Le
                            | BinOp::Gt
                            | BinOp::Ge
                            | BinOp::BitAnd
                            | BinOp::BitOr
                            | BinOp::BitXor
                    )
            }
            TypeKind::Char | TypeKind::Integer | TypeKind::Double => {
                other.is_numeric()
                    && matches!(
                        op,
                        BinOp::Add
                            | BinOp::Sub
                            | BinOp::Mul
                            | BinOp::Div
                            | BinOp::Eq
                            | BinOp::Ne
                            | BinOp::Lt
                            | BinOp::Le
                            | BinOp::Gt
                            | BinOp::Ge
                    )
            }
            TypeKind::Str | TypeKind::Void => false,
        }
    }

    /// Which unary operations this type supports. `!` belongs to booleans,
    /// sign and stepping to the numeric types.
    pub fn supports_unary(&self, op: UnaryOp) -> bool {
        if self.is_pointer_like() {
            return false;
        }
        match self.kind {
            TypeKind::Boolean => op == UnaryOp::Not,
            TypeKind::Byte | TypeKind::Char | TypeKind::Integer | TypeKind::Double => matches!(
                op,
                UnaryOp::Plus | UnaryOp::Minus | UnaryOp::Increment | UnaryOp::Decrement
            ),
            TypeKind::Str | TypeKind::Void => false,
        }
    }

    /// Result type for mixed numeric operands: `double` wins, otherwise the
    /// wider integer. A signedness conflict at equal width widens to `int`.
    pub fn promote(&self, other: &SemType) -> Option<SemType> {
        if self == other {
            return Some(*self);
        }
        if !self.is_numeric() || !other.is_numeric() {
            return None;
        }
        if self.kind == TypeKind::Double || other.kind == TypeKind::Double {
            return Some(SemType::DOUBLE);
        }
        let (a, b) = (self.bit_width(), other.bit_width());
        if a == b {
            // byte vs char
            return Some(SemType::INTEGER);
        }
        Some(if a > b { *self } else { *other })
    }

    /// Lower to the backend IR type.
    pub fn lower(&self) -> IrType {
        let base = match self.kind {
            TypeKind::Boolean => IrType::I1,
            TypeKind::Byte | TypeKind::Char => IrType::I8,
            TypeKind::Integer => IrType::I32,
            TypeKind::Double => IrType::F64,
            TypeKind::Str => IrType::Ptr(Box::new(IrType::I8)),
            TypeKind::Void => IrType::Void,
        };
        if self.pointer {
            IrType::Ptr(Box::new(base))
        } else {
            base
        }
    }
}

impl fmt::Display for SemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        if self.pointer {
            f.write_str("*")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for kind in [
            TypeKind::Boolean,
            TypeKind::Byte,
            TypeKind::Char,
            TypeKind::Integer,
            TypeKind::Double,
            TypeKind::Str,
            TypeKind::Void,
        ] {
            assert_eq!(TypeKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(TypeKind::from_name("float"), None);
    }

    #[test]
    fn boolean_supports_logic_only() {
        let b = SemType::BOOLEAN;
        assert!(b.supports_binary(BinOp::Eq, &b));
        assert!(b.supports_binary(BinOp::LogicalAnd, &b));
        assert!(!b.supports_binary(BinOp::Add, &b));
        assert!(!b.supports_binary(BinOp::Eq, &SemType::INTEGER));
        assert!(b.supports_unary(UnaryOp::Not));
        assert!(!b.supports_unary(UnaryOp::Increment));
    }

    #[test]
    fn byte_adds_bitwise_ops() {
        let byte = SemType::BYTE;
        assert!(byte.supports_binary(BinOp::BitXor, &byte));
        assert!(byte.supports_binary(BinOp::Add, &SemType::INTEGER));
        assert!(!SemType::INTEGER.supports_binary(BinOp::BitXor, &SemType::INTEGER));
    }

    #[test]
    fn pointers_support_nothing() {
        let ptr = SemType::pointer_to(TypeKind::Integer);
        assert!(!ptr.supports_binary(BinOp::Add, &SemType::INTEGER));
        assert!(!SemType::STR.supports_binary(BinOp::Add, &SemType::STR));
        assert!(!ptr.supports_unary(UnaryOp::Minus));
    }

    #[test]
    fn promotion_prefers_double_then_width() {
        assert_eq!(
            SemType::INTEGER.promote(&SemType::DOUBLE),
            Some(SemType::DOUBLE)
        );
        assert_eq!(
            SemType::BYTE.promote(&SemType::INTEGER),
            Some(SemType::INTEGER)
        );
        assert_eq!(SemType::BYTE.promote(&SemType::CHAR), Some(SemType::INTEGER));
        assert_eq!(SemType::CHAR.promote(&SemType::CHAR), Some(SemType::CHAR));
        assert_eq!(SemType::BOOLEAN.promote(&SemType::INTEGER), None);
    }

    #[test]
    fn lowering_matches_widths() {
        assert_eq!(SemType::BOOLEAN.lower(), IrType::I1);
        assert_eq!(SemType::BYTE.lower(), IrType::I8);
        assert_eq!(SemType::INTEGER.lower(), IrType::I32);
        assert_eq!(SemType::DOUBLE.lower(), IrType::F64);
        assert_eq!(SemType::STR.lower(), IrType::Ptr(Box::new(IrType::I8)));
        assert_eq!(
            SemType::pointer_to(TypeKind::Integer).lower(),
            IrType::Ptr(Box::new(IrType::I32))
        );
    }
}
