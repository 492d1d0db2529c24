//! SSA intermediate representation.
//!
//! A small LLVM-shaped IR that the pointer rewriting pass operates on.
//!
//! # Structure
//!
//! ```text
//! Module (+ DataLayout)
//! └── Functions
//!     ├── instruction arena (InstId -> InstData, with use lists)
//!     └── block arena + layout order (BlockId -> BasicBlock)
//!         └── InstIds
//! ```

pub mod block;
pub mod builder;
pub mod eval;
pub mod function;
pub mod instruction;
pub mod layout;
pub mod module;
pub mod types;

pub use block::BasicBlock;
pub use builder::{Builder, InsertPoint};
pub use function::{Attribute, Function, Linkage, Param};
pub use instruction::{BinOp, CastOp, ICmpPred, InstData, InstKind, InstMetadata};
pub use layout::{DataLayout, DefaultLayout};
pub use module::{GlobalVariable, Module};
pub use types::Type;

use std::fmt;

/// Index of an instruction in its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl InstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Index of a basic block in its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Compile-time constant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Integer constant, stored sign-extended to 64 bits
    Int { value: i64, bits: u32 },

    /// Null pointer
    Null,

    /// Undefined value
    Undef(Type),
}

impl Constant {
    /// Build an integer constant, truncating `value` to `bits` and
    /// sign-extending it back into the stored `i64`.
    pub fn int(value: i64, bits: u32) -> Self {
        Constant::Int { value: sign_extend(value, bits), bits }
    }

    pub fn ty(&self) -> Type {
        match self {
            Constant::Int { bits, .. } => Type::Int(*bits),
            Constant::Null => Type::Ptr,
            Constant::Undef(ty) => ty.clone(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Sign-extend the low `bits` of `value` to 64 bits.
pub fn sign_extend(value: i64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value;
    }
    let shift = 64 - bits;
    (value << shift) >> shift
}

/// An operand: anything an instruction can consume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Result of an instruction in the same function
    Inst(InstId),

    /// Function argument by position
    Arg(usize),

    /// Constant
    Const(Constant),

    /// Module-level global, by symbol name
    Global(String),
}

impl Value {
    pub fn const_int(value: i64, bits: u32) -> Self {
        Value::Const(Constant::int(value, bits))
    }

    pub fn const_i32(value: i32) -> Self {
        Value::const_int(i64::from(value), 32)
    }

    pub fn const_i64(value: i64) -> Self {
        Value::const_int(value, 64)
    }

    pub fn null() -> Self {
        Value::Const(Constant::Null)
    }

    pub fn global(name: impl Into<String>) -> Self {
        Value::Global(name.into())
    }

    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Value::Const(c) => c.as_int(),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Value::Const(Constant::Int { value: 0, .. }) | Value::Const(Constant::Null))
    }
}

impl From<InstId> for Value {
    fn from(id: InstId) -> Self {
        Value::Inst(id)
    }
}
