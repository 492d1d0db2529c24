//! Instruction representation.

use super::{BlockId, InstId, Type, Value};
use std::fmt;

/// Integer binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        }
    }

    /// Evaluate on 64-bit two's complement values. Shift amounts of 64 or
    /// more yield zero (or the sign fill for `AShr`).
    pub fn apply(self, lhs: u64, rhs: u64) -> u64 {
        match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::Shl => lhs.checked_shl(rhs.min(64) as u32).unwrap_or(0),
            BinOp::LShr => lhs.checked_shr(rhs.min(64) as u32).unwrap_or(0),
            BinOp::AShr => {
                let shift = rhs.min(63) as u32;
                ((lhs as i64) >> shift) as u64
            }
            BinOp::And => lhs & rhs,
            BinOp::Or => lhs | rhs,
            BinOp::Xor => lhs ^ rhs,
        }
    }
}

/// Conversion operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    PtrToInt,
    IntToPtr,
    SExt,
    ZExt,
    Trunc,
    BitCast,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::SExt => "sext",
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
            CastOp::BitCast => "bitcast",
        }
    }
}

/// Integer comparison predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ICmpPred {
    Eq,
    Ne,
    Ult,
    Slt,
}

impl ICmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ICmpPred::Eq => "eq",
            ICmpPred::Ne => "ne",
            ICmpPred::Ult => "ult",
            ICmpPred::Slt => "slt",
        }
    }
}

/// Instruction opcode and operands.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Address computation: `base + sum(index_i * stride_i)`.
    /// The first index steps over `source_ty`, later ones step into it.
    Gep {
        source_ty: Type,
        base: Value,
        indices: Vec<Value>,
        inbounds: bool,
    },

    /// SSA merge: one incoming value per predecessor edge
    Phi { incoming: Vec<(Value, BlockId)> },

    Binary { op: BinOp, lhs: Value, rhs: Value },

    Cast { op: CastOp, value: Value },

    ICmp { pred: ICmpPred, lhs: Value, rhs: Value },

    Alloca { allocated: Type },

    Load { ptr: Value },

    Store { value: Value, ptr: Value },

    Call { callee: Value, args: Vec<Value> },

    /// Unconditional branch
    Br { dest: BlockId },

    CondBr {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
    },

    Ret { value: Option<Value> },

    /// Call that continues at `normal` or unwinds to `unwind`
    Invoke {
        callee: Value,
        args: Vec<Value>,
        normal: BlockId,
        unwind: BlockId,
    },

    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Ret { .. }
                | InstKind::Invoke { .. }
                | InstKind::Unreachable
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    pub fn is_gep(&self) -> bool {
        matches!(self, InstKind::Gep { .. })
    }

    /// Operands in order.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            InstKind::Gep { base, indices, .. } => {
                std::iter::once(base).chain(indices.iter()).collect()
            }
            InstKind::Phi { incoming } => incoming.iter().map(|(v, _)| v).collect(),
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstKind::Cast { value, .. } => vec![value],
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Call { callee, args } | InstKind::Invoke { callee, args, .. } => {
                std::iter::once(callee).chain(args.iter()).collect()
            }
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Ret { value } => value.iter().collect(),
        }
    }

    /// Operands in order, mutably.
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            InstKind::Gep { base, indices, .. } => {
                std::iter::once(base).chain(indices.iter_mut()).collect()
            }
            InstKind::Phi { incoming } => incoming.iter_mut().map(|(v, _)| v).collect(),
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstKind::Cast { value, .. } => vec![value],
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Call { callee, args } | InstKind::Invoke { callee, args, .. } => {
                std::iter::once(callee).chain(args.iter_mut()).collect()
            }
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Ret { value } => value.iter_mut().collect(),
        }
    }

    /// Successor blocks named by a terminator.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { dest } => vec![*dest],
            InstKind::CondBr { then_dest, else_dest, .. } => vec![*then_dest, *else_dest],
            InstKind::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
            _ => Vec::new(),
        }
    }
}

/// Per-instruction annotations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstMetadata {
    /// Set by whatever emitted this instruction when it addresses a
    /// virtual-dispatch table.
    pub vtable_access: bool,
    /// Set on a GEP once its consumers were moved to a tagged pointer.
    pub canonptr_rewritten: bool,
}

/// An instruction stored in a function's arena.
#[derive(Debug, Clone)]
pub struct InstData {
    pub kind: InstKind,
    /// Result type (`Void` for instructions without a result)
    pub ty: Type,
    pub name: Option<String>,
    /// Containing block, `None` once detached
    pub block: Option<BlockId>,
    /// One entry per use of this instruction's result
    pub(crate) users: Vec<InstId>,
    pub meta: InstMetadata,
}

impl InstData {
    pub fn new(kind: InstKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            name: None,
            block: None,
            users: Vec::new(),
            meta: InstMetadata::default(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    pub fn is_phi(&self) -> bool {
        self.kind.is_phi()
    }

    pub fn users(&self) -> &[InstId] {
        &self.users
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
