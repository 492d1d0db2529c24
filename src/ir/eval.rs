//! Evaluation of pure integer and pointer expressions.
//!
//! Computes the run-time value of straight-line, side-effect-free code
//! (constants, arguments, casts, integer arithmetic, GEPs) for a concrete
//! binding of arguments and globals. Pointers are plain 64-bit integers here,
//! so tagged high bits survive evaluation unchanged.

use super::layout::{gep_steps, DataLayout, GepStep};
use super::{sign_extend, BinOp, CastOp, Constant, Function, ICmpPred, InstId, InstKind, Type, Value};
use crate::error::{CanonPtrError, CanonPtrResult};
use std::collections::HashMap;

/// Truncate `value` to its low `bits` bits.
pub fn mask(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

pub struct Evaluator<'a> {
    func: &'a Function,
    layout: &'a dyn DataLayout,
    args: Vec<u64>,
    globals: HashMap<String, u64>,
}

impl<'a> Evaluator<'a> {
    pub fn new(func: &'a Function, layout: &'a dyn DataLayout) -> Self {
        Self {
            func,
            layout,
            args: Vec::new(),
            globals: HashMap::new(),
        }
    }

    /// Bind argument values by position.
    pub fn with_args(mut self, args: &[u64]) -> Self {
        self.args = args.to_vec();
        self
    }

    /// Bind the address of a global symbol.
    pub fn bind_global(mut self, name: impl Into<String>, address: u64) -> Self {
        self.globals.insert(name.into(), address);
        self
    }

    fn width_of(&self, ty: &Type) -> u32 {
        match ty {
            Type::Ptr => self.layout.pointer_bits(),
            other => other.bit_width(),
        }
    }

    /// Evaluate `value`, returning it zero-extended to 64 bits.
    pub fn eval(&self, value: &Value) -> CanonPtrResult<u64> {
        match value {
            Value::Const(Constant::Int { value, bits }) => Ok(mask(*value as u64, *bits)),
            Value::Const(Constant::Null) => Ok(0),
            Value::Const(Constant::Undef(_)) => Err(CanonPtrError::NotEvaluable("undef".to_string())),
            Value::Arg(index) => {
                let raw = *self
                    .args
                    .get(*index)
                    .ok_or(CanonPtrError::UnknownArgument(*index))?;
                let ty = &self.func.param(*index)?.ty;
                Ok(mask(raw, self.width_of(ty)))
            }
            Value::Global(name) => self
                .globals
                .get(name)
                .copied()
                .ok_or_else(|| CanonPtrError::NotEvaluable(format!("@{}", name))),
            Value::Inst(id) => self.eval_inst(*id),
        }
    }

    /// Evaluate `value` as a signed integer of its own width.
    fn eval_signed(&self, value: &Value) -> CanonPtrResult<i64> {
        let bits = self.width_of(&self.func.value_type(value)?);
        Ok(sign_extend(self.eval(value)? as i64, bits))
    }

    fn eval_inst(&self, id: InstId) -> CanonPtrResult<u64> {
        let data = self.func.inst(id)?;
        let bits = self.width_of(&data.ty);

        let result = match &data.kind {
            InstKind::Gep { source_ty, base, indices, .. } => {
                let mut address = self.eval(base)?;
                for (step, index) in gep_steps(self.layout, source_ty, indices)?.iter().zip(indices) {
                    let delta = match step {
                        GepStep::Field(offset) => *offset,
                        GepStep::Scaled { stride } => (self.eval_signed(index)? as u64).wrapping_mul(*stride),
                    };
                    address = address.wrapping_add(delta);
                }
                address
            }
            InstKind::Binary { op, lhs, rhs } => {
                let lhs = if matches!(op, BinOp::AShr) {
                    self.eval_signed(lhs)? as u64
                } else {
                    self.eval(lhs)?
                };
                op.apply(lhs, self.eval(rhs)?)
            }
            InstKind::Cast { op, value } => match op {
                CastOp::SExt => self.eval_signed(value)? as u64,
                CastOp::PtrToInt
                | CastOp::IntToPtr
                | CastOp::ZExt
                | CastOp::Trunc
                | CastOp::BitCast => self.eval(value)?,
            },
            InstKind::ICmp { pred, lhs, rhs } => {
                let hit = match pred {
                    ICmpPred::Eq => self.eval(lhs)? == self.eval(rhs)?,
                    ICmpPred::Ne => self.eval(lhs)? != self.eval(rhs)?,
                    ICmpPred::Ult => self.eval(lhs)? < self.eval(rhs)?,
                    ICmpPred::Slt => self.eval_signed(lhs)? < self.eval_signed(rhs)?,
                };
                u64::from(hit)
            }
            _ => return Err(CanonPtrError::NotEvaluable(self.func.display_inst(id))),
        };

        Ok(mask(result, bits))
    }
}
