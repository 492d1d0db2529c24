//! Instruction builder.
//!
//! Inserts new instructions at a fixed program point. Operations whose
//! operands are all constants are folded instead of emitted, so a fully
//! constant computation never produces instructions.

use super::eval::mask;
use super::{BinOp, CastOp, Constant, Function, InstId, InstKind, Type, Value};
use crate::error::CanonPtrResult;

/// A program point: new instructions go immediately before `before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPoint {
    pub before: InstId,
}

impl InsertPoint {
    pub fn before(inst: InstId) -> Self {
        Self { before: inst }
    }
}

pub struct Builder<'f> {
    func: &'f mut Function,
    point: InsertPoint,
    /// Instructions emitted so far, in program order
    emitted: Vec<InstId>,
}

impl<'f> Builder<'f> {
    pub fn new(func: &'f mut Function, point: InsertPoint) -> Self {
        Self {
            func,
            point,
            emitted: Vec::new(),
        }
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn insert_point(&self) -> InsertPoint {
        self.point
    }

    /// Instructions this builder has inserted, in order.
    pub fn emitted(&self) -> &[InstId] {
        &self.emitted
    }

    fn insert(&mut self, name: &str, kind: InstKind, ty: Type) -> CanonPtrResult<Value> {
        let name = (!name.is_empty()).then(|| name.to_string());
        let id = self.func.insert_before(self.point.before, name, kind, ty)?;
        self.emitted.push(id);
        Ok(Value::Inst(id))
    }

    pub fn build_binary(&mut self, op: BinOp, lhs: Value, rhs: Value, name: &str) -> CanonPtrResult<Value> {
        let ty = self.func.value_type(&lhs)?;
        if let (Value::Const(Constant::Int { value: a, bits }), Some(b)) = (&lhs, rhs.as_const_int()) {
            return Ok(Value::Const(fold_binary(op, *a, b, *bits)));
        }
        self.insert(name, InstKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn build_add(&mut self, lhs: Value, rhs: Value, name: &str) -> CanonPtrResult<Value> {
        self.build_binary(BinOp::Add, lhs, rhs, name)
    }

    pub fn build_mul(&mut self, lhs: Value, rhs: Value, name: &str) -> CanonPtrResult<Value> {
        self.build_binary(BinOp::Mul, lhs, rhs, name)
    }

    pub fn build_and(&mut self, lhs: Value, rhs: Value, name: &str) -> CanonPtrResult<Value> {
        self.build_binary(BinOp::And, lhs, rhs, name)
    }

    pub fn build_shl(&mut self, lhs: Value, rhs: Value, name: &str) -> CanonPtrResult<Value> {
        self.build_binary(BinOp::Shl, lhs, rhs, name)
    }

    pub fn build_lshr(&mut self, lhs: Value, rhs: Value, name: &str) -> CanonPtrResult<Value> {
        self.build_binary(BinOp::LShr, lhs, rhs, name)
    }

    /// Two's complement negation: `0 - value`.
    pub fn build_neg(&mut self, value: Value, name: &str) -> CanonPtrResult<Value> {
        let bits = self.func.value_type(&value)?.bit_width();
        self.build_binary(BinOp::Sub, Value::const_int(0, bits), value, name)
    }

    pub fn build_ptr_to_int(&mut self, value: Value, ty: Type, name: &str) -> CanonPtrResult<Value> {
        if let Value::Const(Constant::Null) = value {
            return Ok(Value::const_int(0, ty.bit_width()));
        }
        self.insert(name, InstKind::Cast { op: CastOp::PtrToInt, value }, ty)
    }

    pub fn build_int_to_ptr(&mut self, value: Value, ty: Type, name: &str) -> CanonPtrResult<Value> {
        self.insert(name, InstKind::Cast { op: CastOp::IntToPtr, value }, ty)
    }

    /// Sign-extend or truncate an integer to `ty`; no-op when widths match.
    pub fn build_sext_or_trunc(&mut self, value: Value, ty: Type, name: &str) -> CanonPtrResult<Value> {
        let from = self.func.value_type(&value)?.bit_width();
        let to = ty.bit_width();
        if from == to {
            return Ok(value);
        }
        if let Some(c) = value.as_const_int() {
            return Ok(Value::const_int(c, to));
        }
        let op = if from < to { CastOp::SExt } else { CastOp::Trunc };
        self.insert(name, InstKind::Cast { op, value }, ty)
    }
}

/// Fold a binary operation on two constants of width `bits`.
///
/// Constants are stored sign-extended, which is what every operator wants
/// except a logical right shift.
fn fold_binary(op: BinOp, lhs: i64, rhs: i64, bits: u32) -> Constant {
    let lhs = match op {
        BinOp::LShr => mask(lhs as u64, bits),
        _ => lhs as u64,
    };
    Constant::int(op.apply(lhs, rhs as u64) as i64, bits)
}
