//! Byte offset of a GEP relative to its base pointer.

use super::derived_name;
use crate::error::{CanonPtrError, CanonPtrResult};
use crate::ir::layout::{gep_steps, GepStep};
use crate::ir::{sign_extend, Builder, DataLayout, Function, InstId, InstKind, Type, Value};

/// Displacement computed by a GEP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteOffset {
    /// Known at compile time
    Constant(i64),
    /// Computed by emitted instructions (or an existing value)
    Dynamic(Value),
}

impl ByteOffset {
    /// The offset as an operand of pointer width `bits`.
    pub fn into_value(self, bits: u32) -> Value {
        match self {
            ByteOffset::Constant(c) => Value::const_int(c, bits),
            ByteOffset::Dynamic(v) => v,
        }
    }
}

fn gep_operands(func: &Function, gep: InstId) -> CanonPtrResult<(Type, Vec<Value>)> {
    match &func.inst(gep)?.kind {
        InstKind::Gep { source_ty, indices, .. } => Ok((source_ty.clone(), indices.clone())),
        _ => Err(CanonPtrError::UnexpectedInstruction { id: gep, expected: "a getelementptr" }),
    }
}

/// Every index must be a scalar integer no wider than a pointer.
fn check_index_types(func: &Function, indices: &[Value], ptr_bits: u32) -> CanonPtrResult<()> {
    for index in indices {
        match func.value_type(index)? {
            Type::Int(bits) if bits > ptr_bits => {
                return Err(CanonPtrError::IndexTooWide { bits, ptr_bits });
            }
            Type::Int(_) => {}
            other => return Err(CanonPtrError::InvalidIndexType(other)),
        }
    }
    Ok(())
}

/// Check that the offset of `gep` can be computed: every index is a scalar
/// integer no wider than a pointer and every struct index names a field.
pub fn validate_gep(func: &Function, gep: InstId, layout: &dyn DataLayout) -> CanonPtrResult<()> {
    let (source_ty, indices) = gep_operands(func, gep)?;
    check_index_types(func, &indices, layout.pointer_bits())?;
    gep_steps(layout, &source_ty, &indices)?;
    Ok(())
}

/// Fold the whole offset of `gep` to a constant, if every index is constant.
///
/// The result wraps at pointer width, so negative displacements come out
/// as negative numbers.
pub fn constant_offset(func: &Function, gep: InstId, layout: &dyn DataLayout) -> CanonPtrResult<Option<i64>> {
    let (source_ty, indices) = gep_operands(func, gep)?;
    let ptr_bits = layout.pointer_bits();
    check_index_types(func, &indices, ptr_bits)?;

    let mut total: i64 = 0;
    for (step, index) in gep_steps(layout, &source_ty, &indices)?.iter().zip(&indices) {
        let delta = match step {
            GepStep::Field(offset) => *offset as i64,
            GepStep::Scaled { stride } => match index.as_const_int() {
                Some(c) => c.wrapping_mul(*stride as i64),
                None => return Ok(None),
            },
        };
        total = total.wrapping_add(delta);
    }
    Ok(Some(sign_extend(total, ptr_bits)))
}

/// Emit the arithmetic computing the offset of `gep` at the builder's
/// insertion point.
///
/// Each variable index is sign-extended or truncated to pointer width and
/// scaled by its stride; field offsets and constant indices are summed into
/// one constant added at the end. Returns a pointer-width integer.
pub fn emit_offset(
    builder: &mut Builder<'_>,
    gep: InstId,
    layout: &dyn DataLayout,
    name: Option<&str>,
) -> CanonPtrResult<Value> {
    let (source_ty, indices) = gep_operands(builder.func(), gep)?;
    let ptr_bits = layout.pointer_bits();
    check_index_types(builder.func(), &indices, ptr_bits)?;
    let int_ty = Type::Int(ptr_bits);

    let mut constant: i64 = 0;
    let mut accumulated: Option<Value> = None;

    for (step, index) in gep_steps(layout, &source_ty, &indices)?.iter().zip(indices) {
        let stride = match step {
            GepStep::Field(offset) => {
                constant = constant.wrapping_add(*offset as i64);
                continue;
            }
            GepStep::Scaled { stride } => *stride,
        };
        if let Some(c) = index.as_const_int() {
            constant = constant.wrapping_add(c.wrapping_mul(stride as i64));
            continue;
        }
        if stride == 0 {
            continue;
        }

        let index = builder.build_sext_or_trunc(index, int_ty.clone(), &derived_name(name, "idx.ext"))?;
        let scaled = if stride == 1 {
            index
        } else {
            builder.build_mul(index, Value::const_int(stride as i64, ptr_bits), &derived_name(name, "idx"))?
        };
        accumulated = Some(match accumulated {
            Some(acc) => builder.build_add(acc, scaled, &derived_name(name, "offs"))?,
            None => scaled,
        });
    }

    let constant = Value::const_int(constant, ptr_bits);
    match accumulated {
        None => Ok(constant),
        Some(acc) if constant.is_zero() => Ok(acc),
        Some(acc) => builder.build_add(acc, constant, &derived_name(name, "offs")),
    }
}

/// Offset of `gep`, folded when possible and emitted otherwise.
pub fn byte_offset(
    builder: &mut Builder<'_>,
    gep: InstId,
    layout: &dyn DataLayout,
    name: Option<&str>,
) -> CanonPtrResult<ByteOffset> {
    if let Some(c) = constant_offset(builder.func(), gep, layout)? {
        return Ok(ByteOffset::Constant(c));
    }
    emit_offset(builder, gep, layout, name).map(ByteOffset::Dynamic)
}
