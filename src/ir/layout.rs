//! Memory layout oracle.
//!
//! Maps IR types to byte sizes and alignments. The rewriting pass only reads
//! from it, so a single layout is shared by every function of a module.

use super::{Type, Value};
use crate::error::{CanonPtrError, CanonPtrResult};
use std::fmt;

/// Size and alignment queries for IR types.
pub trait DataLayout: fmt::Debug + Send + Sync {
    /// Width of a pointer in bits.
    fn pointer_bits(&self) -> u32;

    /// Number of bytes a value of `ty` occupies, without tail padding.
    fn size_of(&self, ty: &Type) -> u64;

    /// ABI alignment of `ty` in bytes.
    fn align_of(&self, ty: &Type) -> u64;

    /// Distance in bytes between consecutive elements of type `ty`.
    fn alloc_size_of(&self, ty: &Type) -> u64 {
        align_to(self.size_of(ty), self.align_of(ty))
    }

    /// Byte offset of field `index` in a struct with the given fields.
    fn struct_field_offset(&self, fields: &[Type], packed: bool, index: usize) -> Option<u64> {
        if index >= fields.len() {
            return None;
        }
        let mut offset = 0u64;
        for (i, field) in fields.iter().enumerate() {
            if !packed {
                offset = align_to(offset, self.align_of(field));
            }
            if i == index {
                return Some(offset);
            }
            offset += self.alloc_size_of(field);
        }
        None
    }
}

/// Round `value` up to a multiple of `align`.
pub fn align_to(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// LP64 layout with natural alignment: 64-bit pointers, integers aligned to
/// their power-of-two byte size (capped at 16), padded structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultLayout {
    pointer_bits: u32,
}

impl DefaultLayout {
    pub const LP64: Self = Self { pointer_bits: 64 };

    pub fn new() -> Self {
        Self::LP64
    }
}

impl Default for DefaultLayout {
    fn default() -> Self {
        Self::LP64
    }
}

impl DataLayout for DefaultLayout {
    fn pointer_bits(&self) -> u32 {
        self.pointer_bits
    }

    fn size_of(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void | Type::Function { .. } => 0,
            Type::Int(bits) => u64::from(bits.div_ceil(8)),
            Type::Ptr => u64::from(self.pointer_bits / 8),
            Type::Array(n, elem) => n * self.alloc_size_of(elem),
            Type::Vector(n, elem) => match elem.as_ref() {
                Type::Int(bits) => (u64::from(*n) * u64::from(*bits)).div_ceil(8),
                other => u64::from(*n) * self.size_of(other),
            },
            Type::Struct { fields, packed } => {
                let mut offset = 0u64;
                for field in fields {
                    if !packed {
                        offset = align_to(offset, self.align_of(field));
                    }
                    offset += self.alloc_size_of(field);
                }
                align_to(offset, self.align_of(ty))
            }
        }
    }

    fn align_of(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void | Type::Function { .. } => 1,
            Type::Int(bits) => u64::from(bits.div_ceil(8)).next_power_of_two().min(16),
            Type::Ptr => u64::from(self.pointer_bits / 8),
            Type::Array(_, elem) => self.align_of(elem),
            Type::Vector(_, _) => self.size_of(ty).max(1).next_power_of_two(),
            Type::Struct { fields, packed } => {
                if *packed {
                    1
                } else {
                    fields.iter().map(|f| self.align_of(f)).max().unwrap_or(1)
                }
            }
        }
    }
}

/// How a single GEP index contributes to the byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GepStep {
    /// Struct field selection: a fixed byte offset
    Field(u64),
    /// Sequential step: the index value times `stride`
    Scaled { stride: u64 },
}

/// Resolve each index of a GEP over `source_ty` to its offset contribution.
///
/// The first index steps over whole `source_ty` objects; each later index
/// steps into the type reached so far (struct field, array or vector element).
pub fn gep_steps(
    layout: &dyn DataLayout,
    source_ty: &Type,
    indices: &[Value],
) -> CanonPtrResult<Vec<GepStep>> {
    let mut steps = Vec::with_capacity(indices.len());
    let mut current = source_ty;

    for (i, index) in indices.iter().enumerate() {
        if i == 0 {
            steps.push(GepStep::Scaled { stride: layout.alloc_size_of(source_ty) });
            continue;
        }

        match current {
            Type::Struct { fields, packed } => {
                let field = index.as_const_int().ok_or(CanonPtrError::NonConstantStructIndex)?;
                let out_of_range = || CanonPtrError::FieldOutOfRange {
                    index: field,
                    ty: current.clone(),
                };
                let field_index = usize::try_from(field).map_err(|_| out_of_range())?;
                let offset = layout
                    .struct_field_offset(fields, *packed, field_index)
                    .ok_or_else(out_of_range)?;
                steps.push(GepStep::Field(offset));
                current = &fields[field_index];
            }
            Type::Array(_, elem) | Type::Vector(_, elem) => {
                steps.push(GepStep::Scaled { stride: layout.alloc_size_of(elem) });
                current = elem;
            }
            other => return Err(CanonPtrError::InvalidIndexedType(other.clone())),
        }
    }

    Ok(steps)
}
