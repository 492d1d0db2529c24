//! Offset tagging of a single GEP.
//!
//! A GEP `%g` is followed by
//!
//! ```text
//! %g.int        = ptrtoint ptr %g to i64
//! %g.upperbits  = lshr i64 %g.int, 48
//! %g.enable.sel = and i64 %g.upperbits, 1
//! %g.enable.bit = sub i64 0, %g.enable.sel
//! ...             offset arithmetic, unless the offset is constant
//! %g.shifted    = shl i64 %offset, 49
//! %n            = and i64 %g.shifted, %g.enable.bit
//! %g.added      = add i64 %g.int, %n
//! %g.newptr     = inttoptr i64 %g.added to ptr
//! ```
//!
//! and every pre-existing user of `%g` is switched to `%g.newptr`. When bit 48
//! of the pointer is clear the enable mask is zero and the result is the
//! original pointer bit for bit. `%g` itself stays in place.

use super::derived_name;
use super::insert_point::{insertion_point_after, Producer};
use super::offset::{byte_offset, validate_gep, ByteOffset};
use super::vtable::is_vtable_like;
use crate::config::CanonPtrConfig;
use crate::error::{CanonPtrError, CanonPtrResult};
use crate::ir::{Builder, DataLayout, Function, InstId, InstKind, Type, Value};
use indexmap::IndexSet;
use std::fmt;

/// Why a GEP was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Every index is zero; the GEP does not move the pointer
    AllZeroIndices,
    VtableLike,
    /// Produces a vector of pointers
    VectorType,
    AlreadyRewritten,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AllZeroIndices => write!(f, "all indices are zero"),
            SkipReason::VtableLike => write!(f, "vtable access"),
            SkipReason::VectorType => write!(f, "vector GEP"),
            SkipReason::AlreadyRewritten => write!(f, "already rewritten"),
        }
    }
}

/// Result of [`rewrite_gep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    Rewritten {
        /// The `inttoptr` now standing in for the GEP
        replacement: InstId,
        /// The offset folded to a constant
        constant_offset: bool,
        /// An invoke edge was split to place the code
        split_edge: bool,
    },
    Skipped(SkipReason),
}

/// Check whether `gep` needs no rewrite, and why.
pub fn skip_reason(
    func: &Function,
    gep: InstId,
    globals: &IndexSet<String>,
    config: &CanonPtrConfig,
) -> CanonPtrResult<Option<SkipReason>> {
    let data = func.inst(gep)?;
    let InstKind::Gep { indices, .. } = &data.kind else {
        return Err(CanonPtrError::UnexpectedInstruction { id: gep, expected: "a getelementptr" });
    };

    if data.meta.canonptr_rewritten {
        return Ok(Some(SkipReason::AlreadyRewritten));
    }
    // No effect on the pointer.
    if indices.iter().all(Value::is_zero) {
        return Ok(Some(SkipReason::AllZeroIndices));
    }
    if is_vtable_like(func, gep, globals, config)? {
        return Ok(Some(SkipReason::VtableLike));
    }
    if data.ty.is_vector() {
        return Ok(Some(SkipReason::VectorType));
    }
    Ok(None)
}

/// Replace the uses of `gep` with an offset-tagged pointer.
///
/// The GEP's indices are checked before anything is emitted, so an error
/// leaves `func` unchanged.
pub fn rewrite_gep(
    func: &mut Function,
    gep: InstId,
    layout: &dyn DataLayout,
    globals: &IndexSet<String>,
    config: &CanonPtrConfig,
) -> CanonPtrResult<RewriteOutcome> {
    if let Some(reason) = skip_reason(func, gep, globals, config)? {
        return Ok(RewriteOutcome::Skipped(reason));
    }
    validate_gep(func, gep, layout)?;

    let data = func.inst(gep)?;
    let gep_ty = data.ty.clone();
    let name = data.name().map(str::to_string);
    let name = name.as_deref();
    let mut users = data.users().to_vec();

    let resolved = insertion_point_after(func, Producer::Inst(gep))?;
    let int_ty = Type::i64();
    let int_bits = int_ty.bit_width();

    let mut b = Builder::new(func, resolved.point);
    let ptr_int = b.build_ptr_to_int(Value::Inst(gep), int_ty.clone(), &derived_name(name, "int"))?;

    // bits = ptr >> 48; sel = bits & 1; enable = -sel
    let upper_bits = b.build_lshr(
        ptr_int.clone(),
        Value::const_int(i64::from(config.flag_bit), int_bits),
        &derived_name(name, "upperbits"),
    )?;
    let enable_sel = b.build_and(upper_bits, Value::const_int(1, int_bits), &derived_name(name, "enable.sel"))?;
    let enable_bit = b.build_neg(enable_sel, &derived_name(name, "enable.bit"))?;

    let offset = byte_offset(&mut b, gep, layout, name)?;
    let constant_offset = matches!(offset, ByteOffset::Constant(_));
    let diff = b.build_sext_or_trunc(offset.into_value(layout.pointer_bits()), int_ty.clone(), "")?;

    let shifted = b.build_shl(
        diff,
        Value::const_int(i64::from(config.offset_shift), int_bits),
        &derived_name(name, "shifted"),
    )?;
    let add_offset = b.build_and(shifted, enable_bit, "")?;
    let ptr_add = b.build_add(ptr_int, add_offset, &derived_name(name, "added"))?;
    let new_ptr = b.build_int_to_ptr(ptr_add, gep_ty, &derived_name(name, "newptr"))?;
    let replacement = new_ptr.as_inst().ok_or(CanonPtrError::UnknownInstruction(gep))?;

    users.sort_unstable();
    users.dedup();
    for user in users {
        func.replace_uses_of_with(user, gep, &new_ptr)?;
    }
    func.meta_mut(gep)?.canonptr_rewritten = true;

    Ok(RewriteOutcome::Rewritten {
        replacement,
        constant_offset,
        split_edge: resolved.split_block.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::eval::Evaluator;
    use crate::ir::{BinOp, Constant, DefaultLayout, Param};

    const FLAG: u64 = 1 << 48;

    /// `f(ptr %p, i64 %i)`: `%g = gep`, `%v = load ptr %g`, `store %v, ptr %g`, `ret ptr %g`.
    fn gep_fn(source_ty: Type, indices: Vec<Value>) -> (Function, InstId) {
        let mut func = Function::new(
            "f",
            Type::Ptr,
            vec![Param::new("p", Type::Ptr), Param::new("i", Type::i64())],
        );
        let entry = func.add_block("entry");
        let gep = func
            .append_named(
                entry,
                "g",
                InstKind::Gep { source_ty, base: Value::Arg(0), indices, inbounds: true },
                Type::Ptr,
            )
            .unwrap();
        let load = func
            .append_named(entry, "v", InstKind::Load { ptr: Value::Inst(gep) }, Type::i32())
            .unwrap();
        func.append_inst(
            entry,
            InstKind::Store { value: Value::Inst(load), ptr: Value::Inst(gep) },
            Type::Void,
        )
        .unwrap();
        func.append_inst(entry, InstKind::Ret { value: Some(Value::Inst(gep)) }, Type::Void)
            .unwrap();
        (func, gep)
    }

    fn returned(func: &Function) -> Value {
        let entry = func.entry_block().unwrap();
        match &func.inst(func.terminator(entry).unwrap()).unwrap().kind {
            InstKind::Ret { value: Some(v) } => v.clone(),
            other => panic!("expected ret, got {:?}", other),
        }
    }

    #[test]
    fn test_rewrite_constant_offset() {
        let dl = DefaultLayout::new();
        let config = CanonPtrConfig::default();
        let (mut func, gep) = gep_fn(Type::i32(), vec![Value::const_i64(5)]);

        let outcome = rewrite_gep(&mut func, gep, &dl, &IndexSet::new(), &config).unwrap();
        let RewriteOutcome::Rewritten { replacement, constant_offset, split_edge } = outcome else {
            panic!("expected a rewrite, got {:?}", outcome);
        };
        assert!(constant_offset);
        assert!(!split_edge);
        func.verify().unwrap();

        // All three users moved; only the ptrtoint still reads the GEP.
        assert_eq!(returned(&func), Value::Inst(replacement));
        let users = func.users(gep).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(func.inst(users[0]).unwrap().name(), Some("g.int"));
        assert!(func.inst(gep).unwrap().meta.canonptr_rewritten);

        // No offset arithmetic was emitted.
        assert!(!func.instructions().any(|id| matches!(
            func.inst(id).unwrap().kind,
            InstKind::Binary { op: BinOp::Mul, .. }
        )));
        assert_eq!(func.inst(replacement).unwrap().name(), Some("g.newptr"));

        let out = returned(&func);
        let eval = Evaluator::new(&func, &dl).with_args(&[0x1000, 0]);
        assert_eq!(eval.eval(&out).unwrap(), 0x1000 + 20);
        let eval = Evaluator::new(&func, &dl).with_args(&[FLAG | 0x1000, 0]);
        assert_eq!(eval.eval(&out).unwrap(), (FLAG | 0x1000) + 20 + (20 << 49));
    }

    #[test]
    fn test_rewrite_dynamic_offset() {
        let dl = DefaultLayout::new();
        let config = CanonPtrConfig::default();
        let (mut func, gep) = gep_fn(Type::i64(), vec![Value::Arg(1)]);

        let outcome = rewrite_gep(&mut func, gep, &dl, &IndexSet::new(), &config).unwrap();
        assert!(matches!(outcome, RewriteOutcome::Rewritten { constant_offset: false, .. }));
        func.verify().unwrap();

        let out = returned(&func);
        for (base, index) in [(0x2000u64, 3u64), (FLAG | 0x2000, 3), (FLAG | 0x40, (-2i64) as u64)] {
            let eval = Evaluator::new(&func, &dl).with_args(&[base, index]);
            let original = eval.eval(&Value::Inst(gep)).unwrap();
            let expected = if original & FLAG != 0 {
                original.wrapping_add(index.wrapping_mul(8) << 49)
            } else {
                original
            };
            assert_eq!(eval.eval(&out).unwrap(), expected);
        }
    }

    #[test]
    fn test_skips() {
        let dl = DefaultLayout::new();
        let config = CanonPtrConfig::default();

        let (mut func, gep) = gep_fn(Type::i32(), vec![Value::const_i64(0)]);
        let before = func.num_instructions();
        assert_eq!(
            rewrite_gep(&mut func, gep, &dl, &IndexSet::new(), &config).unwrap(),
            RewriteOutcome::Skipped(SkipReason::AllZeroIndices)
        );
        assert_eq!(func.num_instructions(), before);
        assert_eq!(returned(&func), Value::Inst(gep));

        let (mut func, gep) = gep_fn(Type::i32(), vec![]);
        assert_eq!(skip_reason(&func, gep, &IndexSet::new(), &config).unwrap(), Some(SkipReason::AllZeroIndices));
        func.meta_mut(gep).unwrap().vtable_access = true;
        assert_eq!(skip_reason(&func, gep, &IndexSet::new(), &config).unwrap(), Some(SkipReason::AllZeroIndices));

        let (mut func, gep) = gep_fn(Type::i32(), vec![Value::const_i64(1)]);
        func.meta_mut(gep).unwrap().vtable_access = true;
        assert_eq!(skip_reason(&func, gep, &IndexSet::new(), &config).unwrap(), Some(SkipReason::VtableLike));

        let mut func = Function::new("v", Type::Void, vec![Param::new("p", Type::Ptr)]);
        let entry = func.add_block("entry");
        let gep = func
            .append_inst(
                entry,
                InstKind::Gep {
                    source_ty: Type::i32(),
                    base: Value::Arg(0),
                    indices: vec![Value::Const(Constant::Undef(Type::vector(2, Type::i64())))],
                    inbounds: false,
                },
                Type::vector(2, Type::Ptr),
            )
            .unwrap();
        func.append_inst(entry, InstKind::Ret { value: None }, Type::Void).unwrap();
        assert_eq!(
            rewrite_gep(&mut func, gep, &dl, &IndexSet::new(), &config).unwrap(),
            RewriteOutcome::Skipped(SkipReason::VectorType)
        );
    }

    #[test]
    fn test_second_rewrite_is_skipped() {
        let dl = DefaultLayout::new();
        let config = CanonPtrConfig::default();
        let (mut func, gep) = gep_fn(Type::i32(), vec![Value::Arg(1)]);
        rewrite_gep(&mut func, gep, &dl, &IndexSet::new(), &config).unwrap();
        let count = func.num_instructions();
        assert_eq!(
            rewrite_gep(&mut func, gep, &dl, &IndexSet::new(), &config).unwrap(),
            RewriteOutcome::Skipped(SkipReason::AlreadyRewritten)
        );
        assert_eq!(func.num_instructions(), count);
    }

    #[test]
    fn test_unnamed_gep_gets_unnamed_code() {
        let dl = DefaultLayout::new();
        let config = CanonPtrConfig::default();
        let mut func = Function::new("f", Type::Ptr, vec![Param::new("p", Type::Ptr)]);
        let entry = func.add_block("entry");
        let gep = func
            .append_inst(
                entry,
                InstKind::Gep {
                    source_ty: Type::i8(),
                    base: Value::Arg(0),
                    indices: vec![Value::const_i64(1)],
                    inbounds: false,
                },
                Type::Ptr,
            )
            .unwrap();
        func.append_inst(entry, InstKind::Ret { value: Some(Value::Inst(gep)) }, Type::Void)
            .unwrap();

        rewrite_gep(&mut func, gep, &dl, &IndexSet::new(), &config).unwrap();
        assert!(func
            .instructions()
            .filter(|&id| id != gep)
            .all(|id| func.inst(id).unwrap().name().is_none()));
    }

    #[test]
    fn test_bad_index_leaves_function_unchanged() {
        let dl = DefaultLayout::new();
        let config = CanonPtrConfig::default();
        let (mut func, gep) = gep_fn(Type::i32(), vec![Value::const_int(1, 128)]);
        let before = func.to_string();

        assert!(matches!(
            rewrite_gep(&mut func, gep, &dl, &IndexSet::new(), &config),
            Err(CanonPtrError::IndexTooWide { bits: 128, ptr_bits: 64 })
        ));
        assert_eq!(func.to_string(), before);
        assert!(!func.inst(gep).unwrap().meta.canonptr_rewritten);
    }
}
