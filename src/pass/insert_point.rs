//! Insertion points after a value's definition.
//!
//! New code that consumes a value must run exactly once, after the value is
//! available and before any of its existing users. For most producers that is
//! simply the next instruction. Two cases need care:
//!
//! - PHIs must stay grouped at the head of their block, so code goes after
//!   the last PHI.
//! - An invoke defines its result only on the normal edge. Code is placed in
//!   a fresh block on that edge (see [`split_normal_edge`]).

use crate::error::{CanonPtrError, CanonPtrResult};
use crate::ir::{BlockId, Function, InsertPoint, InstId, InstKind, Type};

/// Something that defines a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    Inst(InstId),
    Arg(usize),
}

/// A resolved insertion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPoint {
    pub point: InsertPoint,
    /// Block created on an invoke's normal edge, if one was needed
    pub split_block: Option<BlockId>,
}

impl ResolvedPoint {
    fn at(point: InsertPoint) -> Self {
        Self { point, split_block: None }
    }
}

/// Find where code consuming `producer` can be inserted, splitting an
/// invoke's normal edge when necessary.
pub fn insertion_point_after(func: &mut Function, producer: Producer) -> CanonPtrResult<ResolvedPoint> {
    match producer {
        Producer::Arg(index) => {
            func.param(index)?;
            let entry = func
                .entry_block()
                .ok_or_else(|| CanonPtrError::NoEntryBlock(func.name().to_string()))?;
            Ok(ResolvedPoint::at(InsertPoint::before(func.first_insertion_point(entry)?)))
        }
        Producer::Inst(id) => {
            let data = func.inst(id)?;
            let block = data.block.ok_or(CanonPtrError::UnknownInstruction(id))?;
            let is_invoke = matches!(data.kind, InstKind::Invoke { .. });
            let is_phi = data.is_phi();
            let is_terminator = data.is_terminator();

            if is_invoke {
                let split = split_normal_edge(func, id)?;
                let jump = func
                    .terminator(split)
                    .ok_or(CanonPtrError::UnknownBlock(split))?;
                return Ok(ResolvedPoint {
                    point: InsertPoint::before(jump),
                    split_block: Some(split),
                });
            }
            if is_phi {
                return Ok(ResolvedPoint::at(InsertPoint::before(func.first_insertion_point(block)?)));
            }
            if is_terminator {
                return Err(CanonPtrError::NoInsertionPoint(id));
            }

            let bb = func.block(block)?;
            let next = bb
                .position(id)
                .and_then(|pos| bb.instructions().get(pos + 1))
                .copied()
                .ok_or(CanonPtrError::NoInsertionPoint(id))?;
            Ok(ResolvedPoint::at(InsertPoint::before(next)))
        }
    }
}

/// Split the normal edge of `invoke`.
///
/// Before: `invoke ... to label %T`. After: the invoke targets a new block
/// `B` laid out just before `T`, `B` holds only `br label %T`, and every PHI
/// entry in `T` keyed by the invoke's block is rekeyed to `B` with its value
/// unchanged. `B` has exactly one predecessor (the invoke's block) and one
/// successor (`T`).
pub fn split_normal_edge(func: &mut Function, invoke: InstId) -> CanonPtrResult<BlockId> {
    let data = func.inst(invoke)?;
    let InstKind::Invoke { normal, .. } = data.kind else {
        return Err(CanonPtrError::UnexpectedInstruction { id: invoke, expected: "an invoke" });
    };
    let call_block = data.block.ok_or(CanonPtrError::UnknownInstruction(invoke))?;
    let dest = normal;

    let split = func.insert_block_before("invoke_insert_point", dest)?;
    func.append_inst(split, InstKind::Br { dest }, Type::Void)?;
    func.set_normal_dest(invoke, split)?;

    // Patch references in PHI nodes of the original successor.
    for phi in func.phis(dest)? {
        func.set_incoming_block(phi, call_block, split)?;
    }

    log::debug!(
        "Split normal edge {} -> {} of {} in '{}'",
        func.block(call_block)?.name(),
        func.block(dest)?.name(),
        func.display_inst(invoke),
        func.name()
    );

    Ok(split)
}
