//! Candidate scanning.

use crate::ir::{Function, InstId};

/// Snapshot every GEP of `func` in layout order.
///
/// The snapshot is taken before any rewriting, so instructions synthesized
/// while rewriting are never revisited.
pub fn collect_candidates(func: &Function) -> Vec<InstId> {
    func.instructions()
        .filter(|&id| func.inst(id).map(|d| d.kind.is_gep()).unwrap_or(false))
        .collect()
}
