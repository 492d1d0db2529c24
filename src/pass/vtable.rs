//! Vtable access detection.
//!
//! Consumers of vtable slots expect the exact untagged address, so GEPs into
//! virtual-dispatch tables must be left alone. Front ends do not mark such
//! GEPs reliably, so detection falls back on Itanium C++ ABI naming:
//!
//! - `%vtable = load ptr, ptr %this` followed by a GEP on `%vtable`
//! - `%vbase.offset = load i64, ...` used as the only index (virtual bases)
//! - direct indexing into a `@_ZTV...` global variable
//!
//! An instruction may also carry an explicit `vtable_access` tag.

use crate::config::CanonPtrConfig;
use crate::error::{CanonPtrError, CanonPtrResult};
use crate::ir::{Function, InstId, InstKind, Value};
use indexmap::IndexSet;

/// Check whether the GEP `gep` addresses vtable storage.
///
/// `globals` holds the names of the module's global variables; a symbol
/// outside it (a function, say) never counts as a vtable.
pub fn is_vtable_like(
    func: &Function,
    gep: InstId,
    globals: &IndexSet<String>,
    config: &CanonPtrConfig,
) -> CanonPtrResult<bool> {
    let data = func.inst(gep)?;
    let InstKind::Gep { base, indices, .. } = &data.kind else {
        return Err(CanonPtrError::UnexpectedInstruction { id: gep, expected: "a getelementptr" });
    };

    if data.meta.vtable_access {
        return Ok(true);
    }

    if let Some(name) = func.value_name(base) {
        if name.starts_with(config.vtable_prefix.as_str()) {
            return Ok(true);
        }
    }

    if let [index] = indices.as_slice() {
        if let Some(name) = func.value_name(index) {
            if name.starts_with(config.vbase_offset_prefix.as_str()) {
                return Ok(true);
            }
        }
    }

    if let Value::Global(symbol) = base {
        if globals.contains(symbol) && symbol.starts_with(config.vtable_symbol_prefix.as_str()) {
            return Ok(true);
        }
    }

    Ok(false)
}
