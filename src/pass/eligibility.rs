//! Function eligibility.

use crate::config::CanonPtrConfig;
use crate::ir::{Attribute, Function, Linkage};

/// Decide whether `func` should be instrumented.
///
/// Only defined functions that opted in are rewritten. Available-externally
/// bodies are skipped because the defining translation unit instruments
/// them, and runtime-support functions are never touched.
pub fn should_instrument(func: &Function, config: &CanonPtrConfig) -> bool {
    if func.is_declaration() {
        return false;
    }
    if func.linkage() == Linkage::AvailableExternally {
        return false;
    }
    if func.name().starts_with(config.runtime_prefix.as_str()) {
        return false;
    }
    // Leave if the function doesn't need instrumentation.
    if func.has_attribute(Attribute::DisableSanitizerInstrumentation) {
        return false;
    }
    func.has_attribute(Attribute::CanonPtr)
}
