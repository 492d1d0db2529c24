//! The pointer offset tagging pass.
//!
//! For every opted-in function, each GEP that actually moves its pointer is
//! followed by code that embeds the byte offset into the high bits of the
//! result when the pointer's flag bit is set. See [`rewrite`] for the emitted
//! sequence.

mod eligibility;
mod insert_point;
mod offset;
mod rewrite;
mod scan;
mod vtable;

pub use eligibility::should_instrument;
pub use insert_point::{insertion_point_after, split_normal_edge, Producer, ResolvedPoint};
pub use offset::{byte_offset, constant_offset, emit_offset, validate_gep, ByteOffset};
pub use rewrite::{rewrite_gep, skip_reason, RewriteOutcome, SkipReason};
pub use scan::collect_candidates;
pub use vtable::is_vtable_like;

use crate::config::CanonPtrConfig;
use crate::error::CanonPtrResult;
use crate::ir::{DataLayout, Function, Module};
use crate::stats::CanonPtrStats;
use anyhow::{Context, Result};
use indexmap::IndexSet;

/// Which analyses survive a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreservedAnalyses {
    All,
    None,
}

impl PreservedAnalyses {
    pub fn all() -> Self {
        PreservedAnalyses::All
    }

    pub fn none() -> Self {
        PreservedAnalyses::None
    }

    pub fn preserves_all(&self) -> bool {
        matches!(self, PreservedAnalyses::All)
    }
}

/// A transformation over a whole module.
pub trait ModulePass {
    fn name(&self) -> &'static str;

    fn run(&mut self, module: &mut Module) -> Result<PreservedAnalyses>;
}

/// Name for a value derived from `base`, e.g. `%g` -> `%g.int`.
/// Values derived from unnamed instructions stay unnamed.
pub(crate) fn derived_name(base: Option<&str>, suffix: &str) -> String {
    match base {
        Some(base) if !base.is_empty() => format!("{}.{}", base, suffix),
        _ => String::new(),
    }
}

#[derive(Debug, Default)]
pub struct CanonPtrPass {
    config: CanonPtrConfig,
    stats: CanonPtrStats,
}

impl CanonPtrPass {
    pub fn new(config: CanonPtrConfig) -> CanonPtrResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stats: CanonPtrStats::new(),
        })
    }

    pub fn config(&self) -> &CanonPtrConfig {
        &self.config
    }

    /// Counters from the most recent [`run`](ModulePass::run).
    pub fn stats(&self) -> &CanonPtrStats {
        &self.stats
    }

    /// Rewrite every candidate GEP of `func`. Eligibility is not checked.
    ///
    /// `globals` names the module's global variables. Every candidate that
    /// will be rewritten is validated first, so on error `func` is unchanged.
    pub fn run_on_function(
        &self,
        func: &mut Function,
        layout: &dyn DataLayout,
        globals: &IndexSet<String>,
    ) -> CanonPtrResult<CanonPtrStats> {
        let mut stats = CanonPtrStats::new();
        let candidates = collect_candidates(func);
        stats.candidates = candidates.len();

        for &gep in &candidates {
            if skip_reason(func, gep, globals, &self.config)?.is_none() {
                validate_gep(func, gep, layout)?;
            }
        }

        for gep in candidates {
            log::debug!("Looking at GEP: {}", func.display_inst(gep));

            match rewrite_gep(func, gep, layout, globals, &self.config)? {
                RewriteOutcome::Skipped(reason) => {
                    log::debug!("Skipping {}: {}", func.display_inst(gep), reason);
                    match reason {
                        SkipReason::AllZeroIndices => stats.skipped_zero_index += 1,
                        SkipReason::VtableLike => stats.skipped_vtable += 1,
                        SkipReason::VectorType => stats.skipped_vector += 1,
                        SkipReason::AlreadyRewritten => stats.skipped_already_rewritten += 1,
                    }
                }
                RewriteOutcome::Rewritten { constant_offset, split_edge, .. } => {
                    stats.rewritten += 1;
                    if constant_offset {
                        stats.constant_offsets += 1;
                    } else {
                        stats.dynamic_offsets += 1;
                    }
                    if split_edge {
                        stats.edges_split += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}

impl ModulePass for CanonPtrPass {
    fn name(&self) -> &'static str {
        "canonptr"
    }

    fn run(&mut self, module: &mut Module) -> Result<PreservedAnalyses> {
        let layout = module.layout_handle();
        let globals = module.global_names();
        let mut total = CanonPtrStats::new();

        for func in module.iter_functions_mut() {
            total.functions_seen += 1;
            if !should_instrument(func, &self.config) {
                continue;
            }
            total.functions_instrumented += 1;

            let stats = self
                .run_on_function(func, layout.as_ref(), &globals)
                .with_context(|| format!("Failed to instrument function '{}'", func.name()))?;
            log::info!(
                "{}: rewrote {} of {} GEPs ({} skipped, {} edges split)",
                func.name(),
                stats.rewritten,
                stats.candidates,
                stats.skipped(),
                stats.edges_split
            );
            total.merge(&stats);
        }

        self.stats = total;
        Ok(PreservedAnalyses::none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Attribute, InstKind, Param, Type, Value};

    fn module_with(func: Function) -> Module {
        let mut module = Module::new("m");
        module.add_function(func);
        module
    }

    fn one_gep(name: &str) -> Function {
        let mut func = Function::new(name, Type::Ptr, vec![Param::new("p", Type::Ptr)]);
        let entry = func.add_block("entry");
        let gep = func
            .append_named(
                entry,
                "g",
                InstKind::Gep {
                    source_ty: Type::i32(),
                    base: Value::Arg(0),
                    indices: vec![Value::const_i64(1)],
                    inbounds: true,
                },
                Type::Ptr,
            )
            .unwrap();
        func.append_inst(entry, InstKind::Ret { value: Some(Value::Inst(gep)) }, Type::Void)
            .unwrap();
        func
    }

    #[test]
    fn test_derived_name() {
        assert_eq!(derived_name(Some("arrayidx"), "int"), "arrayidx.int");
        assert_eq!(derived_name(Some(""), "int"), "");
        assert_eq!(derived_name(None, "int"), "");
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = CanonPtrConfig {
            offset_shift: 10,
            ..Default::default()
        };
        assert!(CanonPtrPass::new(config).is_err());
    }

    #[test]
    fn test_run_respects_eligibility() {
        let mut module = module_with(one_gep("plain"));
        let mut pass = CanonPtrPass::default();
        assert_eq!(pass.run(&mut module).unwrap(), PreservedAnalyses::none());
        assert_eq!(pass.stats().functions_seen, 1);
        assert_eq!(pass.stats().functions_instrumented, 0);
        assert_eq!(pass.stats().rewritten, 0);

        let mut module = module_with(one_gep("tagged").with_attribute(Attribute::CanonPtr));
        pass.run(&mut module).unwrap();
        assert_eq!(pass.stats().functions_instrumented, 1);
        assert_eq!(pass.stats().rewritten, 1);
        assert_eq!(pass.stats().constant_offsets, 1);
        module.get_function("tagged").unwrap().verify().unwrap();
    }

    #[test]
    fn test_stats_reset_between_runs() {
        let mut module = module_with(one_gep("tagged").with_attribute(Attribute::CanonPtr));
        let mut pass = CanonPtrPass::default();
        pass.run(&mut module).unwrap();
        pass.run(&mut module).unwrap();
        assert_eq!(pass.stats().rewritten, 0);
        assert_eq!(pass.stats().skipped_already_rewritten, 1);
        assert_eq!(pass.name(), "canonptr");
    }

    #[test]
    fn test_contract_violation_leaves_function_unchanged() {
        // %ok = gep i32, %p, 1; %bad = gep i32, %ok, i128 %w
        let mut func = Function::new(
            "f",
            Type::Ptr,
            vec![Param::new("p", Type::Ptr), Param::new("w", Type::Int(128))],
        )
        .with_attribute(Attribute::CanonPtr);
        let entry = func.add_block("entry");
        let ok = func
            .append_named(
                entry,
                "ok",
                InstKind::Gep {
                    source_ty: Type::i32(),
                    base: Value::Arg(0),
                    indices: vec![Value::const_i64(1)],
                    inbounds: true,
                },
                Type::Ptr,
            )
            .unwrap();
        let bad = func
            .append_named(
                entry,
                "bad",
                InstKind::Gep {
                    source_ty: Type::i32(),
                    base: Value::Inst(ok),
                    indices: vec![Value::Arg(1)],
                    inbounds: true,
                },
                Type::Ptr,
            )
            .unwrap();
        func.append_inst(entry, InstKind::Ret { value: Some(Value::Inst(bad)) }, Type::Void)
            .unwrap();
        let before = func.to_string();

        let mut module = module_with(func);
        let err = CanonPtrPass::default().run(&mut module).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to instrument function 'f'"));

        let func = module.get_function("f").unwrap();
        assert_eq!(func.num_instructions(), 3);
        assert_eq!(func.to_string(), before);
        assert!(!func.inst(ok).unwrap().meta.canonptr_rewritten);
    }
}
