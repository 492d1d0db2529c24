//! Rewriting statistics.
//!
//! Tracks what the pass did during one run, for logging and tests.

use crate::ir::{InstKind, Module};
use std::fmt;

/// Counters for a single run of the pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CanonPtrStats {
    /// Functions visited
    pub functions_seen: usize,
    /// Functions that passed the eligibility filter
    pub functions_instrumented: usize,
    /// GEPs in the candidate snapshots
    pub candidates: usize,
    /// GEPs replaced by a tagged pointer
    pub rewritten: usize,
    /// GEPs skipped because every index is zero
    pub skipped_zero_index: usize,
    /// GEPs skipped as vtable accesses
    pub skipped_vtable: usize,
    /// GEPs skipped because they produce a vector of pointers
    pub skipped_vector: usize,
    /// GEPs skipped because an earlier run already rewrote them
    pub skipped_already_rewritten: usize,
    /// Invoke normal edges split to make room for code
    pub edges_split: usize,
    /// Rewrites whose offset folded to a constant
    pub constant_offsets: usize,
    /// Rewrites that needed offset arithmetic
    pub dynamic_offsets: usize,
}

impl CanonPtrStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of candidates left untouched.
    pub fn skipped(&self) -> usize {
        self.skipped_zero_index
            + self.skipped_vtable
            + self.skipped_vector
            + self.skipped_already_rewritten
    }

    /// Add another set of counters to this one.
    pub fn merge(&mut self, other: &CanonPtrStats) {
        self.functions_seen += other.functions_seen;
        self.functions_instrumented += other.functions_instrumented;
        self.candidates += other.candidates;
        self.rewritten += other.rewritten;
        self.skipped_zero_index += other.skipped_zero_index;
        self.skipped_vtable += other.skipped_vtable;
        self.skipped_vector += other.skipped_vector;
        self.skipped_already_rewritten += other.skipped_already_rewritten;
        self.edges_split += other.edges_split;
        self.constant_offsets += other.constant_offsets;
        self.dynamic_offsets += other.dynamic_offsets;
    }
}

impl fmt::Display for CanonPtrStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== canonptr statistics ===")?;
        writeln!(f, "Functions:    {} ({} instrumented)", self.functions_seen, self.functions_instrumented)?;
        writeln!(f, "Candidates:   {}", self.candidates)?;
        writeln!(
            f,
            "Rewritten:    {} ({} constant, {} dynamic offsets)",
            self.rewritten, self.constant_offsets, self.dynamic_offsets
        )?;
        writeln!(
            f,
            "Skipped:      {} (zero-index {}, vtable {}, vector {}, already rewritten {})",
            self.skipped(),
            self.skipped_zero_index,
            self.skipped_vtable,
            self.skipped_vector,
            self.skipped_already_rewritten
        )?;
        write!(f, "Edges split:  {}", self.edges_split)
    }
}

/// Count GEP instructions in a module.
pub fn count_geps(module: &Module) -> usize {
    module
        .iter_functions()
        .flat_map(|f| f.instructions().filter(move |&id| {
            f.inst(id).map(|d| matches!(d.kind, InstKind::Gep { .. })).unwrap_or(false)
        }))
        .count()
}

/// Count instructions in a module.
pub fn count_instructions(module: &Module) -> usize {
    module.iter_functions().map(|f| f.num_instructions()).sum()
}

/// Count blocks in a module.
pub fn count_blocks(module: &Module) -> usize {
    module.iter_functions().map(|f| f.num_blocks()).sum()
}
