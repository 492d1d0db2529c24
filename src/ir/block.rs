//! Basic block representation

use super::InstId;

/// A basic block: an ordered list of instruction ids. The instructions
/// themselves live in the owning function's arena.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    name: String,
    pub(crate) insts: Vec<InstId>,
}

impl BasicBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            insts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[InstId] {
        &self.insts
    }

    /// Position of `inst` within this block.
    pub fn position(&self, inst: InstId) -> Option<usize> {
        self.insts.iter().position(|&i| i == inst)
    }

    /// Last instruction, which is the terminator in a well-formed block.
    pub fn last(&self) -> Option<InstId> {
        self.insts.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }
}
