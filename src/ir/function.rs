//! Function representation
//!
//! A function owns two arenas: instructions (`InstId`) and blocks
//! (`BlockId`). Block order is kept separately in `layout`, so blocks can be
//! inserted anywhere without renumbering. Every instruction records the
//! instructions that use its result, which keeps use replacement local.

use super::{BasicBlock, BlockId, Constant, InstData, InstId, InstKind, InstMetadata, Type, Value};
use crate::error::{CanonPtrError, CanonPtrResult};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Symbol linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    #[default]
    External,
    Internal,
    Private,
    /// Body is a copy of a definition in another translation unit
    AvailableExternally,
    LinkOnceOdr,
    WeakOdr,
}

/// Function attributes relevant to instrumentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    /// Opt-in marker for pointer offset tagging
    CanonPtr,
    /// Opt-out marker shared by all instrumentation passes
    DisableSanitizerInstrumentation,
    NoUnwind,
    NoInline,
}

/// A formal parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    ret_ty: Type,
    params: Vec<Param>,
    linkage: Linkage,
    attributes: BTreeSet<Attribute>,
    insts: Vec<InstData>,
    blocks: Vec<BasicBlock>,
    layout: Vec<BlockId>,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_ty: Type, params: Vec<Param>) -> Self {
        Self {
            name: name.into(),
            ret_ty,
            params,
            linkage: Linkage::default(),
            attributes: BTreeSet::new(),
            insts: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ret_ty(&self) -> &Type {
        &self.ret_ty
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, index: usize) -> CanonPtrResult<&Param> {
        self.params.get(index).ok_or(CanonPtrError::UnknownArgument(index))
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn set_linkage(&mut self, linkage: Linkage) {
        self.linkage = linkage;
    }

    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub fn add_attribute(&mut self, attr: Attribute) {
        self.attributes.insert(attr);
    }

    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.insert(attr);
        self
    }

    pub fn has_attribute(&self, attr: Attribute) -> bool {
        self.attributes.contains(&attr)
    }

    /// Check if function is a declaration (no body)
    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    // ========== Blocks ==========

    /// Append a new empty block to the layout.
    pub fn add_block(&mut self, name: &str) -> BlockId {
        let id = self.push_block(name);
        self.layout.push(id);
        id
    }

    /// Create a new empty block laid out immediately before `before`.
    pub fn insert_block_before(&mut self, name: &str, before: BlockId) -> CanonPtrResult<BlockId> {
        let pos = self
            .layout
            .iter()
            .position(|&b| b == before)
            .ok_or(CanonPtrError::UnknownBlock(before))?;
        let id = self.push_block(name);
        self.layout.insert(pos, id);
        Ok(id)
    }

    fn push_block(&mut self, name: &str) -> BlockId {
        let name = self.unique_block_name(name);
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(name));
        id
    }

    fn unique_block_name(&self, base: &str) -> String {
        let taken = |name: &str| self.blocks.iter().any(|b| b.name() == name);
        if !taken(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn block(&self, id: BlockId) -> CanonPtrResult<&BasicBlock> {
        self.blocks.get(id.index()).ok_or(CanonPtrError::UnknownBlock(id))
    }

    /// Blocks in layout order; the first is the entry block.
    pub fn block_order(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.layout
            .iter()
            .copied()
            .find(|b| self.blocks[b.index()].name() == name)
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn num_blocks(&self) -> usize {
        self.layout.len()
    }

    // ========== Instructions ==========

    pub fn inst(&self, id: InstId) -> CanonPtrResult<&InstData> {
        self.insts.get(id.index()).ok_or(CanonPtrError::UnknownInstruction(id))
    }

    fn inst_mut(&mut self, id: InstId) -> CanonPtrResult<&mut InstData> {
        self.insts.get_mut(id.index()).ok_or(CanonPtrError::UnknownInstruction(id))
    }

    pub fn meta_mut(&mut self, id: InstId) -> CanonPtrResult<&mut InstMetadata> {
        Ok(&mut self.inst_mut(id)?.meta)
    }

    /// Append an unnamed instruction to the end of `block`.
    pub fn append_inst(&mut self, block: BlockId, kind: InstKind, ty: Type) -> CanonPtrResult<InstId> {
        self.append(block, None, kind, ty)
    }

    /// Append a named instruction to the end of `block`.
    pub fn append_named(
        &mut self,
        block: BlockId,
        name: &str,
        kind: InstKind,
        ty: Type,
    ) -> CanonPtrResult<InstId> {
        self.append(block, Some(name.to_string()), kind, ty)
    }

    fn append(
        &mut self,
        block: BlockId,
        name: Option<String>,
        kind: InstKind,
        ty: Type,
    ) -> CanonPtrResult<InstId> {
        self.block(block)?;
        let id = self.create_inst(kind, ty, name)?;
        self.insts[id.index()].block = Some(block);
        self.blocks[block.index()].insts.push(id);
        Ok(id)
    }

    /// Insert a new instruction immediately before `anchor`.
    pub fn insert_before(
        &mut self,
        anchor: InstId,
        name: Option<String>,
        kind: InstKind,
        ty: Type,
    ) -> CanonPtrResult<InstId> {
        let block = self
            .inst(anchor)?
            .block
            .ok_or(CanonPtrError::UnknownInstruction(anchor))?;
        let pos = self
            .block(block)?
            .position(anchor)
            .ok_or(CanonPtrError::UnknownInstruction(anchor))?;
        let id = self.create_inst(kind, ty, name)?;
        self.insts[id.index()].block = Some(block);
        self.blocks[block.index()].insts.insert(pos, id);
        Ok(id)
    }

    /// Allocate an instruction in the arena and register its uses.
    fn create_inst(&mut self, kind: InstKind, ty: Type, name: Option<String>) -> CanonPtrResult<InstId> {
        for op in kind.operands() {
            self.check_value(op)?;
        }
        for succ in kind.successors() {
            self.block(succ)?;
        }
        if let InstKind::Phi { incoming } = &kind {
            for (_, block) in incoming {
                self.block(*block)?;
            }
        }

        let id = InstId(self.insts.len() as u32);
        let producers: Vec<InstId> = kind.operands().iter().filter_map(|v| v.as_inst()).collect();
        let mut data = InstData::new(kind, ty);
        data.name = name;
        self.insts.push(data);
        for producer in producers {
            self.insts[producer.index()].users.push(id);
        }
        Ok(id)
    }

    fn check_value(&self, value: &Value) -> CanonPtrResult<()> {
        match value {
            Value::Inst(id) => self.inst(*id).map(|_| ()),
            Value::Arg(index) => self.param(*index).map(|_| ()),
            Value::Const(_) | Value::Global(_) => Ok(()),
        }
    }

    /// Add an incoming edge to an existing PHI.
    pub fn add_phi_incoming(&mut self, phi: InstId, value: Value, block: BlockId) -> CanonPtrResult<()> {
        self.check_value(&value)?;
        self.block(block)?;
        match &mut self.inst_mut(phi)?.kind {
            InstKind::Phi { incoming } => incoming.push((value.clone(), block)),
            _ => return Err(CanonPtrError::UnexpectedInstruction { id: phi, expected: "a phi" }),
        }
        if let Value::Inst(producer) = value {
            self.insts[producer.index()].users.push(phi);
        }
        Ok(())
    }

    /// All instructions in layout order.
    pub fn instructions(&self) -> impl Iterator<Item = InstId> + '_ {
        self.layout
            .iter()
            .flat_map(move |b| self.blocks[b.index()].insts.iter().copied())
    }

    pub fn num_instructions(&self) -> usize {
        self.layout.iter().map(|b| self.blocks[b.index()].len()).sum()
    }

    // ========== Uses ==========

    /// Instructions using the result of `id`, one entry per use.
    pub fn users(&self, id: InstId) -> CanonPtrResult<&[InstId]> {
        Ok(self.inst(id)?.users())
    }

    /// Replace every operand of `user` that refers to `from` with `to`.
    /// Returns the number of operands rewritten.
    pub fn replace_uses_of_with(&mut self, user: InstId, from: InstId, to: &Value) -> CanonPtrResult<usize> {
        self.check_value(to)?;
        self.inst(from)?;
        let from_value = Value::Inst(from);

        let mut count = 0;
        for op in self.inst_mut(user)?.kind.operands_mut() {
            if *op == from_value {
                *op = to.clone();
                count += 1;
            }
        }
        if count == 0 {
            return Ok(0);
        }

        self.insts[from.index()].users.retain(|&u| u != user);
        if let Value::Inst(to_id) = to {
            let users = &mut self.insts[to_id.index()].users;
            users.extend(std::iter::repeat(user).take(count));
        }
        Ok(count)
    }

    /// Redirect every use of `from` to `to`.
    pub fn replace_all_uses_with(&mut self, from: InstId, to: &Value) -> CanonPtrResult<usize> {
        let mut users = self.users(from)?.to_vec();
        users.dedup();
        let mut count = 0;
        for user in users {
            count += self.replace_uses_of_with(user, from, to)?;
        }
        Ok(count)
    }

    // ========== CFG ==========

    /// Terminator of `block`, if its last instruction is one.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = self.blocks.get(block.index())?.last()?;
        self.insts[last.index()].is_terminator().then_some(last)
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .map(|t| self.insts[t.index()].kind.successors())
            .unwrap_or_default()
    }

    /// Predecessors in layout order, one entry per incoming edge.
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        let mut preds = Vec::new();
        for &b in &self.layout {
            for succ in self.successors(b) {
                if succ == block {
                    preds.push(b);
                }
            }
        }
        preds
    }

    /// Leading PHI nodes of `block`.
    pub fn phis(&self, block: BlockId) -> CanonPtrResult<Vec<InstId>> {
        Ok(self
            .block(block)?
            .instructions()
            .iter()
            .copied()
            .take_while(|i| self.insts[i.index()].is_phi())
            .collect())
    }

    /// First instruction of `block` that is not a PHI.
    pub fn first_insertion_point(&self, block: BlockId) -> CanonPtrResult<InstId> {
        self.block(block)?
            .instructions()
            .iter()
            .copied()
            .find(|i| !self.insts[i.index()].is_phi())
            .ok_or_else(|| CanonPtrError::Verify {
                function: self.name.clone(),
                message: format!("block '{}' has no terminator", self.blocks[block.index()].name()),
            })
    }

    /// Retarget the normal-path successor of an invoke.
    pub fn set_normal_dest(&mut self, invoke: InstId, dest: BlockId) -> CanonPtrResult<()> {
        self.block(dest)?;
        match &mut self.inst_mut(invoke)?.kind {
            InstKind::Invoke { normal, .. } => {
                *normal = dest;
                Ok(())
            }
            _ => Err(CanonPtrError::UnexpectedInstruction { id: invoke, expected: "an invoke" }),
        }
    }

    /// Rekey every incoming entry of `phi` coming from `from` to `to`.
    pub fn set_incoming_block(&mut self, phi: InstId, from: BlockId, to: BlockId) -> CanonPtrResult<usize> {
        self.block(to)?;
        match &mut self.inst_mut(phi)?.kind {
            InstKind::Phi { incoming } => {
                let mut count = 0;
                for (_, block) in incoming.iter_mut().filter(|(_, b)| *b == from) {
                    *block = to;
                    count += 1;
                }
                Ok(count)
            }
            _ => Err(CanonPtrError::UnexpectedInstruction { id: phi, expected: "a phi" }),
        }
    }

    // ========== Values ==========

    pub fn value_type(&self, value: &Value) -> CanonPtrResult<Type> {
        match value {
            Value::Inst(id) => Ok(self.inst(*id)?.ty.clone()),
            Value::Arg(index) => Ok(self.param(*index)?.ty.clone()),
            Value::Const(c) => Ok(c.ty()),
            Value::Global(_) => Ok(Type::Ptr),
        }
    }

    /// Symbolic name of a value, if it has one.
    pub fn value_name<'a>(&'a self, value: &'a Value) -> Option<&'a str> {
        match value {
            Value::Inst(id) => self.insts.get(id.index())?.name(),
            Value::Arg(index) => self.params.get(*index).map(|p| p.name.as_str()),
            Value::Global(name) => Some(name),
            Value::Const(_) => None,
        }
    }

    // ========== Verification ==========

    /// Check structural well-formedness: terminators, PHI placement,
    /// PHI/predecessor agreement and use-list consistency.
    pub fn verify(&self) -> CanonPtrResult<()> {
        let fail = |message: String| CanonPtrError::Verify {
            function: self.name.clone(),
            message,
        };

        let mut seen: HashSet<InstId> = HashSet::new();
        for &b in &self.layout {
            let block = self.block(b)?;
            let insts = block.instructions();
            let Some(&last) = insts.last() else {
                return Err(fail(format!("block '{}' is empty", block.name())));
            };
            if !self.insts[last.index()].is_terminator() {
                return Err(fail(format!("block '{}' does not end in a terminator", block.name())));
            }

            let mut past_phis = false;
            for (pos, &id) in insts.iter().enumerate() {
                if !seen.insert(id) {
                    return Err(fail(format!("{} appears in more than one position", id)));
                }
                let data = &self.insts[id.index()];
                if data.block != Some(b) {
                    return Err(fail(format!("{} has a stale parent block", id)));
                }
                if data.is_terminator() && pos + 1 != insts.len() {
                    return Err(fail(format!("terminator {} in the middle of '{}'", id, block.name())));
                }
                if data.is_phi() {
                    if past_phis {
                        return Err(fail(format!("phi {} is not grouped at the head of '{}'", id, block.name())));
                    }
                } else {
                    past_phis = true;
                }
            }

            let preds: BTreeSet<BlockId> = self.predecessors(b).into_iter().collect();
            for phi in self.phis(b)? {
                if let InstKind::Phi { incoming } = &self.insts[phi.index()].kind {
                    let keyed: BTreeSet<BlockId> = incoming.iter().map(|(_, blk)| *blk).collect();
                    if keyed != preds {
                        return Err(fail(format!(
                            "phi {} in '{}' does not match the block's predecessors",
                            id_name(self, phi),
                            block.name()
                        )));
                    }
                }
            }
        }

        for id in self.instructions() {
            let mut expected: Vec<InstId> = Vec::new();
            for user in self.instructions() {
                for op in self.insts[user.index()].kind.operands() {
                    if *op == Value::Inst(id) {
                        expected.push(user);
                    }
                }
            }
            let mut actual = self.insts[id.index()].users.clone();
            expected.sort();
            actual.sort();
            if expected != actual {
                return Err(fail(format!("use list of {} is out of sync", id_name(self, id))));
            }
        }

        Ok(())
    }

    // ========== Printing ==========

    /// Render a value the way it appears as an operand.
    pub fn display_value(&self, value: &Value) -> String {
        match value {
            Value::Inst(id) => id_name(self, *id),
            Value::Arg(index) => match self.params.get(*index) {
                Some(p) => format!("%{}", p.name),
                None => format!("%arg{}", index),
            },
            Value::Const(Constant::Int { value, .. }) => value.to_string(),
            Value::Const(Constant::Null) => "null".to_string(),
            Value::Const(Constant::Undef(_)) => "undef".to_string(),
            Value::Global(name) => format!("@{}", name),
        }
    }

    fn typed(&self, value: &Value) -> String {
        let ty = self
            .value_type(value)
            .map(|t| t.to_string())
            .unwrap_or_else(|_| "?".to_string());
        format!("{} {}", ty, self.display_value(value))
    }

    fn block_label(&self, block: BlockId) -> String {
        match self.blocks.get(block.index()) {
            Some(b) => format!("%{}", b.name()),
            None => format!("%{}", block),
        }
    }

    /// Render one instruction as a line of text.
    pub fn display_inst(&self, id: InstId) -> String {
        let Some(data) = self.insts.get(id.index()) else {
            return format!("<unknown {}>", id);
        };
        let body = match &data.kind {
            InstKind::Gep { source_ty, base, indices, inbounds } => {
                let mut s = format!(
                    "getelementptr {}{}, {}",
                    if *inbounds { "inbounds " } else { "" },
                    source_ty,
                    self.typed(base)
                );
                for idx in indices {
                    s.push_str(", ");
                    s.push_str(&self.typed(idx));
                }
                s
            }
            InstKind::Phi { incoming } => {
                let entries: Vec<String> = incoming
                    .iter()
                    .map(|(v, b)| format!("[ {}, {} ]", self.display_value(v), self.block_label(*b)))
                    .collect();
                format!("phi {} {}", data.ty, entries.join(", "))
            }
            InstKind::Binary { op, lhs, rhs } => {
                format!("{} {}, {}", op, self.typed(lhs), self.display_value(rhs))
            }
            InstKind::Cast { op, value } => format!("{} {} to {}", op, self.typed(value), data.ty),
            InstKind::ICmp { pred, lhs, rhs } => {
                format!("icmp {} {}, {}", pred.mnemonic(), self.typed(lhs), self.display_value(rhs))
            }
            InstKind::Alloca { allocated } => format!("alloca {}", allocated),
            InstKind::Load { ptr } => format!("load {}, {}", data.ty, self.typed(ptr)),
            InstKind::Store { value, ptr } => format!("store {}, {}", self.typed(value), self.typed(ptr)),
            InstKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| self.typed(a)).collect();
                format!("call {} {}({})", data.ty, self.display_value(callee), args.join(", "))
            }
            InstKind::Br { dest } => format!("br label {}", self.block_label(*dest)),
            InstKind::CondBr { cond, then_dest, else_dest } => format!(
                "br {}, label {}, label {}",
                self.typed(cond),
                self.block_label(*then_dest),
                self.block_label(*else_dest)
            ),
            InstKind::Ret { value: Some(v) } => format!("ret {}", self.typed(v)),
            InstKind::Ret { value: None } => "ret void".to_string(),
            InstKind::Invoke { callee, args, normal, unwind } => {
                let args: Vec<String> = args.iter().map(|a| self.typed(a)).collect();
                format!(
                    "invoke {} {}({}) to label {} unwind label {}",
                    data.ty,
                    self.display_value(callee),
                    args.join(", "),
                    self.block_label(*normal),
                    self.block_label(*unwind)
                )
            }
            InstKind::Unreachable => "unreachable".to_string(),
        };

        if data.ty == Type::Void {
            body
        } else {
            format!("{} = {}", id_name(self, id), body)
        }
    }
}

fn id_name(func: &Function, id: InstId) -> String {
    match func.insts.get(id.index()).and_then(|d| d.name()) {
        Some(name) => format!("%{}", name),
        None => format!("{}", id),
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{} %{}", p.ty, p.name))
            .collect();
        let keyword = if self.is_declaration() { "declare" } else { "define" };
        write!(f, "{} {} @{}({})", keyword, self.ret_ty, self.name, params.join(", "))?;
        if self.is_declaration() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for (i, &b) in self.layout.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", self.blocks[b.index()].name())?;
            for &id in self.blocks[b.index()].instructions() {
                writeln!(f, "  {}", self.display_inst(id))?;
            }
        }
        writeln!(f, "}}")
    }
}
