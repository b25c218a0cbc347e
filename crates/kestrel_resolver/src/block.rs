//! Control blocks.
//!
//! Loops and other labeled constructs open a block. Forward jumps emitted
//! before their target is known are recorded as [`PatchSite`]s on the block
//! they leave, and fixed up by the code generator once the block's exits are
//! placed.

use kestrel_core::Atom;
use serde::{Deserialize, Serialize};

/// Index of a block within its scope's [`BlockTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An instruction operand waiting for a jump target. Opaque to the
/// resolver; the code generator decides what the number addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchSite(pub u32);

/// Which list of a block a patch site belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// `next`: jump to the loop condition.
    Next,
    /// `redo`: jump to the start of the loop body.
    Redo,
    /// `break`: jump past the block.
    Break,
    /// Generic continuation point after the block.
    Continuation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlBlock {
    pub label: Option<Atom>,
    pub parent: Option<BlockId>,
    pub nested: Vec<BlockId>,
    pub nexts: Vec<PatchSite>,
    pub redos: Vec<PatchSite>,
    pub breaks: Vec<PatchSite>,
    pub continuations: Vec<PatchSite>,
    pub tries_entered: u32,
}

impl ControlBlock {
    fn new(label: Option<Atom>, parent: Option<BlockId>) -> Self {
        Self {
            label,
            parent,
            ..Self::default()
        }
    }

    pub fn add_patch(&mut self, kind: PatchKind, site: PatchSite) {
        self.patches_mut(kind).push(site);
    }

    pub fn patches(&self, kind: PatchKind) -> &[PatchSite] {
        match kind {
            PatchKind::Next => &self.nexts,
            PatchKind::Redo => &self.redos,
            PatchKind::Break => &self.breaks,
            PatchKind::Continuation => &self.continuations,
        }
    }

    /// Hand the pending sites of one list to the caller for patching.
    pub fn take_patches(&mut self, kind: PatchKind) -> Vec<PatchSite> {
        std::mem::take(self.patches_mut(kind))
    }

    fn patches_mut(&mut self, kind: PatchKind) -> &mut Vec<PatchSite> {
        match kind {
            PatchKind::Next => &mut self.nexts,
            PatchKind::Redo => &mut self.redos,
            PatchKind::Break => &mut self.breaks,
            PatchKind::Continuation => &mut self.continuations,
        }
    }
}

/// Every block declared in one scope, with a cursor on the innermost open
/// block. Blocks are kept after they are left so their patch lists and
/// nesting survive for export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockTree {
    blocks: Vec<ControlBlock>,
    roots: Vec<BlockId>,
    current: Option<BlockId>,
}

impl BlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a block nested in the current one, or a root block when none is
    /// open.
    pub fn enter(&mut self, label: Option<Atom>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(ControlBlock::new(label, self.current));
        match self.current {
            Some(parent) => self.blocks[parent.index()].nested.push(id),
            None => self.roots.push(id),
        }
        self.current = Some(id);
        id
    }

    /// Close the current block and return to its parent.
    ///
    /// # Panics
    ///
    /// Panics if no block is open or if the block still has a try region
    /// open. Both mean the caller emitted unbalanced enter/leave calls.
    pub fn leave(&mut self) -> BlockId {
        let Some(id) = self.current else {
            panic!("leave_block called with no open block");
        };
        let block = &self.blocks[id.index()];
        if block.tries_entered > 0 {
            panic!(
                "leaving block {} with {} try region(s) still open",
                id.0, block.tries_entered
            );
        }
        self.current = block.parent;
        id
    }

    pub fn current(&self) -> Option<BlockId> {
        self.current
    }

    pub fn get(&self, id: BlockId) -> Option<&ControlBlock> {
        self.blocks.get(id.index())
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut ControlBlock> {
        self.blocks.get_mut(id.index())
    }

    /// The innermost open block carrying `label`, or the current block when
    /// no label is given.
    pub fn find(&self, label: Option<Atom>) -> Option<BlockId> {
        let Some(label) = label else {
            return self.current;
        };
        let mut cursor = self.current;
        while let Some(id) = cursor {
            let block = &self.blocks[id.index()];
            if block.label == Some(label) {
                return Some(id);
            }
            cursor = block.parent;
        }
        None
    }

    pub(crate) fn enter_try(&mut self) {
        if let Some(id) = self.current {
            self.blocks[id.index()].tries_entered += 1;
        }
    }

    pub(crate) fn leave_try(&mut self) {
        if let Some(id) = self.current {
            let block = &mut self.blocks[id.index()];
            assert!(block.tries_entered > 0, "left a try region that was never entered in this block");
            block.tries_entered -= 1;
        }
    }

    pub fn roots(&self) -> &[BlockId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &ControlBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, block)| (BlockId(i as u32), block))
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        let in_range = |id: &BlockId| id.index() < self.blocks.len();
        self.roots.iter().all(in_range)
            && self.current.as_ref().map_or(true, in_range)
            && self
                .blocks
                .iter()
                .all(|b| b.nested.iter().all(in_range) && b.parent.as_ref().map_or(true, in_range))
    }
}
