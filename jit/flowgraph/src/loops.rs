//! The loop table.
//!
//! Loops are discovered by a later analysis; the flow graph only keeps the block identities
//! recorded in the table current while blocks are compacted away or deleted.

use std::ops::Index;

use stdx::packed_option::PackedOption;
use typed_index_collections::TiVec;

use crate::{Block, LoopId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDesc {
    /// The block that precedes the loop (the pre-header if one exists).
    pub head: PackedOption<Block>,
    /// The first block of the loop in the layout.
    pub top: Block,
    /// The block control enters the loop through.
    pub entry: Block,
    /// The block containing the back edge.
    pub bottom: Block,
    /// The single exit of the loop, if it has exactly one.
    pub exit: PackedOption<Block>,
    pub removed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopTable {
    loops: TiVec<LoopId, LoopDesc>,
}

impl Index<LoopId> for LoopTable {
    type Output = LoopDesc;

    fn index(&self, index: LoopId) -> &Self::Output {
        &self.loops[index]
    }
}

impl LoopTable {
    pub fn push(&mut self, desc: LoopDesc) -> LoopId {
        self.loops.push_and_get_key(desc)
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LoopId, &LoopDesc)> + '_ {
        self.loops.iter_enumerated().filter(|(_, desc)| !desc.removed)
    }

    pub fn is_loop_entry(&self, block: Block) -> bool {
        self.iter().any(|(_, desc)| desc.entry == block)
    }

    /// `next` was compacted into `block`: every reference to `next` now refers to `block`.
    pub fn update_after_compacting(&mut self, block: Block, next: Block) {
        for desc in self.loops.iter_mut().filter(|desc| !desc.removed) {
            if desc.head.is(next) {
                desc.head = block.into();
            }
            if desc.bottom == next {
                desc.bottom = block;
            }
            if desc.exit.is(next) {
                desc.exit = block.into();
            }
            if desc.entry == next {
                desc.entry = block;
            }
            if desc.top == next {
                desc.top = block;
            }
        }
    }

    /// `block` was split and `new` took over its jump.
    pub fn update_after_split(&mut self, block: Block, new: Block) {
        for desc in self.loops.iter_mut().filter(|desc| !desc.removed) {
            if desc.bottom == block {
                desc.bottom = new;
            }
            if desc.exit.is(block) {
                desc.exit = new.into();
            }
        }
    }

    /// `block` is about to be deleted. `succ` is the block that takes its place when an empty
    /// block is removed, `None` when `block` is unreachable.
    ///
    /// Loops that lose their entry, top or bottom no longer describe a loop and are marked
    /// removed.
    pub fn update_before_remove_block(&mut self, block: Block, succ: Option<Block>) {
        for desc in self.loops.iter_mut().filter(|desc| !desc.removed) {
            if desc.entry == block || desc.top == block || desc.bottom == block {
                match succ {
                    Some(succ)
                        if desc.top == block && desc.entry != block && desc.bottom != block =>
                    {
                        desc.top = succ
                    }
                    _ => {
                        desc.removed = true;
                        continue;
                    }
                }
            }
            if desc.head.is(block) {
                desc.head = None.into();
            }
            if desc.exit.is(block) {
                desc.exit = succ.into();
            }
        }
    }
}
