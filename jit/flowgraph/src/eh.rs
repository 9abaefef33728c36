//! The exception region table.
//!
//! Each region consists of a protected `try` range and a handler range (plus an optional filter
//! that directly precedes the handler). Both ranges are contiguous in the layout. Regions are
//! ordered innermost first. The flow graph never creates or destroys regions; it only keeps
//! their first and last blocks current while blocks are moved or deleted.

use std::ops::Index;

use stdx::packed_option::PackedOption;
use typed_index_collections::TiVec;

use crate::{Block, BlockFlags, BlockGraph, EhIndex, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Catch,
    Filter,
    Finally,
    Fault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EhRegion {
    pub kind: HandlerKind,
    pub try_begin: Block,
    pub try_last: Block,
    pub hnd_begin: Block,
    pub hnd_last: Block,
    pub filter_begin: PackedOption<Block>,
    /// The innermost region whose try range contains this try range.
    pub enclosing_try: PackedOption<EhIndex>,
}

impl EhRegion {
    /// The first block of the handler, or of the filter if the region has one.
    pub fn handler_entry(&self) -> Block {
        self.filter_begin.unwrap_or(self.hnd_begin)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EhTable {
    regions: TiVec<EhIndex, EhRegion>,
}

impl Index<EhIndex> for EhTable {
    type Output = EhRegion;

    fn index(&self, index: EhIndex) -> &Self::Output {
        &self.regions[index]
    }
}

impl EhTable {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EhIndex, &EhRegion)> + '_ {
        self.regions.iter_enumerated()
    }

    pub fn is_try_begin(&self, block: Block) -> bool {
        self.regions.iter().any(|region| region.try_begin == block)
    }

    /// `block` is the first block of a handler or of a filter.
    pub fn is_handler_begin(&self, block: Block) -> bool {
        self.regions
            .iter()
            .any(|region| region.hnd_begin == block || region.filter_begin.is(block))
    }

    pub fn is_filter_begin(&self, block: Block) -> bool {
        self.regions.iter().any(|region| region.filter_begin.is(block))
    }

    /// Blocks that exceptional control flow enters: every filter and handler start.
    pub fn handler_entries(&self) -> impl Iterator<Item = Block> + '_ {
        self.regions
            .iter()
            .flat_map(|region| region.filter_begin.expand().into_iter().chain([region.hnd_begin]))
    }

    /// Shrinks every region that ends at `block` so it ends at `prev` instead.
    pub fn update_for_deleted_block(&mut self, block: Block, prev: Option<Block>) {
        for (idx, region) in self.regions.iter_mut_enumerated() {
            if region.try_last == block {
                debug_assert!(region.try_begin != block, "deleted the only block of {idx}");
                if let Some(prev) = prev {
                    region.try_last = prev;
                }
            }
            if region.hnd_last == block {
                debug_assert!(region.hnd_begin != block, "deleted the only block of {idx}");
                if let Some(prev) = prev {
                    region.hnd_last = prev;
                }
            }
        }
    }

    /// Every region that ended at `old_last` ends at `new_last` instead.
    pub fn update_last_blocks(&mut self, old_last: Block, new_last: Block) {
        for region in self.regions.iter_mut() {
            if region.try_last == old_last {
                region.try_last = new_last;
            }
            if region.hnd_last == old_last {
                region.hnd_last = new_last;
            }
        }
    }

    pub fn set_try_end(&mut self, region: EhIndex, last: Block) {
        self.regions[region].try_last = last;
    }

    pub fn set_hnd_end(&mut self, region: EhIndex, last: Block) {
        self.regions[region].hnd_last = last;
    }
}

impl<S: Statement> BlockGraph<S> {
    /// Adds a region to the exception table and records the membership of the blocks in its try
    /// and handler ranges. Regions must be added innermost first.
    pub fn add_eh_region(&mut self, mut region: EhRegion) -> EhIndex {
        let idx = EhIndex::from(self.eh.regions.len());

        let nested: Vec<EhIndex> = self
            .eh
            .regions
            .iter_enumerated()
            .filter(|(_, inner)| {
                let (first, last) = (region.try_begin, region.try_last);
                inner.enclosing_try.is_none()
                    && self.layout_range_contains(first, last, inner.try_begin)
            })
            .map(|(inner, _)| inner)
            .collect();
        for inner in nested {
            self.eh.regions[inner].enclosing_try = idx.into();
        }

        let mut cursor = Some(region.try_begin);
        while let Some(block) = cursor {
            if self[block].try_index.is_none() {
                self[block].try_index = idx.into();
            }
            if block == region.try_last {
                break;
            }
            cursor = self.next_block(block);
        }

        let mut cursor = Some(region.handler_entry());
        while let Some(block) = cursor {
            if self[block].hnd_index.is_none() {
                self[block].hnd_index = idx.into();
            }
            if block == region.hnd_last {
                break;
            }
            cursor = self.next_block(block);
        }

        self[region.try_begin].flags.insert(BlockFlags::DONT_REMOVE);
        self[region.hnd_begin].flags.insert(BlockFlags::DONT_REMOVE);
        if let Some(filter) = region.filter_begin.expand() {
            self[filter].flags.insert(BlockFlags::DONT_REMOVE);
        }

        region.enclosing_try = None.into();
        self.eh.regions.push(region);
        idx
    }

    fn layout_range_contains(&self, first: Block, last: Block, needle: Block) -> bool {
        let mut cursor = Some(first);
        while let Some(block) = cursor {
            if block == needle {
                return true;
            }
            if block == last {
                break;
            }
            cursor = self.next_block(block);
        }
        false
    }

    /// Both blocks are protected by the same try region (or by none).
    pub fn same_try_region(&self, a: Block, b: Block) -> bool {
        self[a].try_index == self[b].try_index
    }

    /// Both blocks are in the same try and handler region.
    pub fn same_eh_region(&self, a: Block, b: Block) -> bool {
        self[a].try_index == self[b].try_index && self[a].hnd_index == self[b].hnd_index
    }

    /// An empty block can be deleted without breaking the exception table: it must not begin a
    /// try, handler or filter range.
    pub fn can_delete_empty_block(&self, block: Block) -> bool {
        debug_assert!(self.is_empty(block));
        !self.eh.is_try_begin(block) && !self.eh.is_handler_begin(block)
    }

    /// Gives a freshly inserted block the region membership of `prev` and extends every region
    /// ending at `prev` to end at `block`.
    pub fn extend_eh_region_after(&mut self, prev: Block, block: Block) {
        self[block].try_index = self[prev].try_index;
        self[block].hnd_index = self[prev].hnd_index;
        let try_index = self[prev].try_index;
        let hnd_index = self[prev].hnd_index;
        if let Some(idx) = try_index.expand() {
            if self.eh.regions[idx].try_last == prev {
                self.update_enclosing_try_ends(idx, prev, block);
            }
        }
        if let Some(idx) = hnd_index.expand() {
            if self.eh.regions[idx].hnd_last == prev {
                self.eh.regions[idx].hnd_last = block;
            }
        }
    }

    fn update_enclosing_try_ends(&mut self, mut idx: EhIndex, old: Block, new: Block) {
        loop {
            let region = &mut self.eh.regions[idx];
            if region.try_last != old {
                break;
            }
            region.try_last = new;
            match region.enclosing_try.expand() {
                Some(outer) => idx = outer,
                None => break,
            }
        }
    }

    /// Gives a freshly inserted block the region membership of `next`. If `next` began a try
    /// range, the new block begins it instead.
    pub fn extend_eh_region_before(&mut self, next: Block, block: Block) {
        self[block].try_index = self[next].try_index;
        self[block].hnd_index = self[next].hnd_index;
        let mut moved = false;
        for region in self.eh.regions.iter_mut() {
            if region.try_begin == next {
                region.try_begin = block;
                moved = true;
            }
        }
        if moved {
            self[next].flags.remove(BlockFlags::DONT_REMOVE);
            self[block].flags.insert(BlockFlags::DONT_REMOVE);
        }
    }
}
