//! The block graph.
//!
//! Blocks live in an arena indexed by [`Block`]. The lexical order of the blocks (the *layout*)
//! is a doubly linked list threaded through the arena. Successors are derived from the jump kind
//! of a block (and for conditionals from the layout), predecessors are stored explicitly on the
//! target as [`FlowEdge`]s. All structural changes must go through the methods here so that both
//! views stay in sync.

use std::mem;
use std::ops::{Index, IndexMut};

use smallvec::SmallVec;
use stdx::packed_option::PackedOption;
use typed_index_collections::TiVec;

use crate::weight::{add_weights, sub_weights};
use crate::{
    Block, BlockFlags, EhIndex, EhTable, JumpKind, LoopId, LoopTable, Statement, Weight,
    MAX_WEIGHT, UNITY_WEIGHT, ZERO_WEIGHT,
};

#[cfg(test)]
mod tests;

/// A predecessor record stored on the target block.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEdge {
    pub source: Block,
    /// Number of references from `source` (switch cases or both arms of a conditional).
    pub dup_count: u32,
    pub weight_min: Weight,
    pub weight_max: Weight,
}

impl FlowEdge {
    pub fn set_weights(&mut self, min: Weight, max: Weight) {
        debug_assert!(min <= max);
        self.weight_min = min;
        self.weight_max = max;
    }
}

#[derive(Debug, Clone)]
pub struct BlockData<S> {
    /// Dense number of the block, only meaningful while the graph is numbered.
    pub num: u32,
    pub jump: JumpKind,
    pub stmts: Vec<S>,
    pub flags: BlockFlags,
    pub weight: Weight,
    /// Innermost try region protecting the block.
    pub try_index: PackedOption<EhIndex>,
    /// Innermost handler (or filter) region containing the block.
    pub hnd_index: PackedOption<EhIndex>,
    pub loop_num: PackedOption<LoopId>,
    preds: Vec<FlowEdge>,
    ref_count: u32,
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
}

impl<S> BlockData<S> {
    fn new(jump: JumpKind) -> BlockData<S> {
        BlockData {
            num: 0,
            jump,
            stmts: Vec::new(),
            flags: BlockFlags::empty(),
            weight: UNITY_WEIGHT,
            try_index: None.into(),
            hnd_index: None.into(),
            loop_num: None.into(),
            preds: Vec::new(),
            ref_count: 0,
            prev: None.into(),
            next: None.into(),
        }
    }

    pub fn preds(&self) -> &[FlowEdge] {
        &self.preds
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn is_run_rarely(&self) -> bool {
        self.flags.is_run_rarely()
    }

    pub fn has_profile_weight(&self) -> bool {
        self.flags.has_profile_weight()
    }

    pub fn has_try_index(&self) -> bool {
        self.try_index.is_some()
    }

    pub fn has_hnd_index(&self) -> bool {
        self.hnd_index.is_some()
    }
}

/// The control flow graph of a single function.
#[derive(Debug, Clone)]
pub struct BlockGraph<S> {
    blocks: TiVec<Block, BlockData<S>>,
    first: PackedOption<Block>,
    last: PackedOption<Block>,
    block_count: u32,
    max_num: u32,
    numbered: bool,
    /// Incremented by every change to the edges or the layout. Analyses remember the epoch
    /// they were computed for.
    epoch: u32,

    pub eh: EhTable,
    pub loops: LoopTable,
    /// An `Always` block at the start of the function that must stay in place.
    pub scratch: PackedOption<Block>,
    /// The single return block all returns are merged into (if the function has one).
    pub return_block: PackedOption<Block>,
    /// First block of the cold section, `None` if the function is not split.
    pub first_cold: PackedOption<Block>,
    /// The edge weights were computed from profile data and are kept current.
    pub have_valid_edge_weights: bool,
    /// Block weights come from profile data.
    pub using_profile_weights: bool,
}

impl<S> Default for BlockGraph<S> {
    fn default() -> Self {
        BlockGraph {
            blocks: TiVec::new(),
            first: None.into(),
            last: None.into(),
            block_count: 0,
            max_num: 0,
            numbered: false,
            epoch: 0,
            eh: EhTable::default(),
            loops: LoopTable::default(),
            scratch: None.into(),
            return_block: None.into(),
            first_cold: None.into(),
            have_valid_edge_weights: false,
            using_profile_weights: false,
        }
    }
}

impl<S> Index<Block> for BlockGraph<S> {
    type Output = BlockData<S>;

    #[inline]
    fn index(&self, block: Block) -> &Self::Output {
        &self.blocks[block]
    }
}

impl<S> IndexMut<Block> for BlockGraph<S> {
    #[inline]
    fn index_mut(&mut self, block: Block) -> &mut Self::Output {
        &mut self.blocks[block]
    }
}

/// Iterates the blocks in layout order.
pub struct Blocks<'a, S> {
    graph: &'a BlockGraph<S>,
    next: Option<Block>,
}

impl<S> Iterator for Blocks<'_, S> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.next?;
        self.next = self.graph.blocks[block].next.expand();
        Some(block)
    }
}

/// A position in the layout that stays usable while the graph is mutated: the cursor only
/// remembers a block and looks up its neighbours when it moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCursor {
    current: Option<Block>,
}

impl BlockCursor {
    pub fn at(block: Option<Block>) -> BlockCursor {
        BlockCursor { current: block }
    }

    pub fn at_first<S>(graph: &BlockGraph<S>) -> BlockCursor {
        BlockCursor { current: graph.first.expand() }
    }

    pub fn current(&self) -> Option<Block> {
        self.current
    }

    /// Moves to the next block in the layout and returns it.
    pub fn advance<S>(&mut self, graph: &BlockGraph<S>) -> Option<Block> {
        self.current = self.current.and_then(|block| graph.next_block(block));
        self.current
    }
}

/// Layout and bookkeeping.
impl<S> BlockGraph<S> {
    pub fn new() -> BlockGraph<S> {
        BlockGraph::default()
    }

    /// Allocates a block that is not yet part of the layout.
    pub fn create_block(&mut self, jump: JumpKind) -> Block {
        self.blocks.push_and_get_key(BlockData::new(jump))
    }

    pub fn first_block(&self) -> Option<Block> {
        self.first.expand()
    }

    pub fn last_block(&self) -> Option<Block> {
        self.last.expand()
    }

    #[inline]
    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }

    #[inline]
    pub fn prev_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].prev.expand()
    }

    pub fn is_first(&self, block: Block) -> bool {
        self.first.is(block)
    }

    pub fn is_last(&self, block: Block) -> bool {
        self.last.is(block)
    }

    pub fn next_is(&self, block: Block, other: Block) -> bool {
        self.blocks[block].next.is(other)
    }

    pub fn blocks(&self) -> Blocks<'_, S> {
        Blocks { graph: self, next: self.first.expand() }
    }

    /// Number of blocks in the layout.
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Number of block ids ever allocated, including removed blocks.
    pub fn arena_len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_in_layout(&self, block: Block) -> bool {
        self.first.is(block) || self.blocks[block].prev.is_some()
    }

    pub fn is_numbered(&self) -> bool {
        self.numbered
    }

    /// The highest block number handed out so far.
    pub fn max_num(&self) -> u32 {
        self.max_num
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Records a change of the flow edges.
    pub fn invalidate_flow(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Records a change of the layout: the block numbers are stale until [`Self::renumber`].
    pub fn invalidate_numbering(&mut self) {
        self.numbered = false;
        self.invalidate_flow();
    }

    /// Reassigns dense numbers `1..=N` in layout order. Returns whether any number changed.
    pub fn renumber(&mut self) -> bool {
        let mut changed = false;
        let mut num = 0;
        let mut cursor = self.first.expand();
        while let Some(block) = cursor {
            num += 1;
            let data = &mut self.blocks[block];
            if data.num != num {
                data.num = num;
                changed = true;
            }
            cursor = data.next.expand();
        }
        debug_assert_eq!(num, self.block_count);
        if self.max_num != num {
            changed = true;
        }
        self.max_num = num;
        self.numbered = true;
        if changed {
            self.invalidate_flow();
        }
        changed
    }

    fn assign_fresh_num(&mut self, block: Block) {
        self.max_num += 1;
        self.blocks[block].num = self.max_num;
    }

    /// Inserts `block` as the last block of the layout.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(!self.is_in_layout(block), "{block} is already part of the layout");
        let data = &mut self.blocks[block];
        data.prev = self.last;
        data.next = None.into();
        match self.last.expand() {
            Some(last) => self.blocks[last].next = block.into(),
            None => self.first = block.into(),
        }
        self.last = block.into();
        self.block_count += 1;
        self.assign_fresh_num(block);
        self.invalidate_numbering();
    }

    /// Inserts `block` into the layout directly after `after`.
    pub fn insert_block_after(&mut self, block: Block, after: Block) {
        debug_assert!(!self.is_in_layout(block), "{block} is already part of the layout");
        debug_assert!(self.is_in_layout(after), "{after} is not part of the layout");
        let next = self.blocks[after].next;
        self.blocks[block].prev = after.into();
        self.blocks[block].next = next;
        self.blocks[after].next = block.into();
        match next.expand() {
            Some(next) => self.blocks[next].prev = block.into(),
            None => self.last = block.into(),
        }
        self.block_count += 1;
        self.assign_fresh_num(block);
        self.invalidate_numbering();
    }

    /// Inserts `block` into the layout directly before `before`.
    pub fn insert_block_before(&mut self, block: Block, before: Block) {
        debug_assert!(!self.is_in_layout(block), "{block} is already part of the layout");
        debug_assert!(self.is_in_layout(before), "{before} is not part of the layout");
        let prev = self.blocks[before].prev;
        self.blocks[block].next = before.into();
        self.blocks[block].prev = prev;
        self.blocks[before].prev = block.into();
        match prev.expand() {
            Some(prev) => self.blocks[prev].next = block.into(),
            None => self.first = block.into(),
        }
        self.block_count += 1;
        self.assign_fresh_num(block);
        self.invalidate_numbering();
    }

    /// Removes the range `first..=last` from the layout without touching any edges.
    pub fn unlink_range(&mut self, first: Block, last: Block) {
        let prev = self.blocks[first].prev;
        let next = self.blocks[last].next;
        match prev.expand() {
            Some(prev) => self.blocks[prev].next = next,
            None => self.first = next,
        }
        match next.expand() {
            Some(next) => self.blocks[next].prev = prev,
            None => self.last = prev,
        }
        self.blocks[first].prev = None.into();
        self.blocks[last].next = None.into();

        let mut cursor = Some(first);
        while let Some(block) = cursor {
            self.block_count -= 1;
            if block == last {
                break;
            }
            cursor = self.next_block(block);
        }
        self.invalidate_numbering();
    }

    /// Removes `block` from the layout without touching any edges.
    pub fn unlink(&mut self, block: Block) {
        self.unlink_range(block, block)
    }

    /// Links an unlinked chain `first..=last` back into the layout after `after`.
    fn insert_range_after(&mut self, first: Block, last: Block, after: Block) {
        let next = self.blocks[after].next;
        self.blocks[after].next = first.into();
        self.blocks[first].prev = after.into();
        self.blocks[last].next = next;
        match next.expand() {
            Some(next) => self.blocks[next].prev = last.into(),
            None => self.last = last.into(),
        }
        let mut cursor = Some(first);
        while let Some(block) = cursor {
            self.block_count += 1;
            if block == last {
                break;
            }
            cursor = self.next_block(block);
        }
        self.invalidate_numbering();
    }

    /// Moves the range `first..=last` so that it directly follows `after`. `after` must not be
    /// part of the range. Edges are not updated: conditionals whose lexical successor changed
    /// must be fixed with [`BlockGraph::connect_fall_through`].
    pub fn move_range_after(&mut self, first: Block, last: Block, after: Block) {
        debug_assert!(first != after && last != after);
        self.unlink_range(first, last);
        self.insert_range_after(first, last, after);
    }

    /// The block is part of the cold section.
    pub fn is_cold(&self, block: Block) -> bool {
        let Some(first_cold) = self.first_cold.expand() else { return false };
        let mut cursor = Some(first_cold);
        while let Some(cold) = cursor {
            if cold == block {
                return true;
            }
            cursor = self.next_block(cold);
        }
        false
    }

    /// One block is hot and the other is cold.
    pub fn in_different_sections(&self, a: Block, b: Block) -> bool {
        self.first_cold.is_some() && self.is_cold(a) != self.is_cold(b)
    }

    pub fn is_scratch(&self, block: Block) -> bool {
        self.scratch.is(block)
    }
}

/// Successors and predecessors.
impl<S> BlockGraph<S> {
    /// The distinct successors of `block`.
    pub fn successors(&self, block: Block) -> SmallVec<[Block; 4]> {
        let data = &self.blocks[block];
        match &data.jump {
            JumpKind::Cond(target) => {
                let mut res = SmallVec::new();
                if let Some(next) = data.next.expand() {
                    res.push(next);
                }
                if !res.contains(target) {
                    res.push(*target)
                }
                res
            }
            JumpKind::Switch(table) => table.unique_targets(),
            JumpKind::HandlerReturn(conts) => {
                let mut res = SmallVec::new();
                for &cont in conts {
                    if !res.contains(&cont) {
                        res.push(cont)
                    }
                }
                res
            }
            jump => jump.target().into_iter().collect(),
        }
    }

    /// Every reference `block` makes to another block, one entry per reference. A conditional
    /// whose target is also its lexical successor appears twice.
    pub fn jump_refs(&self, block: Block) -> SmallVec<[Block; 4]> {
        let data = &self.blocks[block];
        let mut refs = data.jump.explicit_targets();
        if data.jump.is_cond() {
            if let Some(next) = data.next.expand() {
                refs.push(next)
            }
        }
        refs
    }

    /// The unique successor of an `Always` block.
    pub fn unique_succ(&self, block: Block) -> Option<Block> {
        match self.blocks[block].jump {
            JumpKind::Always(target) => Some(target),
            _ => None,
        }
    }

    /// The unique predecessor of `block`: all in-edges come from the same block.
    pub fn unique_pred(&self, block: Block) -> Option<Block> {
        match self.blocks[block].preds.as_slice() {
            [edge] => Some(edge.source),
            _ => None,
        }
    }

    /// The distinct predecessors of `block`.
    pub fn pred_blocks(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.blocks[block].preds.iter().map(|edge| edge.source)
    }

    pub fn preds(&self, block: Block) -> &[FlowEdge] {
        &self.blocks[block].preds
    }

    pub fn pred_edge(&self, target: Block, source: Block) -> Option<&FlowEdge> {
        self.blocks[target].preds.iter().find(|edge| edge.source == source)
    }

    pub fn pred_edge_mut(&mut self, target: Block, source: Block) -> Option<&mut FlowEdge> {
        self.blocks[target].preds.iter_mut().find(|edge| edge.source == source)
    }

    /// References to `block`: in-edges counted with their duplicity plus the implicit references
    /// of the function entry and of handler and filter starts.
    pub fn ref_count(&self, block: Block) -> u32 {
        self.blocks[block].ref_count
    }

    /// `block` is a conditional whose target is its lexical successor, or an `Always` block that
    /// jumps to its lexical successor.
    pub fn jumps_to_next(&self, block: Block) -> bool {
        let data = &self.blocks[block];
        match data.jump {
            JumpKind::Always(target) | JumpKind::Cond(target) => data.next.is(target),
            _ => false,
        }
    }

    /// The first half of a call-handler pair: a `CallHandler` followed by its continuation.
    pub fn is_call_handler_pair_head(&self, block: Block) -> bool {
        if !self.blocks[block].jump.is_call_handler() {
            return false;
        }
        match self.next_block(block) {
            Some(next) => {
                let next = &self.blocks[next];
                next.jump.is_always() && next.flags.contains(BlockFlags::KEEP_ALWAYS)
            }
            None => false,
        }
    }

    /// The continuation half of a call-handler pair.
    pub fn is_call_handler_pair_tail(&self, block: Block) -> bool {
        match self.prev_block(block) {
            Some(prev) => self.is_call_handler_pair_head(prev),
            None => false,
        }
    }

    /// Control can reach the lexical successor without an explicit jump.
    pub fn falls_through(&self, block: Block) -> bool {
        match self.blocks[block].jump {
            JumpKind::Cond(_) => true,
            JumpKind::CallHandler(_) => self.is_call_handler_pair_head(block),
            _ => false,
        }
    }

    /// Weights of a new edge `source -> target`.
    fn new_edge_weights(&self, target: Block, source: Block) -> (Weight, Weight) {
        if self.have_valid_edge_weights {
            let source_weight = self.blocks[source].weight;
            if self.successors(source).len() == 1 {
                (source_weight, source_weight)
            } else {
                (ZERO_WEIGHT, source_weight.min(self.blocks[target].weight))
            }
        } else {
            (ZERO_WEIGHT, MAX_WEIGHT)
        }
    }

    /// Records one more reference from `source` to `target`.
    pub fn add_ref_pred(&mut self, target: Block, source: Block) -> &mut FlowEdge {
        self.invalidate_flow();
        self.blocks[target].ref_count += 1;
        let pos = self.blocks[target].preds.iter().position(|edge| edge.source == source);
        let pos = match pos {
            Some(pos) => {
                self.blocks[target].preds[pos].dup_count += 1;
                pos
            }
            None => {
                let (weight_min, weight_max) = self.new_edge_weights(target, source);
                let preds = &mut self.blocks[target].preds;
                preds.push(FlowEdge { source, dup_count: 1, weight_min, weight_max });
                preds.len() - 1
            }
        };
        &mut self.blocks[target].preds[pos]
    }

    /// Adds `dup_count` references from `source` to `target` carrying the given weights. Weights
    /// are summed if the edge already exists.
    fn add_pred_edge(&mut self, target: Block, mut edge: FlowEdge) {
        self.invalidate_flow();
        let data = &mut self.blocks[target];
        data.ref_count += edge.dup_count;
        if let Some(existing) = data.preds.iter_mut().find(|it| it.source == edge.source) {
            existing.dup_count += edge.dup_count;
            existing.weight_min = add_weights(existing.weight_min, edge.weight_min);
            existing.weight_max = add_weights(existing.weight_max, edge.weight_max);
        } else {
            edge.weight_max = edge.weight_max.min(MAX_WEIGHT);
            data.preds.push(edge);
        }
    }

    /// Removes one reference from `source` to `target`. Returns the edge once its last reference
    /// is gone.
    pub fn remove_ref_pred(&mut self, target: Block, source: Block) -> Option<FlowEdge> {
        self.invalidate_flow();
        let data = &mut self.blocks[target];
        let pos = data.preds.iter().position(|edge| edge.source == source);
        let Some(pos) = pos else {
            debug_assert!(false, "{source} is not a predecessor of {target}");
            return None;
        };
        debug_assert!(data.ref_count > 0);
        data.ref_count -= 1;
        let edge = &mut data.preds[pos];
        edge.dup_count -= 1;
        if edge.dup_count == 0 {
            Some(data.preds.remove(pos))
        } else {
            None
        }
    }

    /// Removes every reference from `source` to `target`.
    pub fn remove_all_pred_edges(&mut self, target: Block, source: Block) -> Option<FlowEdge> {
        self.invalidate_flow();
        let data = &mut self.blocks[target];
        let pos = data.preds.iter().position(|edge| edge.source == source)?;
        let edge = data.preds.remove(pos);
        debug_assert!(data.ref_count >= edge.dup_count);
        data.ref_count -= edge.dup_count;
        Some(edge)
    }

    /// The edge `old -> target` now starts at `new`.
    pub fn replace_pred(&mut self, target: Block, old: Block, new: Block) {
        self.invalidate_flow();
        let Some(mut edge) = self.remove_all_pred_edges(target, old) else {
            debug_assert!(false, "{old} is not a predecessor of {target}");
            return;
        };
        edge.source = new;
        self.add_pred_edge(target, edge);
    }

    /// Redirects every explicit reference `pred` makes to `old` so that it refers to `new`. The
    /// moved references take the proportional share of the edge weight with them.
    ///
    /// The lexical fall-through arm of a conditional is not an explicit reference and is left
    /// alone.
    pub fn redirect_edge(&mut self, pred: Block, old: Block, new: Block) {
        if old == new {
            return;
        }
        let moved = self.blocks[pred].jump.replace_target(old, new);
        if moved == 0 {
            return;
        }
        self.move_refs(pred, old, new, moved);
    }

    /// Switch specific [`Self::redirect_edge`].
    pub fn replace_switch_target(&mut self, block: Block, new: Block, old: Block) {
        debug_assert!(self.blocks[block].jump.is_switch());
        self.redirect_edge(block, old, new)
    }

    fn move_refs(&mut self, source: Block, old: Block, new: Block, count: u32) {
        let Some(edge) = self.pred_edge_mut(old, source) else {
            debug_assert!(false, "{source} is not a predecessor of {old}");
            return;
        };
        debug_assert!(edge.dup_count >= count);
        let fraction = count as Weight / edge.dup_count as Weight;
        let moved_min = edge.weight_min * fraction;
        let moved_max = edge.weight_max * fraction;
        if edge.dup_count == count {
            self.remove_all_pred_edges(old, source);
        } else {
            edge.dup_count -= count;
            edge.weight_min = sub_weights(edge.weight_min, moved_min);
            edge.weight_max = sub_weights(edge.weight_max, moved_max);
            self.blocks[old].ref_count -= count;
        }
        self.add_pred_edge(
            new,
            FlowEdge { source, dup_count: count, weight_min: moved_min, weight_max: moved_max },
        );
    }

    /// Removes the references of `block`'s jump from its successors.
    pub fn remove_block_as_pred(&mut self, block: Block) {
        for target in self.jump_refs(block) {
            self.remove_ref_pred(target, block);
        }
    }

    /// Drops the continuation `cont` from the handler return `block`.
    pub fn remove_handler_continuation(&mut self, block: Block, cont: Block) {
        if let JumpKind::HandlerReturn(conts) = &mut self.blocks[block].jump {
            let before = conts.len();
            conts.retain(|it| *it != cont);
            for _ in conts.len()..before {
                self.remove_ref_pred(cont, block);
            }
        }
    }

    /// Number of implicit references: the function entry and handler and filter starts are
    /// entered without an explicit jump.
    pub fn implicit_refs(&self, block: Block) -> u32 {
        let mut refs = u32::from(self.first.is(block));
        refs += self.eh.handler_entries().filter(|&entry| entry == block).count() as u32;
        refs
    }

    /// Rebuilds all predecessor lists and reference counts from the jump kinds.
    pub fn compute_preds(&mut self) {
        let blocks: Vec<Block> = self.blocks().collect();
        for &block in &blocks {
            self.blocks[block].preds.clear();
            self.blocks[block].ref_count = 0;
        }
        for &block in &blocks {
            for target in self.jump_refs(block) {
                self.add_ref_pred(target, block);
            }
        }
        for &block in &blocks {
            let implicit = self.implicit_refs(block);
            self.blocks[block].ref_count += implicit;
        }
    }
}

/// Weights.
impl<S> BlockGraph<S> {
    pub fn set_run_rarely(&mut self, block: Block) {
        let data = &mut self.blocks[block];
        data.weight = ZERO_WEIGHT;
        data.flags.insert(BlockFlags::RUN_RARELY);
    }

    pub fn set_profile_weight(&mut self, block: Block, weight: Weight) {
        let data = &mut self.blocks[block];
        data.weight = weight;
        data.flags.insert(BlockFlags::PROF_WEIGHT);
        data.flags.set(BlockFlags::RUN_RARELY, weight == ZERO_WEIGHT);
    }

    /// Copies the weight (and its provenance) of `from`.
    pub fn inherit_weight(&mut self, block: Block, from: Block) {
        self.inherit_weight_percentage(block, from, 100)
    }

    pub fn inherit_weight_percentage(&mut self, block: Block, from: Block, percentage: u32) {
        let from = &self.blocks[from];
        let weight = from.weight * percentage as Weight / 100.0;
        let inherited = from.flags & (BlockFlags::PROF_WEIGHT | BlockFlags::RUN_RARELY);
        let data = &mut self.blocks[block];
        data.weight = weight;
        data.flags.remove(BlockFlags::PROF_WEIGHT | BlockFlags::RUN_RARELY);
        data.flags.insert(inherited);
        if weight == ZERO_WEIGHT {
            data.flags.insert(BlockFlags::RUN_RARELY);
        }
    }
}

/// Structural changes.
impl<S: Statement> BlockGraph<S> {
    /// All statements of the block are no-ops.
    pub fn is_empty(&self, block: Block) -> bool {
        self.blocks[block].stmts.iter().all(|stmt| stmt.is_nop())
    }

    /// The last statement of the block is the test, switch value or return value consumed by
    /// the jump.
    pub fn has_terminator(&self, block: Block) -> bool {
        let data = &self.blocks[block];
        matches!(
            data.jump,
            JumpKind::Cond(_) | JumpKind::Switch(_) | JumpKind::Return | JumpKind::FilterReturn(_)
        ) && data.stmts.last().map_or(false, |stmt| stmt.is_terminator())
    }

    pub fn first_non_nop_stmt(&self, block: Block) -> Option<usize> {
        self.blocks[block].stmts.iter().position(|stmt| !stmt.is_nop())
    }

    pub fn last_non_nop_stmt(&self, block: Block) -> Option<usize> {
        self.blocks[block].stmts.iter().rposition(|stmt| !stmt.is_nop())
    }

    pub fn insert_stmt_at_beginning(&mut self, block: Block, stmt: S) {
        self.blocks[block].stmts.insert(0, stmt)
    }

    pub fn insert_stmt_at_end(&mut self, block: Block, stmt: S) {
        self.blocks[block].stmts.push(stmt)
    }

    /// Appends `stmt`, but keeps a terminator statement last.
    pub fn insert_stmt_near_end(&mut self, block: Block, stmt: S) {
        if self.has_terminator(block) {
            let pos = self.blocks[block].stmts.len() - 1;
            self.blocks[block].stmts.insert(pos, stmt)
        } else {
            self.blocks[block].stmts.push(stmt)
        }
    }

    pub fn unlink_stmt(&mut self, block: Block, index: usize) -> S {
        self.blocks[block].stmts.remove(index)
    }

    /// Creates a block with the given jump after `after` and adds the edges of the jump. With
    /// `extend_region` the block joins the EH regions of `after`.
    pub fn new_block_after(&mut self, jump: JumpKind, after: Block, extend_region: bool) -> Block {
        let block = self.create_block(jump);
        self.blocks[block].flags = BlockFlags::INTERNAL;
        self.insert_block_after(block, after);
        if extend_region {
            self.extend_eh_region_after(after, block);
        }
        for target in self.jump_refs(block) {
            self.add_ref_pred(target, block);
        }
        block
    }

    /// Creates a block with the given jump before `before` and adds the edges of the jump. With
    /// `extend_region` the block joins the EH regions of `before`.
    pub fn new_block_before(
        &mut self,
        jump: JumpKind,
        before: Block,
        extend_region: bool,
    ) -> Block {
        let block = self.create_block(jump);
        self.blocks[block].flags = BlockFlags::INTERNAL;
        let was_first = self.first.is(before);
        self.insert_block_before(block, before);
        if extend_region {
            self.extend_eh_region_before(before, block);
        }
        if was_first {
            self.blocks[before].ref_count -= 1;
            self.blocks[block].ref_count += 1;
        }
        // conditionals in front of `before` now fall into `block`
        if let Some(prev) = self.prev_block(block) {
            if self.blocks[prev].jump.is_cond() {
                self.remove_ref_pred(before, prev);
                self.add_ref_pred(block, prev);
            }
        }
        for target in self.jump_refs(block) {
            self.add_ref_pred(target, block);
        }
        block
    }

    /// Splits `block` before the statement at `index`. The new downstream block receives the
    /// remaining statements and the jump of `block`, which becomes an `Always` jump to it.
    pub fn split_at(&mut self, block: Block, index: usize) -> Block {
        let tail = self.blocks[block].stmts.split_off(index);
        let jump = mem::replace(&mut self.blocks[block].jump, JumpKind::Throw);
        let new = self.create_block(jump);
        {
            let flags = self.blocks[block].flags;
            let weight = self.blocks[block].weight;
            let loop_num = self.blocks[block].loop_num;
            let data = &mut self.blocks[new];
            data.stmts = tail;
            data.flags = flags - BlockFlags::SPLIT_LOST;
            data.weight = weight;
            data.loop_num = loop_num;
            self.blocks[block].flags.remove(BlockFlags::SPLIT_GAINED);
        }
        self.insert_block_after(new, block);
        self.extend_eh_region_after(block, new);

        for succ in self.successors(new) {
            self.replace_pred(succ, block, new);
        }

        self.blocks[block].jump = JumpKind::Always(new);
        self.add_ref_pred(new, block);
        self.loops.update_after_split(block, new);
        log::trace!("split {block} at {index} into {new}");
        new
    }

    /// Splits `block` after the statement at `index`.
    pub fn split_after_statement(&mut self, block: Block, index: usize) -> Block {
        self.split_at(block, index + 1)
    }

    /// Splits off an empty downstream block that takes over the jump of `block`.
    pub fn split_at_end(&mut self, block: Block) -> Block {
        let len = self.blocks[block].stmts.len();
        self.split_at(block, len)
    }

    /// `src` used to fall through into `dst`, but the layout changed. If `src` is a conditional
    /// that no longer falls into `dst` an `Always` block jumping to `dst` is inserted after it.
    pub fn connect_fall_through(&mut self, src: Block, dst: Block) -> Option<Block> {
        if !self.blocks[src].jump.is_cond() || self.next_is(src, dst) {
            return None;
        }
        let (weight, inherited) = match self.pred_edge(dst, src) {
            Some(edge) if self.have_valid_edge_weights => {
                ((edge.weight_min + edge.weight_max) / 2.0, BlockFlags::PROF_WEIGHT)
            }
            _ => (self.blocks[src].weight, self.blocks[src].flags & BlockFlags::PROF_WEIGHT),
        };
        self.remove_ref_pred(dst, src);
        let jmp = self.new_block_after(JumpKind::Always(dst), src, true);
        self.add_ref_pred(jmp, src);
        let data = &mut self.blocks[jmp];
        data.weight = weight;
        data.flags.insert(inherited);
        if weight == ZERO_WEIGHT {
            data.flags.insert(BlockFlags::RUN_RARELY);
        }
        log::debug!("added {jmp} to connect {src} with its former successor {dst}");
        Some(jmp)
    }

    /// Drops the statements and outgoing edges of an unreachable block and marks it removed. The
    /// block stays in the layout until [`Self::remove_block`] unlinks it.
    pub fn unreachable_block(&mut self, block: Block) {
        if self.blocks[block].flags.is_removed() {
            return;
        }
        debug_assert!(!self.first.is(block), "can not remove the first block");
        debug_assert!(!self.return_block.is(block), "can not remove the return block");
        self.blocks[block].stmts.clear();
        self.loops.update_before_remove_block(block, None);
        self.blocks[block].flags.insert(BlockFlags::REMOVED);
        self.remove_block_as_pred(block);
    }

    /// Removes `block` from the graph.
    ///
    /// With `unreachable` the block is simply dropped together with its outgoing edges (and the
    /// continuation of a call-handler pair). Otherwise `block` must be an empty `Always` block:
    /// its predecessors are redirected to its target.
    pub fn remove_block(&mut self, block: Block, unreachable: bool) {
        let prev = self.prev_block(block);

        if unreachable {
            if self.is_call_handler_pair_head(block) {
                if let Some(tail) = self.next_block(block) {
                    self.remove_call_handler_continuation(tail);
                }
            }
            self.unreachable_block(block);
            self.unlink(block);
            self.eh.update_for_deleted_block(block, prev);
            log::debug!("removed unreachable {block}");
            return;
        }

        debug_assert!(!self.blocks[block].flags.is_removed());
        let JumpKind::Always(succ) = self.blocks[block].jump else {
            debug_assert!(false, "only empty Always blocks can be removed while reachable");
            return;
        };
        debug_assert!(self.is_empty(block));
        debug_assert!(succ != block);
        self.loops.update_before_remove_block(block, Some(succ));

        if let Some(prev) = prev {
            debug_assert!(
                !self.falls_through(prev) || self.next_is(block, succ),
                "removing {block} breaks the fall through of {prev}"
            );
        }
        if self.first.is(block) {
            debug_assert!(self.next_is(block, succ));
            self.blocks[block].ref_count -= 1;
            self.blocks[succ].ref_count += 1;
        }

        self.unlink(block);
        self.blocks[block].flags.insert(BlockFlags::REMOVED);
        self.remove_ref_pred(succ, block);

        let preds = mem::take(&mut self.blocks[block].preds);
        for edge in preds {
            self.blocks[edge.source].jump.replace_target(block, succ);
            self.blocks[block].ref_count -= edge.dup_count;
            self.add_pred_edge(succ, edge);
        }
        self.eh.update_for_deleted_block(block, prev);
        log::debug!("removed empty {block}, predecessors now jump to {succ}");
    }

    /// Removes the continuation half of a call-handler pair whose call is gone.
    pub fn remove_call_handler_continuation(&mut self, tail: Block) {
        let rets: Vec<Block> = self.pred_blocks(tail).collect();
        for ret in rets {
            debug_assert!(matches!(self.blocks[ret].jump, JumpKind::HandlerReturn(_)));
            self.remove_handler_continuation(ret, tail);
        }
        self.blocks[tail].flags.remove(BlockFlags::DONT_REMOVE);
        self.remove_block(tail, true);
    }

    /// Size estimate of the code generated for the block.
    pub fn code_estimate(&self, block: Block) -> u32 {
        let data = &self.blocks[block];
        data.jump.cost() + data.stmts.iter().map(|stmt| stmt.cost()).sum::<u32>()
    }

    /// Size estimate of the whole function.
    pub fn measure_ir(&self) -> u32 {
        self.blocks().map(|block| self.code_estimate(block)).sum()
    }
}
