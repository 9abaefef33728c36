//! Reachability sets and removal of unreachable blocks.
//!
//! For every block the analysis records the set of blocks that can reach it. The sets are
//! dense bit sets over the block arena, so a query is a single bit test at the price of
//! quadratic memory.

use bitset::BitSet;
use typed_index_collections::TiVec;

use crate::traversal::DfsOrder;
use crate::{
    Block, BlockCursor, BlockFlags, BlockGraph, CfgError, CfgResult, FlowOptConfig, JumpKind,
    Statement,
};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
pub struct Reachability {
    return_blocks: Vec<Block>,
    enter_blocks: BitSet<Block>,
    dfs: DfsOrder,
    reach: TiVec<Block, BitSet<Block>>,
    /// Graph epoch the reach sets were computed for.
    epoch: Option<u32>,
}

impl Default for Reachability {
    fn default() -> Self {
        Reachability {
            return_blocks: Vec::new(),
            enter_blocks: BitSet::new_empty(0),
            dfs: DfsOrder::default(),
            reach: TiVec::new(),
            epoch: None,
        }
    }
}

impl Reachability {
    pub fn new() -> Reachability {
        Reachability::default()
    }

    /// Records every `Return` block of the graph.
    pub fn compute_return_blocks<S>(&mut self, graph: &BlockGraph<S>) {
        self.return_blocks.clear();
        self.return_blocks.extend(graph.blocks().filter(|&block| graph[block].jump.is_return()));
    }

    /// The blocks that are entered without an explicit edge: the first block and every handler
    /// and filter entry.
    pub fn compute_enter_blocks<S>(&mut self, graph: &BlockGraph<S>, config: &FlowOptConfig) {
        self.enter_blocks = BitSet::new_empty(graph.arena_len());
        let Some(first) = graph.first_block() else { return };
        self.enter_blocks.insert(first);
        for entry in graph.eh.handler_entries() {
            self.enter_blocks.insert(entry);
        }

        // The unwinder needs the continuation of a call-handler pair even if the handler never
        // returns to it.
        if config.callhandler_continuations_are_entries {
            for block in graph.blocks() {
                if graph.is_call_handler_pair_head(block) {
                    if let Some(cont) = graph.next_block(block) {
                        self.enter_blocks.insert(cont);
                    }
                }
            }
        }

        log::trace!("enter blocks: {:?}", self.enter_blocks);
    }

    pub fn compute_dfs<S>(&mut self, graph: &BlockGraph<S>) {
        self.dfs = DfsOrder::compute(graph);
    }

    /// Computes the reach sets from the current depth first order. Also marks blocks whose
    /// predecessors are all GC safe points as safe points themselves.
    pub fn compute_reach_sets<S>(&mut self, graph: &mut BlockGraph<S>) {
        debug_assert_eq!(self.dfs.rpo.len(), graph.block_count() as usize);
        let arena_len = graph.arena_len();
        self.reach = (0..arena_len)
            .map(|block| {
                let mut set = BitSet::new_empty(arena_len);
                if graph.is_in_layout(Block::from(block)) {
                    set.insert(Block::from(block));
                }
                set
            })
            .collect();

        let mut changed = true;
        let mut iterations = 1u32;
        while changed {
            changed = false;
            for &block in &self.dfs.rpo {
                if graph.preds(block).is_empty() {
                    continue;
                }
                let mut gc_safe = BlockFlags::GC_SAFE_POINT;
                for i in 0..graph.preds(block).len() {
                    let pred = graph.preds(block)[i].source;
                    if pred != block {
                        let (dst, src) = pair_mut(&mut self.reach, block, pred);
                        changed |= dst.union(src);
                    }
                    gc_safe &= graph[pred].flags;
                }
                graph[block].flags |= gc_safe;
            }
            iterations += 1;
        }
        log::trace!("reach sets converged after {iterations} iterations");

        self.epoch = Some(graph.epoch());
    }

    /// The reach sets describe the current graph.
    pub fn is_valid<S>(&self, graph: &BlockGraph<S>) -> bool {
        self.epoch == Some(graph.epoch())
    }

    pub fn invalidate(&mut self) {
        self.epoch = None;
    }

    pub fn return_blocks(&self) -> &[Block] {
        &self.return_blocks
    }

    pub fn enter_blocks(&self) -> &BitSet<Block> {
        &self.enter_blocks
    }

    pub fn is_enter_block(&self, block: Block) -> bool {
        block.index() < self.enter_blocks.domain_size() && self.enter_blocks.contains(block)
    }

    pub fn dfs(&self) -> &DfsOrder {
        &self.dfs
    }

    /// Number of blocks covered by the reach sets. Blocks created afterwards have no set.
    pub fn domain(&self) -> usize {
        self.reach.len()
    }

    /// The blocks that can reach `block`, `None` if `block` is newer than the analysis.
    pub fn reach_set(&self, block: Block) -> Option<&BitSet<Block>> {
        self.reach.get(block)
    }

    /// No entry block reaches `block`.
    pub fn is_unreachable(&self, block: Block) -> bool {
        match self.reach.get(block) {
            Some(reach) => self.enter_blocks.is_disjoint(reach),
            None => false,
        }
    }
}

fn pair_mut<T>(vec: &mut TiVec<Block, T>, a: Block, b: Block) -> (&mut T, &T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = vec.split_at_mut(b);
        (&mut lo[a], &hi[Block::from(0usize)])
    } else {
        let (lo, hi) = vec.split_at_mut(a);
        (&mut hi[Block::from(0usize)], &lo[b])
    }
}

/// Removes every block for which `can_remove` returns `true`.
///
/// Blocks that must stay in the layout (try and handler boundaries) lose their code and turn into
/// rarely run `Throw` stubs. Removed `CallHandler` blocks take the continuation of their pair with
/// them. Returns whether anything changed that may make further blocks unreachable.
pub fn remove_unreachable_blocks<S: Statement>(
    graph: &mut BlockGraph<S>,
    mut can_remove: impl FnMut(&BlockGraph<S>, Block) -> bool,
) -> bool {
    let mut has_unreachable = false;
    let mut changed = false;

    let mut cursor = BlockCursor::at_first(graph);
    while let Some(block) = cursor.current() {
        cursor.advance(graph);

        if graph.return_block.is(block) {
            continue;
        }
        // already turned into a stub
        let data = &graph[block];
        let is_stub = data.flags.contains(BlockFlags::DONT_REMOVE) && data.jump.is_throw();
        if is_stub && graph.is_empty(block) {
            continue;
        }
        if graph[block].flags.is_removed() || !can_remove(graph, block) {
            continue;
        }

        let is_pair = graph.is_call_handler_pair_head(block);
        let cont = if is_pair { graph.next_block(block) } else { None };
        let had_succs = !graph.successors(block).is_empty();

        graph.unreachable_block(block);
        debug_assert!(graph[block].flags.is_removed());

        if graph[block].flags.contains(BlockFlags::DONT_REMOVE) {
            changed |= had_succs;
            let data = &mut graph[block];
            data.flags.remove(BlockFlags::REMOVED | BlockFlags::INTERNAL);
            data.flags.insert(BlockFlags::IMPORTED);
            data.jump = JumpKind::Throw;
            graph.set_run_rarely(block);
            log::debug!("{block} is unreachable but can not be removed, converted to throw");
        } else {
            has_unreachable = true;
            changed = true;
        }

        if let Some(cont) = cont {
            if !graph[block].jump.is_throw() {
                // the block is removed anyway, but it must not look like a pair head anymore
                graph[block].jump = JumpKind::Always(cont);
            }
            if cursor.current() == Some(cont) {
                cursor.advance(graph);
            }
            graph.remove_call_handler_continuation(cont);
        }
    }

    if has_unreachable {
        let mut cursor = BlockCursor::at_first(graph);
        while let Some(block) = cursor.current() {
            cursor.advance(graph);
            if graph[block].flags.is_removed() {
                graph.remove_block(block, true);
            }
        }
    }

    changed
}

/// Worklist reachability from the first block that also follows the implicit edges from a try
/// begin to its handlers. Used late in the pipeline when the reach sets are stale.
///
/// Returns whether any unreachable block was found.
pub fn remove_dead_blocks<S: Statement>(
    graph: &mut BlockGraph<S>,
    config: &FlowOptConfig,
) -> CfgResult<bool> {
    let Some(first) = graph.first_block() else { return Ok(false) };
    let mut visited = BitSet::new_empty(graph.arena_len());
    let mut worklist = vec![first];

    if config.callhandler_continuations_are_entries {
        for block in graph.blocks() {
            if graph.is_call_handler_pair_head(block) {
                worklist.extend(graph.next_block(block));
            }
        }
    }

    while let Some(block) = worklist.pop() {
        if !visited.insert(block) {
            continue;
        }
        worklist.extend(graph.successors(block));

        if graph.eh.is_try_begin(block) {
            let mut region = graph[block].try_index.expand();
            while let Some(idx) = region {
                let desc = &graph.eh[idx];
                if desc.try_begin != block {
                    break;
                }
                worklist.push(desc.hnd_begin);
                worklist.extend(desc.filter_begin.expand());
                region = desc.enclosing_try.expand();
            }
        }
    }

    let mut has_unreachable = false;
    let mut iterations = 1;
    loop {
        if iterations > config.iteration_limit {
            return Err(CfgError::IterationLimit {
                pass: "dead block removal",
                limit: config.iteration_limit,
            });
        }
        iterations += 1;
        let changed = remove_unreachable_blocks(graph, |graph, block| {
            let removable = block.index() >= visited.domain_size()
                || !visited.contains(block)
                || graph.ref_count(block) == 0;
            has_unreachable |= removable;
            removable
        });
        if !changed {
            break;
        }
    }

    Ok(has_unreachable)
}
