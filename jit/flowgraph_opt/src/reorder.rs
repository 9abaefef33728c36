//! Profile guided block layout.
//!
//! Blocks are moved so that the likely successor of every block is its lexical successor. Rarely
//! run blocks are moved out of the way, towards the end of the function or of their try region.

use bitset::BitSet;
use flowgraph::{
    Block, BlockFlags, BlockGraph, CfgResult, EhIndex, FlowOptConfig, JumpKind, Statement, Weight,
    MAX_WEIGHT, ZERO_WEIGHT,
};

use crate::rarely_run::expand_rarely_run_blocks;
use crate::tail_dup::optimize_branch;


/// Reorders the blocks of the function. With profile data the decisions are based on block and
/// edge weights, without it only rarely run blocks are moved.
///
/// Blocks that are not moved get a chance to have their jump to a conditional removed by
/// duplicating the conditional (see [`optimize_branch`]). Returns whether the graph was
/// modified.
pub fn reorder_blocks<S: Statement>(
    graph: &mut BlockGraph<S>,
    config: &FlowOptConfig,
) -> CfgResult<bool> {
    let mut changed = expand_rarely_run_blocks(graph);
    if graph.first_cold.is_some() {
        log::debug!("the function is already split into hot and cold code, keeping the layout");
        return Ok(changed);
    }

    let mut layout = Layout { graph, config };
    let Some(mut prev) = layout.graph.first_block() else { return Ok(changed) };
    while let Some(block) = layout.graph.next_block(prev) {
        changed |= layout.visit(prev, block);
        match layout.graph.next_block(prev) {
            Some(next) => prev = next,
            None => break,
        }
    }

    if changed {
        layout.graph.validate()?;
    }
    Ok(changed)
}

struct Layout<'a, S> {
    graph: &'a mut BlockGraph<S>,
    config: &'a FlowOptConfig,
}

/// The blocks `start..=end` will be moved after `insert_after`.
struct Move {
    start: Block,
    end: Block,
    start_prev: Block,
    insert_after: Block,
    /// The block that used to follow `end`.
    end_next: Option<Block>,
    /// The block that used to follow `insert_after`.
    skip: Option<Block>,
    /// `start..=end` is the destination of `prev` being pulled up.
    pull_up: bool,
}

impl<S: Statement> Layout<'_, S> {
    /// Decides whether `block` (or the destination of `prev`) should be moved and moves it.
    fn visit(&mut self, prev: Block, block: Block) -> bool {
        let graph = &*self.graph;
        if graph[block].flags.contains(BlockFlags::KEEP_ALWAYS) || graph[block].has_hnd_index() {
            return false;
        }

        let is_rare = graph[block].is_run_rarely();
        let mut dest = match graph[prev].jump {
            JumpKind::Always(target) | JumpKind::Cond(target) => Some(target),
            _ => None,
        };
        if dest == Some(block) {
            if graph[prev].jump.is_cond() {
                return false;
            }
            dest = None;
        }
        let forward = dest.map_or(false, |dest| self.is_forward_branch(prev, dest));
        let backward = dest.is_some() && !forward;

        let mut reorder = !graph[prev].is_run_rarely();
        let mut hot_weight: Weight = -1.0;
        let mut check_rare = true;

        let profiled = |block: Block| graph[block].has_profile_weight();
        if graph.using_profile_weights
            && profiled(prev)
            && profiled(block)
            && dest.map_or(true, profiled)
        {
            check_rare = false;
            match dest {
                Some(target) if forward && graph[prev].jump.is_always() => {
                    let weight_dest = graph[target].weight;
                    if weight_dest < graph[block].weight || weight_dest == ZERO_WEIGHT {
                        reorder = false;
                    } else if self.should_move_dest_up(prev, target) {
                        hot_weight = weight_dest - 1.0;
                    } else {
                        hot_weight = if is_rare { ZERO_WEIGHT } else { graph[block].weight + 1.0 };
                        dest = None;
                    }
                }
                Some(target) if forward => {
                    if graph.have_valid_edge_weights {
                        let to_dest = graph.pred_edge(target, prev);
                        let to_block = graph.pred_edge(block, prev);
                        match (to_dest, to_block) {
                            (Some(to_dest), Some(to_block)) => {
                                let taken = (to_dest.weight_min + to_dest.weight_max) / 2.0;
                                let not_taken = (to_block.weight_min + to_block.weight_max) / 2.0;
                                let threshold = self.config.reversal_threshold as Weight;
                                if taken * 100.0 < threshold * (taken + not_taken) {
                                    reorder = false;
                                } else {
                                    hot_weight = not_taken - 1.0;
                                }
                            }
                            _ => reorder = false,
                        }
                    } else {
                        // roughly half of the executions take the branch
                        let weight_dest = graph[target].weight;
                        let weight_dest = if weight_dest < MAX_WEIGHT {
                            (weight_dest + 1.0) / 2.0
                        } else {
                            weight_dest
                        };
                        let weight_prev = graph[prev].weight;
                        let weight_prev = if weight_prev < MAX_WEIGHT {
                            (weight_prev + 2.0) / 3.0
                        } else {
                            weight_prev
                        };
                        hot_weight = weight_dest.min(weight_prev);
                        if graph[block].weight >= hot_weight {
                            reorder = false;
                        }
                    }
                }
                _ => {
                    if graph.falls_through(prev) {
                        check_rare = true;
                    } else {
                        let (candidate, highest) = self.heaviest_block_after(prev, block);
                        if highest == ZERO_WEIGHT || candidate == block {
                            reorder = false;
                        } else {
                            dest = Some(candidate);
                            hot_weight = highest - 1.0;
                        }
                    }
                }
            }
        }

        if check_rare {
            if !is_rare {
                // moving a return out of the way lets `prev` fall into its target
                let return_after_jump = dest.map_or(false, |dest| graph.next_is(block, dest))
                    && graph[block].jump.is_return()
                    && graph[prev].jump.is_always();
                if !return_after_jump {
                    reorder = false;
                }
            } else if dest.map_or(false, |dest| graph[dest].is_run_rarely()) {
                reorder = false;
            } else {
                hot_weight = ZERO_WEIGHT;
            }
        }

        if !reorder {
            return optimize_branch(self.graph, self.config, prev);
        }

        if graph[prev].jump.is_cond()
            && !graph[prev].stmts.last().map_or(false, |stmt| stmt.is_compare_branch())
        {
            return false;
        }

        let Some(mv) = self.plan_move(prev, block, dest, backward, is_rare, hot_weight) else {
            return false;
        };
        self.apply_move(prev, block, dest, mv);
        true
    }

    fn plan_move(
        &self,
        prev: Block,
        block: Block,
        dest: Option<Block>,
        backward: bool,
        is_rare: bool,
        hot_weight: Weight,
    ) -> Option<Move> {
        let graph = &*self.graph;

        // option 1: move `block` and the blocks like it that follow out of the way
        let mut sink = None;
        let mut connected_dest = false;
        if !(backward && !is_rare) && !graph[block].flags.contains(BlockFlags::DONT_REMOVE) {
            let mut end = block;
            let mut next = graph.next_block(end);
            loop {
                if graph.is_call_handler_pair_head(end) {
                    let Some(tail) = next else { break };
                    end = tail;
                    next = graph.next_block(tail);
                }
                let Some(it) = next else { break };
                if Some(it) == dest {
                    connected_dest = true;
                    break;
                }
                if !graph.same_eh_region(block, it)
                    || graph[it].flags.contains(BlockFlags::DONT_REMOVE)
                {
                    break;
                }
                if is_rare {
                    if !graph[it].is_run_rarely() {
                        break;
                    }
                } else if graph[it].weight >= hot_weight {
                    break;
                }
                end = it;
                next = graph.next_block(it);
            }
            sink = Some(end);
        }

        // option 2: pull the destination of `prev` up
        let mut pull = None;
        if let Some(dest) = dest.filter(|_| !connected_dest) {
            let pinned = BlockFlags::DONT_REMOVE | BlockFlags::KEEP_ALWAYS;
            let movable =
                !graph[dest].flags.intersects(pinned) && graph.same_eh_region(prev, dest);
            let dest_prev = if movable { self.prev_after(block, dest) } else { None };
            if let Some(dest_prev) = dest_prev {
                let mut end = dest;
                let mut next = graph.next_block(end);
                loop {
                    if graph.is_call_handler_pair_head(end) {
                        let Some(tail) = next else { break };
                        end = tail;
                        next = graph.next_block(tail);
                    }
                    let Some(it) = next else { break };
                    let continues = graph.falls_through(end)
                        || (graph[end].jump.is_always() && graph.jumps_to_next(end));
                    if !continues
                        || !graph.same_eh_region(dest, it)
                        || graph[it].flags.contains(BlockFlags::DONT_REMOVE)
                        || it == prev
                    {
                        break;
                    }
                    if is_rare {
                        if graph[it].is_run_rarely() {
                            break;
                        }
                    } else if graph[it].weight <= hot_weight {
                        break;
                    }
                    end = it;
                    next = graph.next_block(it);
                }
                pull = Some((dest, end, dest_prev));
            }
        }

        if let Some((start, end, start_prev)) = pull {
            return Some(Move {
                start,
                end,
                start_prev,
                insert_after: prev,
                end_next: graph.next_block(end),
                skip: graph.next_block(prev),
                pull_up: true,
            });
        }

        let end = sink?;
        if graph.is_last(end) {
            return None;
        }
        let insert_after = if !graph[block].has_try_index() && is_rare {
            graph.last_block()
        } else {
            self.find_insert_point(prev, block, end, dest, is_rare)
        }?;
        if insert_after == prev {
            return None;
        }
        Some(Move {
            start: block,
            end,
            start_prev: prev,
            insert_after,
            end_next: graph.next_block(end),
            skip: graph.next_block(insert_after),
            pull_up: false,
        })
    }

    fn apply_move(&mut self, prev: Block, block: Block, dest: Option<Block>, mv: Move) {
        let graph = &mut *self.graph;
        log::debug!("moving {}..{} after {}", mv.start, mv.end, mv.insert_after);

        // the regions the range belongs to
        let mut in_try: BitSet<EhIndex> = BitSet::new_empty(graph.eh.len());
        let mut in_hnd: BitSet<EhIndex> = BitSet::new_empty(graph.eh.len());
        let mut cursor = graph[mv.start].try_index.expand();
        while let Some(region) = cursor {
            in_try.insert(region);
            cursor = graph.eh[region].enclosing_try.expand();
        }
        if let Some(region) = graph[mv.start].hnd_index.expand() {
            in_hnd.insert(region);
        }

        graph.eh.update_last_blocks(mv.end, mv.start_prev);
        let ends: Vec<(EhIndex, bool, bool)> = graph
            .eh
            .iter()
            .map(|(idx, region)| {
                (idx, region.try_last == mv.insert_after, region.hnd_last == mv.insert_after)
            })
            .collect();
        for (region, try_ends, hnd_ends) in ends {
            if try_ends && in_try.contains(region) {
                graph.eh.set_try_end(region, mv.end);
            }
            if hnd_ends && in_hnd.contains(region) {
                graph.eh.set_hnd_end(region, mv.end);
            }
        }

        graph.move_range_after(mv.start, mv.end, mv.insert_after);

        if graph[prev].jump.is_cond() {
            // `prev` now jumps to the block it used to fall into
            if let Some(stmt) = graph[prev].stmts.last_mut() {
                stmt.reverse_condition();
            }
            graph[prev].jump = JumpKind::Cond(block);
        }

        if let Some(dest) = dest.filter(|_| graph[prev].jump.is_cond()) {
            graph.connect_fall_through(prev, dest);
        }
        if let Some(end_next) = mv.end_next {
            graph.connect_fall_through(mv.end, end_next);
        }
        if mv.pull_up {
            graph.connect_fall_through(mv.start_prev, mv.start);
        } else if let Some(skip) = mv.skip {
            graph.connect_fall_through(mv.insert_after, skip);
        }
    }

    /// `dest` follows `prev` in the layout.
    fn is_forward_branch(&self, prev: Block, dest: Block) -> bool {
        let mut cursor = self.graph.next_block(prev);
        while let Some(block) = cursor {
            if block == dest {
                return true;
            }
            cursor = self.graph.next_block(block);
        }
        false
    }

    /// The lexical predecessor of `dest` if `dest` comes after `from`.
    fn prev_after(&self, from: Block, dest: Block) -> Option<Block> {
        let mut cursor = Some(from);
        while let Some(block) = cursor {
            if self.graph.next_is(block, dest) {
                return Some(block);
            }
            cursor = self.graph.next_block(block);
        }
        None
    }

    /// `prev` is the dominant way into `dest`, so `dest` should directly follow it.
    fn should_move_dest_up(&self, prev: Block, dest: Block) -> bool {
        let graph = &*self.graph;
        let others = || graph.preds(dest).iter().filter(move |edge| edge.source != prev);
        if graph.have_valid_edge_weights {
            let Some(from_prev) = graph.pred_edge(dest, prev) else { return false };
            others().all(|edge| edge.weight_max <= from_prev.weight_min)
        } else {
            let weight_prev = graph[prev].weight;
            others().all(|edge| graph[edge.source].weight < weight_prev)
        }
    }

    /// The block with the highest profile weight after `prev` that could follow it.
    fn heaviest_block_after(&self, prev: Block, block: Block) -> (Block, Weight) {
        let graph = &*self.graph;
        let mut highest = graph[block].weight;
        let mut candidate = block;
        let mut cursor = graph.next_block(block);
        while let Some(it) = cursor {
            let data = &graph[it];
            if data.has_profile_weight()
                && data.weight > highest
                && graph.same_eh_region(prev, it)
                && !data.flags.intersects(BlockFlags::DONT_REMOVE | BlockFlags::KEEP_ALWAYS)
            {
                highest = data.weight;
                candidate = it;
            }
            cursor = graph.next_block(it);
        }
        (candidate, highest)
    }

    /// Finds the block after which `start..=end` is placed. Only blocks of the same EH region
    /// that do not fall through qualify. A block after which the range falls into the target of
    /// its last jump is preferred; rarely run ranges sink to the last candidate and other ranges
    /// are placed at the first candidate after `near`.
    fn find_insert_point(
        &self,
        prev: Block,
        start: Block,
        end: Block,
        near: Option<Block>,
        run_rarely: bool,
    ) -> Option<Block> {
        let graph = &*self.graph;
        let (first, last) = match graph[start].try_index.expand() {
            Some(region) => (graph.eh[region].try_begin, graph.eh[region].try_last),
            None => (graph.first_block()?, graph.last_block()?),
        };

        let mut in_range: BitSet<Block> = BitSet::new_empty(graph.arena_len());
        let mut cursor = Some(start);
        while let Some(block) = cursor {
            in_range.insert(block);
            cursor = if block == end { None } else { graph.next_block(block) };
        }

        let jump_target = graph.unique_succ(end);
        let mut reached_near = near.is_none();
        let (mut best, mut fallback) = (None, None);
        let mut cursor = Some(first);
        while let Some(it) = cursor {
            if Some(it) == near {
                reached_near = true;
            }
            let eligible = !in_range.contains(it)
                && it != prev
                && graph.same_eh_region(start, it)
                && !graph.falls_through(it);
            if eligible {
                let mut layout_next = graph.next_block(it);
                if layout_next == Some(start) {
                    layout_next = graph.next_block(end);
                }
                if jump_target.is_some() && layout_next == jump_target {
                    return Some(it);
                }
                if run_rarely {
                    best = Some(it);
                } else if !reached_near {
                    fallback = Some(it);
                } else if best.is_none() {
                    best = Some(it);
                }
            }
            if it == last {
                break;
            }
            cursor = graph.next_block(it);
        }
        best.or(fallback)
    }
}
