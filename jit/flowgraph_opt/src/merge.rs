//! Merging of identical statements at the ends and starts of blocks.
//!
//! Tail merging looks for predecessors of a block that end in the same statement. If all
//! predecessors share it, the statement is moved into the block. Otherwise one copy is split
//! off into a block of its own and the other predecessors jump to it (cross jumping):
//!
//! ```text
//! bb1: l1 = 0              bb1: l1 = 0
//!      l3 = add l3, 1           jmp bb2
//!      jmp bb3          =>  bb2: l3 = add l3, 1
//! bb2: l3 = add l3, 1           jmp bb3
//!      jmp bb3
//! ```
//!
//! Head merging moves a statement that starts both successors of a conditional in front of the
//! conditional.

use flowgraph::weight::add_weights;
use flowgraph::{Block, BlockFlags, BlockGraph, FlowOptConfig, JumpKind, SideEffects, Statement};
use smallvec::SmallVec;

#[cfg(test)]
mod tests;

/// A predecessor and the index of its last statement.
type Candidate = (Block, usize);

/// Merges identical statements at the ends of the predecessors of every block, at the ends of
/// blocks that return and at the starts of the successors of conditionals. Returns whether the
/// graph was modified.
pub fn head_tail_merge<S: Statement>(graph: &mut BlockGraph<S>, config: &FlowOptConfig) -> bool {
    let mut merger = Merger { graph, limit: config.merge_limit, retry: Vec::new() };
    let mut changed = false;

    let blocks: Vec<Block> = merger.graph.blocks().collect();
    for &block in &blocks {
        changed |= merger.iterate_tail_merge(block);
    }

    // blocks that return the same value can share one return
    loop {
        let graph = &*merger.graph;
        let returns: Vec<Candidate> = graph
            .blocks()
            .filter(|&block| {
                let data = &graph[block];
                data.jump.is_return()
                    && data.stmts.len() == 1
                    && !graph.return_block.is(block)
                    && !data.has_try_index()
                    && !data.has_hnd_index()
            })
            .map(|block| (block, 0))
            .collect();
        if !merger.tail_merge_preds(None, &returns) {
            break;
        }
        changed = true;
    }

    while let Some(block) = merger.retry.pop() {
        changed |= merger.iterate_tail_merge(block);
    }

    let blocks: Vec<Block> = merger.graph.blocks().collect();
    for block in blocks {
        changed |= merger.iterate_head_merge(block);
    }
    changed
}

struct Merger<'a, S> {
    graph: &'a mut BlockGraph<S>,
    limit: usize,
    /// Blocks created by cross jumping, their predecessors may share even more statements.
    retry: Vec<Block>,
}

impl<S: Statement> Merger<'_, S> {
    fn iterate_tail_merge(&mut self, block: Block) -> bool {
        let mut changed = false;
        while self.graph.is_in_layout(block) && self.tail_merge(block) {
            changed = true;
        }
        changed
    }

    fn tail_merge(&mut self, block: Block) -> bool {
        let graph = &*self.graph;
        if graph.ref_count(block) < 2 {
            return false;
        }
        let preds: Vec<Candidate> = graph
            .pred_blocks(block)
            .filter(|&pred| graph.unique_succ(pred) == Some(block))
            .filter(|&pred| graph.same_eh_region(block, pred))
            .filter_map(|pred| Some((pred, graph.last_non_nop_stmt(pred)?)))
            .collect();
        self.tail_merge_preds(Some(block), &preds)
    }

    /// Merges the first group of `preds` that end in an equivalent statement. `succ` is the
    /// common successor of the candidates, `None` for blocks that return.
    fn tail_merge_preds(&mut self, succ: Option<Block>, preds: &[Candidate]) -> bool {
        if preds.len() < 2 || preds.len() > self.limit {
            return false;
        }

        for (i, &(base, base_idx)) in preds.iter().enumerate() {
            let base_stmt = &self.graph[base].stmts[base_idx];
            let mut matches: SmallVec<[Candidate; 8]> = SmallVec::new();
            matches.push((base, base_idx));
            for &(pred, idx) in &preds[i + 1..] {
                if base_stmt.equivalent(&self.graph[pred].stmts[idx]) {
                    matches.push((pred, idx));
                }
            }
            if matches.len() < 2 {
                continue;
            }

            if let Some(succ) = succ {
                if matches.len() as u32 == self.graph.ref_count(succ) {
                    self.hoist_into_successor(succ, &matches);
                    return true;
                }
            }
            if self.cross_jump(succ, &matches) {
                return true;
            }
        }
        false
    }

    /// Every way into `succ` ends in the same statement: move it to the start of `succ`.
    fn hoist_into_successor(&mut self, succ: Block, matches: &[Candidate]) {
        log::debug!("moving the common tail of {} predecessors into {succ}", matches.len());
        for (i, &(pred, idx)) in matches.iter().enumerate() {
            let stmt = self.graph.unlink_stmt(pred, idx);
            if i == 0 {
                self.graph.insert_stmt_at_beginning(succ, stmt);
                let copied = self.graph[pred].flags & BlockFlags::COPY_PROPAGATE;
                self.graph[succ].flags.insert(copied);
            }
        }
    }

    /// Keeps the statement in one of the candidates (splitting it if necessary) and redirects
    /// the other candidates to that copy.
    fn cross_jump(&mut self, succ: Option<Block>, matches: &[Candidate]) -> bool {
        let graph = &*self.graph;

        // prefer a candidate that needs no split and is followed by its successor
        let mut victim: Option<Candidate> = None;
        let (mut have_no_split, mut have_fall_through) = (false, false);
        for &(pred, idx) in matches {
            if graph.is_scratch(pred) {
                continue;
            }
            let no_split = idx == 0;
            let fall_through = graph.jumps_to_next(pred);
            let better = victim.is_none()
                || (no_split && fall_through)
                || (!have_no_split && no_split)
                || (!have_no_split && !have_fall_through && fall_through);
            if better {
                victim = Some((pred, idx));
                have_no_split = no_split;
                have_fall_through = fall_through;
            }
            if have_no_split && have_fall_through {
                break;
            }
        }
        let Some((victim, victim_idx)) = victim else { return false };

        let target = if victim_idx == 0 {
            victim
        } else {
            self.graph.split_at(victim, victim_idx)
        };
        log::debug!("cross jumping {} blocks to the common tail in {target}", matches.len() - 1);

        for &(pred, idx) in matches {
            if pred == victim {
                continue;
            }
            self.graph.unlink_stmt(pred, idx);
            match succ {
                Some(succ) => {
                    self.graph.redirect_edge(pred, succ, target);
                    self.forward_edge_weight(pred, target, succ);
                }
                None => {
                    self.graph[pred].jump = JumpKind::Always(target);
                    self.graph.add_ref_pred(target, pred);
                }
            }
            if self.graph[target].has_profile_weight() {
                let weight = add_weights(self.graph[target].weight, self.graph[pred].weight);
                self.graph.set_profile_weight(target, weight);
            }
        }
        self.retry.push(target);
        true
    }

    /// The flow from `pred` now passes through `target` on its way to `succ`.
    fn forward_edge_weight(&mut self, pred: Block, target: Block, succ: Block) {
        if !self.graph.have_valid_edge_weights {
            return;
        }
        let Some(moved) = self.graph.pred_edge(target, pred).cloned() else { return };
        if let Some(edge) = self.graph.pred_edge_mut(succ, target) {
            let min = add_weights(edge.weight_min, moved.weight_min);
            let max = add_weights(edge.weight_max, moved.weight_max);
            edge.set_weights(min, max);
        }
    }

    fn iterate_head_merge(&mut self, block: Block) -> bool {
        let mut changed = false;
        while self.head_merge(block) {
            changed = true;
        }
        changed
    }

    /// Moves a statement that starts both successors of the conditional `block` into `block`.
    fn head_merge(&mut self, block: Block) -> bool {
        let graph = &*self.graph;
        let JumpKind::Cond(dest) = graph[block].jump else { return false };
        if graph.jumps_to_next(block) {
            return false;
        }
        let Some(next) = graph.next_block(block) else { return false };
        let Some(next_idx) = self.head_candidate(block, next) else { return false };
        let Some(dest_idx) = self.head_candidate(block, dest) else { return false };

        let stmt = &graph[next].stmts[next_idx];
        let other = &graph[dest].stmts[dest_idx];
        if !stmt.equivalent(other) || stmt.contains_tail_call() || other.contains_tail_call() {
            return false;
        }
        if !can_move_first_statement_into_pred(graph, stmt, block) {
            return false;
        }

        log::debug!("moving the common head of {next} and {dest} into {block}");
        let stmt = self.graph.unlink_stmt(next, next_idx);
        self.graph.insert_stmt_near_end(block, stmt);
        self.graph.unlink_stmt(dest, dest_idx);
        let copied = self.graph[next].flags & BlockFlags::COPY_PROPAGATE;
        self.graph[block].flags.insert(copied);
        true
    }

    /// The index of the first statement of `succ` if `succ` is only entered from `block`.
    fn head_candidate(&self, block: Block, succ: Block) -> Option<usize> {
        let graph = &*self.graph;
        if graph.unique_pred(succ) != Some(block)
            || graph.ref_count(succ) != graph.preds(succ).iter().map(|edge| edge.dup_count).sum()
            || !graph.same_eh_region(block, succ)
        {
            return None;
        }
        let idx = graph.first_non_nop_stmt(succ)?;
        if idx + 1 == graph[succ].stmts.len() && graph.has_terminator(succ) {
            return None;
        }
        Some(idx)
    }
}

/// `stmt` can be executed before the terminator of `pred` instead of after it.
fn can_move_first_statement_into_pred<S: Statement>(
    graph: &BlockGraph<S>,
    stmt: &S,
    pred: Block,
) -> bool {
    if !graph.has_terminator(pred) {
        return true;
    }
    let Some(terminator) = graph[pred].stmts.last() else { return true };
    let term_effects = terminator.side_effects();
    let mut stmt_effects = stmt.side_effects();

    if term_effects.contains(SideEffects::ASG) {
        return false;
    }

    if stmt_effects.contains(SideEffects::ASG) {
        // only stores to locals can be reordered with the terminator
        let Some(store) = stmt.local_store() else { return false };
        if store.value_effects.contains(SideEffects::ASG) {
            return false;
        }
        if term_effects.intersects(SideEffects::ALL_EFFECT) {
            if store.address_exposed {
                return false;
            }
            // the store would become visible to a handler of the terminator's exception
            if term_effects.intersects(SideEffects::CALL | SideEffects::EXCEPT)
                && graph[pred].has_try_index()
            {
                return false;
            }
        }
        if terminator.references_local(store.local) {
            return false;
        }
        stmt_effects.remove(SideEffects::ASG);
    }

    let effects = SideEffects::ALL_EFFECT;
    if term_effects.contains(SideEffects::CALL) && stmt_effects.intersects(effects) {
        return false;
    }
    if term_effects.contains(SideEffects::GLOB_REF)
        && stmt_effects.intersects(SideEffects::PERSISTENT)
    {
        return false;
    }
    let ordered = SideEffects::GLOB_REF | SideEffects::ORDER_SIDEEFF;
    if term_effects.contains(SideEffects::ORDER_SIDEEFF) && stmt_effects.intersects(ordered) {
        return false;
    }
    if stmt_effects.contains(SideEffects::ORDER_SIDEEFF) && term_effects.intersects(ordered) {
        return false;
    }
    if term_effects.contains(SideEffects::EXCEPT) && stmt_effects.intersects(effects) {
        return false;
    }
    true
}
