//! Local simplification of the flow graph until a fixpoint is reached.

use bitset::BitSet;
use flowgraph::weight::sub_weights;
use flowgraph::{
    Block, BlockFlags, BlockGraph, CfgError, CfgResult, FlowOptConfig, JumpKind, Local,
    Statement, ZERO_WEIGHT,
};

use crate::compact::{can_compact_blocks, compact_blocks};
use crate::switch::optimize_switch_branches;

#[cfg(test)]
mod tests;

/// Repeatedly simplifies every block of the graph until nothing changes anymore:
///
/// * unreachable blocks (no references) are removed,
/// * empty `Always` blocks are removed and jumps to them are redirected to their target,
/// * conditionals whose both arms lead to the same block become `Always`,
/// * a conditional that jumps around an empty `Always` block is reversed,
/// * degenerate switches are turned into `Always` or `Cond` jumps,
/// * blocks that unconditionally fall into their only predecessor are compacted.
///
/// With `tail_duplication` small conditional blocks are also copied into predecessors that
/// set up a favorable value for the condition.
///
/// Returns whether the graph was modified. Not converging within the configured number of
/// passes is reported as [`CfgError::IterationLimit`].
pub fn update_flow_graph<S: Statement>(
    graph: &mut BlockGraph<S>,
    config: &FlowOptConfig,
    tail_duplication: bool,
) -> CfgResult<bool> {
    let mut normalizer = Normalizer { graph, config, tail_duplication };
    let mut modified = false;
    let mut pass = 1;
    loop {
        if pass > config.iteration_limit {
            return Err(CfgError::IterationLimit {
                pass: "flow graph update",
                limit: config.iteration_limit,
            });
        }
        log::trace!("flow graph update pass {pass}");
        pass += 1;

        if !normalizer.run_pass() {
            break;
        }
        modified = true;
    }

    if modified {
        normalizer.graph.validate()?;
    }
    Ok(modified)
}

struct Normalizer<'a, S> {
    graph: &'a mut BlockGraph<S>,
    config: &'a FlowOptConfig,
    tail_duplication: bool,
}

impl<S: Statement> Normalizer<'_, S> {
    fn run_pass(&mut self) -> bool {
        let mut changed = false;
        let mut cursor = self.graph.first_block();
        while let Some(block) = cursor {
            // `block` is the only block that may disappear while it is optimized
            let prev = self.graph.prev_block(block);
            changed |= self.optimize_block(block);
            cursor = if self.graph[block].flags.is_removed() {
                match prev {
                    Some(prev) => self.graph.next_block(prev),
                    None => self.graph.first_block(),
                }
            } else {
                self.graph.next_block(block)
            };
        }
        changed
    }

    fn optimize_block(&mut self, block: Block) -> bool {
        let graph = &mut *self.graph;
        let mut changed = false;
        loop {
            if self.tail_duplication {
                if let Some(target) = graph.unique_succ(block) {
                    changed |= optimize_uncond_branch_to_simple_cond(graph, block, target);
                }
            }

            let next = graph.next_block(block);
            let dest = match graph[block].jump {
                JumpKind::Always(dest) if Some(dest) != next => Some(dest),
                JumpKind::Cond(dest) if Some(dest) == next => {
                    changed |= optimize_branch_to_next(graph, block);
                    None
                }
                JumpKind::Cond(dest) => Some(dest),
                _ => None,
            };

            if let Some(dest) = dest {
                if is_empty_always(graph, dest)
                    && optimize_branch_to_empty_unconditional(graph, block, dest)
                {
                    changed = true;
                    continue;
                }
                if reverse_around_empty_next(graph, block, dest) {
                    changed = true;
                    continue;
                }
            }

            if graph[block].jump.is_switch() && optimize_switch_branches(graph, block) {
                changed = true;
                continue;
            }

            if let Some(next) = graph.next_block(block) {
                if can_compact_blocks(graph, self.config, block, next) {
                    compact_blocks(graph, block, next);
                    changed = true;
                    continue;
                }
            }

            // unreachable protected blocks become throw stubs in `remove_unreachable_blocks`
            if graph[block].flags.contains(BlockFlags::DONT_REMOVE) {
                return changed;
            }

            let refs = graph.ref_count(block);
            let jumps_to_self = matches!(
                graph[block].jump,
                JumpKind::Always(target) | JumpKind::Cond(target) if target == block
            );
            if refs == 0 || (refs == 1 && jumps_to_self) {
                if !graph.return_block.is(block) && !graph.is_first(block) {
                    log::debug!("{block} is unreachable");
                    graph.remove_block(block, true);
                    return true;
                }
                return changed;
            }

            if graph.is_empty(block) {
                changed |= optimize_empty_block(graph, self.config, block);
            }
            return changed;
        }
    }
}

/// An empty `Always` block that jumps to a block that does not lead back to it through other
/// empty `Always` blocks. Jumps to such a block can bypass it.
pub(crate) fn is_empty_always<S: Statement>(graph: &BlockGraph<S>, block: Block) -> bool {
    if !graph[block].jump.is_always() || !graph.is_empty(block) {
        return false;
    }
    let mut visited = BitSet::new_empty(graph.arena_len());
    let mut cursor = block;
    while let JumpKind::Always(target) = graph[cursor].jump {
        if target == block || !visited.insert(cursor) {
            return false;
        }
        if !graph.is_empty(target) {
            return true;
        }
        cursor = target;
    }
    true
}

/// Removes the empty `Always` block `block` if that is allowed, redirecting its predecessors to
/// its target.
pub fn optimize_empty_block<S: Statement>(
    graph: &mut BlockGraph<S>,
    config: &FlowOptConfig,
    block: Block,
) -> bool {
    let JumpKind::Always(succ) = graph[block].jump else { return false };
    debug_assert!(graph.is_empty(block));

    match graph.prev_block(block) {
        None => {
            // the entry only moves if its successor takes its place
            if !graph.jumps_to_next(block) {
                return false;
            }
        }
        Some(prev) => {
            if graph[prev].jump.is_call_handler() {
                return false;
            }
            if graph.falls_through(prev) && !graph.jumps_to_next(block) {
                return false;
            }
        }
    }

    if succ == block || graph.is_scratch(block) || graph.return_block.is(block) {
        return false;
    }
    // the last hot block marks the end of the hot section
    if graph.first_cold.is_some() && graph.next_block(block) == graph.first_cold.expand() {
        return false;
    }

    // a catch return may not cross into another region
    if !graph.same_eh_region(block, succ)
        && graph.pred_blocks(block).any(|pred| matches!(graph[pred].jump, JumpKind::CatchReturn(_)))
    {
        return false;
    }

    if !graph.can_delete_empty_block(block) {
        return false;
    }
    if config.loops_require_preheaders && graph[block].flags.contains(BlockFlags::LOOP_PREHEADER)
    {
        return false;
    }
    if keeps_profile_entry(graph, block) {
        return false;
    }

    graph.remove_block(block, false);
    true
}

/// The first imported block of a function with profile data carries the entry weight of the
/// function. It is only removed if the next block can take over that role.
fn keeps_profile_entry<S>(graph: &BlockGraph<S>, block: Block) -> bool {
    let data = &graph[block];
    if !graph.using_profile_weights
        || !data.has_profile_weight()
        || data.flags.contains(BlockFlags::INTERNAL)
    {
        return false;
    }

    let next_can_take_over = graph.next_block(block).map_or(false, |next| {
        let next = &graph[next];
        !next.flags.contains(BlockFlags::INTERNAL) && next.has_profile_weight()
    });
    if next_can_take_over {
        return false;
    }

    let mut cursor = graph.prev_block(block);
    while let Some(prev) = cursor {
        if !graph[prev].flags.contains(BlockFlags::INTERNAL) {
            return false;
        }
        cursor = graph.prev_block(prev);
    }
    true
}

/// Redirects the jump from `block` to the empty `Always` block `dest` to the target of `dest`.
pub fn optimize_branch_to_empty_unconditional<S: Statement>(
    graph: &mut BlockGraph<S>,
    block: Block,
    dest: Block,
) -> bool {
    let JumpKind::Always(final_dest) = graph[dest].jump else { return false };
    debug_assert!(graph.is_empty(dest));

    if graph[dest].has_try_index() && !graph.same_try_region(block, dest) {
        return false;
    }
    if graph[final_dest].flags.is_removed() {
        return false;
    }

    if graph.have_valid_edge_weights && graph[dest].has_profile_weight() {
        let Some(edge1) = graph.pred_edge(dest, block).cloned() else { return false };
        let edge_weight = if edge1.weight_min != edge1.weight_max {
            // the flow through `dest` is only known approximately now
            graph[dest].flags.remove(BlockFlags::PROF_WEIGHT);
            (edge1.weight_min + edge1.weight_max) / 2.0
        } else {
            edge1.weight_min
        };

        let data = &mut graph[dest];
        if data.weight > edge_weight {
            data.weight -= edge_weight;
        } else {
            data.weight = ZERO_WEIGHT;
            data.flags.insert(BlockFlags::RUN_RARELY);
        }

        if let Some(edge2) = graph.pred_edge_mut(final_dest, dest) {
            let min = sub_weights(edge2.weight_min, edge1.weight_min);
            let max = sub_weights(edge2.weight_max, edge1.weight_min);
            edge2.set_weights(min, max.max(min));
        }
    }

    log::debug!("{block} now jumps to {final_dest} instead of the empty {dest}");
    graph.redirect_edge(block, dest, final_dest);
    true
}

/// Turns a conditional whose target is also its lexical successor into an `Always` jump.
pub fn optimize_branch_to_next<S: Statement>(graph: &mut BlockGraph<S>, block: Block) -> bool {
    match graph[block].jump {
        JumpKind::Cond(target) if graph.next_is(block, target) => {
            remove_conditional_jump(graph, block);
            true
        }
        _ => false,
    }
}

/// Both arms of the conditional `block` lead to the same block. The jump becomes an `Always`
/// jump and the test is replaced by its side effects.
pub fn remove_conditional_jump<S: Statement>(graph: &mut BlockGraph<S>, block: Block) {
    let JumpKind::Cond(target) = graph[block].jump else {
        debug_assert!(false, "{block} is not a conditional");
        return;
    };
    debug_assert!(graph.next_is(block, target));
    log::debug!("removing the conditional jump of {block}, both arms lead to {target}");

    drop_terminator(graph, block);
    graph[block].jump = JumpKind::Always(target);
    graph.remove_ref_pred(target, block);
}

/// Replaces the terminator statement of `block` with its side effects.
pub(crate) fn drop_terminator<S: Statement>(graph: &mut BlockGraph<S>, block: Block) {
    let Some(last) = graph[block].stmts.len().checked_sub(1) else { return };
    if !graph[block].stmts[last].is_terminator() {
        return;
    }
    let stmt = graph.unlink_stmt(block, last);
    if let Some(effects) = stmt.extract_side_effects() {
        graph.insert_stmt_at_end(block, effects);
    }
}

/// `block` is a conditional that falls into an empty `Always` block `next` and jumps to `dest`.
/// If `dest` follows `next` (or can be moved there) the condition is reversed so that `block`
/// jumps to the target of `next` and `next` is removed:
///
/// ```text
/// block: cond dest        block: cond target (reversed)
/// next:  jmp target  =>   dest:  ...
/// dest:  ...
/// ```
fn reverse_around_empty_next<S: Statement>(
    graph: &mut BlockGraph<S>,
    block: Block,
    dest: Block,
) -> bool {
    if !graph[block].jump.is_cond() {
        return false;
    }
    let Some(next) = graph.next_block(block) else { return false };
    let JumpKind::Always(next_dest) = graph[next].jump else { return false };
    if graph.ref_count(next) != 1
        || graph.jumps_to_next(next)
        || next_dest == next
        || !graph.is_empty(next)
        || graph[next].flags.contains(BlockFlags::DONT_REMOVE)
    {
        return false;
    }
    if graph.first_cold.is(dest) || graph.in_different_sections(block, dest) {
        return false;
    }
    match graph[block].stmts.last() {
        Some(stmt) if stmt.is_compare_branch() => (),
        _ => return false,
    }

    let jump_around = graph.next_is(next, dest);
    let join_free = !jump_around && can_pull_up_join_free(graph, block, next, dest, next_dest);
    if !jump_around && !join_free {
        return false;
    }

    if graph[next].has_try_index() && !graph.same_try_region(block, next) {
        return false;
    }
    if graph[dest].has_try_index() && !graph.same_try_region(block, dest) {
        return false;
    }
    if graph.using_profile_weights && !graph.have_valid_edge_weights {
        return false;
    }

    if join_free {
        // the only way into `dest` is `block`, so it can be placed right after `next`
        let dest_next = graph.next_block(dest);
        if let Some(prev) = graph.prev_block(dest) {
            graph.eh.update_last_blocks(dest, prev);
        }
        graph.move_range_after(dest, dest, next);
        graph.eh.update_last_blocks(next, dest);
        if let Some(dest_next) = dest_next {
            graph.connect_fall_through(dest, dest_next);
        }
    }

    log::debug!("reversing the conditional of {block}, it jumped around the empty {next}");
    if let Some(stmt) = graph[block].stmts.last_mut() {
        stmt.reverse_condition();
    }
    graph[block].jump = JumpKind::Cond(next_dest);
    graph.replace_pred(next_dest, next, block);
    graph.remove_ref_pred(next, block);

    if graph.first_cold.is(next) {
        graph.first_cold = graph.next_block(next).into();
    }
    graph.loops.update_after_compacting(block, next);
    graph[next].flags.insert(BlockFlags::REMOVED);
    graph.unlink(next);
    graph.eh.update_for_deleted_block(next, Some(block));
    true
}

/// `dest` is entered only from `block` and can be moved behind `next` without making the
/// layout worse.
fn can_pull_up_join_free<S: Statement>(
    graph: &BlockGraph<S>,
    block: Block,
    next: Block,
    dest: Block,
    next_dest: Block,
) -> bool {
    if graph.ref_count(dest) != 1
        || graph.ref_count(next_dest) <= 1
        || graph[block].is_run_rarely() != graph[dest].is_run_rarely()
        || !graph.same_eh_region(next, dest)
        || graph[dest].flags.contains(BlockFlags::DONT_REMOVE)
        || graph.is_call_handler_pair_head(dest)
        || graph.is_call_handler_pair_tail(dest)
        || graph.is_scratch(dest)
    {
        return false;
    }
    // only pull blocks up, never down
    let mut cursor = graph.next_block(next);
    while let Some(it) = cursor {
        if it == dest {
            return true;
        }
        cursor = graph.next_block(it);
    }
    false
}

/// `block` jumps to `target`, a small conditional that tests a local `block` has just set to a
/// value that likely makes the test foldable. The test is duplicated into `block`:
///
/// ```text
/// block:  l1 = 0          block:  l1 = 0
///         jmp target              jtrue lt l1, 10
/// ...                 =>          cond target_dest
/// target: jtrue lt l1, 10 new:    jmp target_next
///         cond target_dest
/// ```
pub fn optimize_uncond_branch_to_simple_cond<S: Statement>(
    graph: &mut BlockGraph<S>,
    block: Block,
    target: Block,
) -> bool {
    if !graph.same_eh_region(block, target) || graph.is_scratch(block) {
        return false;
    }
    if graph[block].flags.contains(BlockFlags::KEEP_ALWAYS) || target == block {
        return false;
    }
    let Some(local) = tail_duplication_candidate(graph, target) else { return false };
    if !block_end_favors_tail_duplication(graph, block, local) {
        return false;
    }
    let JumpKind::Cond(cond_dest) = graph[target].jump else { return false };
    let Some(target_next) = graph.next_block(target) else { return false };

    log::debug!("duplicating the conditional {target} into {block}");
    let stmts: Vec<S> =
        graph[target].stmts.iter().filter(|stmt| !stmt.is_nop()).cloned().collect();
    for stmt in stmts {
        graph.insert_stmt_at_end(block, stmt);
    }
    graph[block].jump = JumpKind::Cond(cond_dest);
    graph.add_ref_pred(cond_dest, block);
    graph.remove_ref_pred(target, block);

    let new = graph.new_block_after(JumpKind::Always(target_next), block, true);
    graph.inherit_weight(new, block);
    graph.add_ref_pred(new, block);
    true
}

/// `target` is a conditional with at least two references that consists of a test of a local
/// against a constant, optionally preceded by a simple update of that local. Returns the local
/// whose value the predecessors should favor.
fn tail_duplication_candidate<S: Statement>(graph: &BlockGraph<S>, target: Block) -> Option<Local> {
    if !graph[target].jump.is_cond() || graph.ref_count(target) < 2 {
        return None;
    }
    let stmts: Vec<&S> = graph[target].stmts.iter().filter(|stmt| !stmt.is_nop()).collect();
    let (last, rest) = stmts.split_last()?;
    if !last.is_compare_branch() || !last.is_terminator() {
        return None;
    }
    let local = last.tested_local()?;
    match rest {
        [] => Some(local),
        [update] => match update.simple_local_update() {
            Some((dst, src)) if dst == local => Some(src),
            _ => None,
        },
        _ => None,
    }
}

/// One of the last two statements of `block` stores a value to `local` that makes a test of
/// `local` likely to fold.
fn block_end_favors_tail_duplication<S: Statement>(
    graph: &BlockGraph<S>,
    block: Block,
    local: Local,
) -> bool {
    if graph[block].is_run_rarely() {
        return false;
    }
    graph[block].stmts.iter().rev().take(2).any(|stmt| stmt.stores_favorable_value(local))
}
