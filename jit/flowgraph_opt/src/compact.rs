use std::mem;

use flowgraph::{Block, BlockFlags, BlockGraph, FlowOptConfig, JumpKind, Statement, ZERO_WEIGHT};

#[cfg(test)]
mod tests;

/// `next` can be merged into `block`: `block` unconditionally jumps to its lexical successor
/// `next` and no structural property (regions, loops, sections, switch tables) is lost by
/// merging the two.
pub fn can_compact_blocks<S: Statement>(
    graph: &BlockGraph<S>,
    config: &FlowOptConfig,
    block: Block,
    next: Block,
) -> bool {
    if !graph.next_is(block, next) || graph[block].jump != JumpKind::Always(next) {
        return false;
    }
    let data = &graph[block];
    let next_data = &graph[next];
    if data.flags.contains(BlockFlags::KEEP_ALWAYS) {
        return false;
    }

    // other predecessors of `next` end up jumping to `block`, so `block` must not contribute
    // any code of its own
    let shared = graph.ref_count(next) != 1;
    if shared && (!graph.is_empty(block) || graph.eh.is_handler_begin(block)) {
        return false;
    }

    if next_data.flags.contains(BlockFlags::DONT_REMOVE) || graph.return_block.is(next) {
        return false;
    }
    if config.loops_require_preheaders
        && data.flags.contains(BlockFlags::LOOP_PREHEADER)
        && shared
    {
        return false;
    }
    if graph.is_scratch(block) || graph.loops.is_loop_entry(block) {
        return false;
    }
    if graph.in_different_sections(block, next) || !graph.same_eh_region(block, next) {
        return false;
    }
    if shared && next_data.flags.contains(BlockFlags::LOOP_ALIGN) {
        return false;
    }
    if let (Some(a), Some(b)) = (data.loop_num.expand(), next_data.loop_num.expand()) {
        if a != b {
            return false;
        }
    }

    // switch tables refer to their targets directly
    !graph.pred_blocks(next).any(|pred| graph[pred].jump.is_switch())
}

/// Merges `next` into `block`. Must only be called if [`can_compact_blocks`] holds.
///
/// `block` takes over the statements and the jump of `next`, other predecessors of `next` are
/// redirected to `block`. The weight of the merged block is the maximum of both weights.
pub fn compact_blocks<S: Statement>(graph: &mut BlockGraph<S>, block: Block, next: Block) {
    debug_assert!(graph.next_is(block, next));
    debug_assert!(!graph[next].flags.is_removed());
    log::debug!("compacting {next} into {block}");

    graph.remove_ref_pred(next, block);

    if graph.ref_count(next) > 0 {
        debug_assert!(graph.is_empty(block));
        graph[block].flags.remove(BlockFlags::LOOP_PREHEADER);
        let preds: Vec<Block> = graph.pred_blocks(next).collect();
        for pred in preds {
            graph.redirect_edge(pred, next, block);
        }
        debug_assert_eq!(graph.ref_count(next), 0, "{next} has implicit references");
    }

    let stmts = mem::take(&mut graph[next].stmts);
    graph[block].stmts.extend(stmts);

    merge_weights(graph, block, next);

    let next_flags = graph[next].flags;
    let flags = &mut graph[block].flags;
    if flags.contains(BlockFlags::INTERNAL) && !next_flags.contains(BlockFlags::INTERNAL) {
        flags.remove(BlockFlags::INTERNAL);
        flags.insert(BlockFlags::IMPORTED);
    }
    graph[block].flags.insert(next_flags & BlockFlags::COMPACT_UPD);

    // the fall through of a conditional `next` is its lexical successor, which only stays
    // reachable through `next` until it is unlinked
    let succs = graph.successors(next);
    graph[next].flags.insert(BlockFlags::REMOVED);
    graph.unlink(next);
    graph.eh.update_for_deleted_block(next, Some(block));
    if graph.first_cold.is(next) {
        graph.first_cold = graph.next_block(block).into();
    }

    let jump = mem::replace(&mut graph[next].jump, JumpKind::Throw);
    graph[block].jump = jump;
    for succ in succs {
        graph.replace_pred(succ, next, block);
    }

    if next_flags.contains(BlockFlags::LOOP_ALIGN) {
        graph[block].flags.insert(BlockFlags::LOOP_ALIGN);
        graph[next].flags.remove(BlockFlags::LOOP_ALIGN);
    }
    if let JumpKind::Always(target) | JumpKind::Cond(target) = graph[block].jump {
        if graph[target].flags.contains(BlockFlags::LOOP_ALIGN) {
            graph[block].loop_num = graph[next].loop_num;
        }
    }

    graph.loops.update_after_compacting(block, next);
}

fn merge_weights<S>(graph: &mut BlockGraph<S>, block: Block, next: Block) {
    if graph[next].jump.is_throw() {
        graph.set_run_rarely(block);
        return;
    }

    let (data, next_data) = (&graph[block], &graph[next]);
    let has_profile = data.has_profile_weight() || next_data.has_profile_weight();
    if has_profile || data.weight > ZERO_WEIGHT || next_data.weight > ZERO_WEIGHT {
        let weight = data.weight.max(next_data.weight);
        if has_profile {
            graph.set_profile_weight(block, weight);
        } else {
            let data = &mut graph[block];
            data.weight = weight;
            data.flags.remove(BlockFlags::RUN_RARELY);
        }
    } else {
        graph.set_run_rarely(block);
    }
}
