use flowgraph::{
    Block, BlockFlags, BlockGraph, FlowOptConfig, JumpKind, Statement, LOOP_WEIGHT_SCALE,
    UNITY_WEIGHT, ZERO_WEIGHT,
};

#[cfg(test)]
mod tests;

/// Duplicates the conditional `dest` into `jump` when `jump` unconditionally jumps to `dest` and
/// `dest` jumps back to the block after `jump` (typically the test at the bottom of a loop
/// reached from the loop entry):
///
/// ```text
/// jump: jmp dest                jump: jtrue !cond
/// next: ...            =>             cond dest_next
/// ...                           next: ...
/// dest: jtrue cond              ...
///       cond next               dest: jtrue cond
/// dest_next: ...                      cond next
/// ```
///
/// This removes a jump from the path through `jump`. The copied code must fit in a small
/// budget that grows when the duplication separates hot from cold code.
pub fn optimize_branch<S: Statement>(
    graph: &mut BlockGraph<S>,
    config: &FlowOptConfig,
    jump: Block,
) -> bool {
    let JumpKind::Always(dest) = graph[jump].jump else { return false };
    if graph.jumps_to_next(jump)
        || graph[jump].flags.contains(BlockFlags::KEEP_ALWAYS)
        || graph.is_scratch(jump)
        || dest == jump
    {
        return false;
    }
    let JumpKind::Cond(dest_target) = graph[dest].jump else { return false };
    if !graph.next_is(jump, dest_target) {
        return false;
    }
    if !graph.same_try_region(jump, dest) {
        return false;
    }
    let Some(dest_next) = graph.next_block(dest) else { return false };
    if graph[dest_next].has_try_index() && !graph.same_try_region(jump, dest_next) {
        return false;
    }
    match graph[dest].stmts.last() {
        Some(stmt) if stmt.is_compare_branch() && stmt.is_terminator() => (),
        _ => return false,
    }

    let estimate: u32 = graph[dest].stmts.iter().map(|stmt| stmt.cost()).sum();
    let budget = duplication_budget(graph, config, jump, dest, dest_target);
    if estimate > budget {
        log::trace!("not duplicating {dest} into {jump}: cost {estimate} exceeds {budget}");
        return false;
    }

    log::debug!("duplicating the conditional {dest} into {jump}");
    let mut stmts: Vec<S> = graph[dest].stmts.clone();
    if let Some(last) = stmts.last_mut() {
        last.reverse_condition();
    }
    graph[jump].stmts.extend(stmts);
    let copied = graph[dest].flags & BlockFlags::COPY_PROPAGATE;
    graph[jump].flags.insert(copied);

    graph[jump].jump = JumpKind::Cond(dest_next);
    graph.add_ref_pred(dest_target, jump);
    graph.remove_ref_pred(dest, jump);
    graph.add_ref_pred(dest_next, jump);

    update_dest_weight(graph, jump, dest, dest_target, dest_next);
    true
}

fn duplication_budget<S>(
    graph: &BlockGraph<S>,
    config: &FlowOptConfig,
    jump: Block,
    dest: Block,
    next: Block,
) -> u32 {
    let (weight_jump, weight_dest, weight_next) =
        (graph[jump].weight, graph[dest].weight, graph[next].weight);
    let mut rare_jump = graph[jump].is_run_rarely();
    let mut rare_dest = graph[dest].is_run_rarely();
    let mut rare_next = graph[next].is_run_rarely();

    // with profile data the weights decide which blocks count as cold
    let profiled = |block: Block| graph[block].has_profile_weight() || graph[block].is_run_rarely();
    if graph.using_profile_weights && profiled(jump) && profiled(dest) && profiled(next) {
        if weight_jump * 100.0 < weight_dest {
            rare_jump = true;
        }
        if weight_next * 100.0 < weight_dest {
            rare_next = true;
        }
        if (weight_dest * 100.0 < weight_jump && weight_dest * 100.0 < weight_next)
            || weight_dest * 100.0 < weight_jump.max(weight_next)
        {
            rare_dest = true;
        }
    }

    let mut budget = config.tail_dup_budget;
    if rare_dest != rare_jump {
        budget += config.tail_dup_budget_step;
    }
    if rare_dest != rare_next {
        budget += config.tail_dup_budget_step;
    }
    if config.aot && rare_jump {
        budget *= config.aot_budget_factor;
    }
    budget
}

/// `dest` is no longer reached from `jump`, so it runs less often.
fn update_dest_weight<S>(
    graph: &mut BlockGraph<S>,
    jump: Block,
    dest: Block,
    dest_target: Block,
    dest_next: Block,
) {
    let weight_jump = graph[jump].weight;
    if weight_jump <= ZERO_WEIGHT {
        return;
    }
    let weight_dest = graph[dest].weight;
    let all_profiled = graph.using_profile_weights
        && [jump, dest, dest_target, dest_next]
            .iter()
            .all(|&block| graph[block].has_profile_weight());

    let data = &mut graph[dest];
    if all_profiled {
        if weight_dest > weight_jump {
            data.weight = weight_dest - weight_jump;
        } else if !data.is_run_rarely() {
            data.weight = UNITY_WEIGHT;
        }
    } else {
        // estimated weights of loop bodies are scaled, the entry path is a small share of them
        let new_weight = if weight_dest >= LOOP_WEIGHT_SCALE * UNITY_WEIGHT / 2.0 {
            weight_dest - weight_dest / LOOP_WEIGHT_SCALE
        } else {
            weight_dest - weight_jump
        };
        if new_weight > ZERO_WEIGHT {
            data.weight = new_weight;
        }
    }
}
