//! Simplification of switch jumps. The dominant case peel runs once per pipeline, ahead of
//! normalization.

use flowgraph::weight::sub_weights;
use flowgraph::{Block, BlockGraph, FlowOptConfig, JumpKind, Statement};

use crate::normalize::{drop_terminator, is_empty_always};

#[cfg(test)]
mod tests;

/// Simplifies the switch jump of `block`:
///
/// * table entries that lead to an empty `Always` block are redirected to its target,
/// * a switch with a single distinct target becomes an `Always` jump,
/// * a switch with two entries whose default is the lexical successor becomes a `Cond` jump
///   that compares the switch value against zero.
pub fn optimize_switch_branches<S: Statement>(graph: &mut BlockGraph<S>, block: Block) -> bool {
    let Some(table) = graph[block].jump.switch_table() else { return false };
    let mut changed = false;

    let mut targets = table.unique_targets();
    while let Some(pos) = targets.iter().position(|&dest| bypassable(graph, block, dest)) {
        let dest = targets[pos];
        let JumpKind::Always(final_dest) = graph[dest].jump else { break };

        if graph.using_profile_weights
            && graph.have_valid_edge_weights
            && graph[dest].has_profile_weight()
        {
            if let Some(edge) = graph.pred_edge(dest, block) {
                let edge_min = edge.weight_min;
                let data = &mut graph[dest];
                data.weight = sub_weights(data.weight, edge_min);
            }
        }

        log::debug!("switch {block} now jumps to {final_dest} instead of the empty {dest}");
        graph.replace_switch_target(block, final_dest, dest);
        changed = true;
        targets = match graph[block].jump.switch_table() {
            Some(table) => table.unique_targets(),
            None => break,
        };
    }

    let Some(table) = graph[block].jump.switch_table() else { return changed };
    let unique = table.unique_targets();
    let entries = table.targets.clone();

    if let [target] = unique[..] {
        log::debug!("switch {block} has the single target {target}");
        drop_terminator(graph, block);
        graph[block].jump = JumpKind::Always(target);
        for _ in 1..entries.len() {
            graph.remove_ref_pred(target, block);
        }
        return true;
    }

    if let [case, default] = entries[..] {
        if graph.next_is(block, default) {
            let compare = graph[block].stmts.last().and_then(|stmt| stmt.switch_to_zero_compare());
            if let Some(compare) = compare {
                log::debug!("switch {block} becomes a conditional jump to {case}");
                if let Some(last) = graph[block].stmts.last_mut() {
                    *last = compare;
                }
                graph[block].jump = JumpKind::Cond(case);
                return true;
            }
        }
    }

    changed
}

fn bypassable<S: Statement>(graph: &BlockGraph<S>, block: Block, dest: Block) -> bool {
    dest != block
        && is_empty_always(graph, dest)
        && (!graph[dest].has_try_index() || graph.same_try_region(block, dest))
}

/// Peels the dominant case off of hot switches with profile data:
///
/// ```text
/// block: ...                     block: ...
///        switch l1                      jtrue eq l1, <case>
///        switch [...]   =>              cond <dominant target>
///                                new:   switch l1
///                                       switch [...]
/// ```
///
/// The test of the dominant case is cheaper than the dispatch through the table.
pub fn optimize_switch_jumps<S: Statement>(
    graph: &mut BlockGraph<S>,
    config: &FlowOptConfig,
) -> bool {
    let mut modified = false;
    let blocks: Vec<Block> = graph.blocks().collect();
    for block in blocks {
        let data = &graph[block];
        if data.is_run_rarely() || !data.has_profile_weight() {
            continue;
        }
        let Some(table) = data.jump.switch_table() else { continue };
        let Some(dominant) = table.dominant else { continue };
        let in_table = dominant.case < table.targets.len();
        if !in_table || dominant.fraction < config.dominant_case_threshold {
            continue;
        }
        let dominant_target = table.targets[dominant.case];

        if !graph.has_terminator(block) {
            continue;
        }
        let switch_pos = data.stmts.len() - 1;
        let Some(compare) = data.stmts[switch_pos].switch_case_compare(dominant.case) else {
            continue;
        };

        log::debug!("peeling case {} of the switch in {block}", dominant.case);
        let new = graph.split_at(block, switch_pos);
        graph.insert_stmt_at_end(block, compare);
        graph[block].jump = JumpKind::Cond(dominant_target);
        graph.add_ref_pred(dominant_target, block);

        let weight = graph[block].weight;
        let to_target = weight * dominant.fraction;
        let to_new = sub_weights(weight, to_target);
        graph.set_profile_weight(new, to_new);
        if let Some(edge) = graph.pred_edge_mut(dominant_target, block) {
            edge.set_weights(to_target, to_target);
        }
        if let Some(edge) = graph.pred_edge_mut(new, block) {
            edge.set_weights(to_new, to_new);
        }
        if let Some(edge) = graph.pred_edge_mut(dominant_target, new) {
            if edge.dup_count == 1 {
                edge.set_weights(0.0, 0.0);
            } else {
                let min = sub_weights(edge.weight_min, to_target);
                let max = sub_weights(edge.weight_max, to_target);
                edge.set_weights(min, max);
            }
        }
        if let Some(table) = graph[new].jump.switch_table_mut() {
            table.dominant = None;
        }
        modified = true;
    }
    modified
}
