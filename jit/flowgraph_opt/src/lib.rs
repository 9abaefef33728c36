//! Optimization passes on the flow graph.
//!
//! [`optimize_flow_graph`] runs the whole pipeline: unreachable code removal, head and tail
//! merging, peeling of dominant switch cases, normalization of the graph ([`update_flow_graph`])
//! and profile guided block layout ([`reorder_blocks`]). The individual passes are exported as well.

mod compact;
mod merge;
mod normalize;
mod rarely_run;
mod reorder;
mod switch;
mod tail_dup;

#[cfg(test)]
mod tests;

use flowgraph::{BlockGraph, CfgResult, FlowAnalysis, FlowOptConfig, Statement};

pub use compact::{can_compact_blocks, compact_blocks};
pub use merge::head_tail_merge;
pub use normalize::{
    optimize_branch_to_empty_unconditional, optimize_branch_to_next, optimize_empty_block,
    optimize_uncond_branch_to_simple_cond, remove_conditional_jump, update_flow_graph,
};
pub use rarely_run::expand_rarely_run_blocks;
pub use reorder::reorder_blocks;
pub use switch::{optimize_switch_branches, optimize_switch_jumps};
pub use tail_dup::optimize_branch;

/// Runs the flow graph optimization pipeline. The analyses are recomputed for the final graph.
/// Returns whether the graph was modified.
pub fn optimize_flow_graph<S: Statement>(
    graph: &mut BlockGraph<S>,
    analysis: &mut FlowAnalysis,
    config: &FlowOptConfig,
) -> CfgResult<bool> {
    let mut modified = analysis.compute_reachability(graph, config)?;

    if config.head_tail_merge && head_tail_merge(graph, config) {
        modified = true;
    }
    if graph.using_profile_weights && optimize_switch_jumps(graph, config) {
        modified = true;
    }
    modified |= update_flow_graph(graph, config, config.tail_duplication)?;

    if config.reorder_blocks && reorder_blocks(graph, config)? {
        modified = true;
        update_flow_graph(graph, config, false)?;
    }

    if modified {
        // normalization can leave unreachable cycles behind
        analysis.compute_reachability(graph, config)?;
    }
    graph.validate()?;
    log::debug!("flow graph optimized, {} blocks left", graph.block_count());
    Ok(modified)
}
