//! The flow analyses of one function and the driver loops that keep them current.

use bitflags::bitflags;
use bitset::BitSet;

use crate::reachability::remove_unreachable_blocks;
use crate::{
    Block, BlockGraph, CfgError, CfgResult, DominatorTree, FlowOptConfig, Reachability, Statement,
};

bitflags! {
    /// What [`FlowAnalysis::update_changed_flow_graph`] recomputes besides the reach sets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FlowGraphUpdates: u8 {
        const COMPUTE_DOMS = 1 << 0;
        const COMPUTE_RETURNS = 1 << 1;
    }
}

/// Reachability and dominance of the block graph.
///
/// Both analyses remember the graph epoch they were computed for; every edge or layout change
/// bumps the epoch and thereby invalidates them. Dominance and reachability queries stay usable
/// after small changes (see [`DominatorTree::dominates`] and [`FlowAnalysis::reachable`]).
#[derive(Debug, Clone, Default)]
pub struct FlowAnalysis {
    pub reach: Reachability,
    pub doms: DominatorTree,
}

impl FlowAnalysis {
    pub fn new() -> FlowAnalysis {
        FlowAnalysis::default()
    }

    pub fn invalidate(&mut self) {
        self.reach.invalidate();
        self.doms.invalidate();
    }

    /// Removes unreachable blocks until none are left and computes the dominators of the
    /// remaining graph. Returns whether the graph was modified.
    pub fn compute_reachability<S: Statement>(
        &mut self,
        graph: &mut BlockGraph<S>,
        config: &FlowOptConfig,
    ) -> CfgResult<bool> {
        self.reach.compute_return_blocks(graph);

        let mut modified = false;
        let mut pass = 1;
        loop {
            if pass > config.iteration_limit {
                return Err(CfgError::IterationLimit {
                    pass: "unreachable block removal",
                    limit: config.iteration_limit,
                });
            }
            pass += 1;

            modified |= graph.renumber();
            self.reach.compute_enter_blocks(graph, config);
            self.reach.compute_dfs(graph);
            self.reach.compute_reach_sets(graph);

            let reach = &self.reach;
            let changed = remove_unreachable_blocks(graph, |_, block| reach.is_unreachable(block));
            modified |= changed;
            if !changed {
                break;
            }
        }

        // removal leaves the numbering stale
        if !graph.is_numbered() {
            graph.renumber();
            self.reach.compute_enter_blocks(graph, config);
            self.reach.compute_dfs(graph);
            self.reach.compute_reach_sets(graph);
        }
        self.doms.compute(graph, &self.reach)?;
        Ok(modified)
    }

    /// Recomputes the analyses after the passes changed the graph.
    pub fn update_changed_flow_graph<S: Statement>(
        &mut self,
        graph: &mut BlockGraph<S>,
        updates: FlowGraphUpdates,
        config: &FlowOptConfig,
    ) -> CfgResult<()> {
        if updates.contains(FlowGraphUpdates::COMPUTE_RETURNS) {
            self.reach.compute_return_blocks(graph);
        }
        graph.renumber();
        self.reach.compute_enter_blocks(graph, config);
        self.reach.compute_dfs(graph);
        self.reach.compute_reach_sets(graph);
        if updates.contains(FlowGraphUpdates::COMPUTE_DOMS) {
            self.doms.compute(graph, &self.reach)?;
        } else {
            self.doms.invalidate();
        }
        Ok(())
    }

    pub fn dominates<S>(&self, graph: &BlockGraph<S>, a: Block, b: Block) -> bool {
        self.doms.dominates(graph, a, b)
    }

    /// `from` can reach `to`.
    ///
    /// Blocks created after the reach sets were computed are handled by walking the graph through
    /// new blocks until blocks with reach sets are found.
    pub fn reachable<S>(&self, graph: &BlockGraph<S>, from: Block, to: Block) -> bool {
        if from == to {
            return true;
        }
        let domain = self.reach.domain();
        let is_new = |block: Block| block.index() >= domain;

        // the blocks with reach sets that `to` can be reached from through new blocks
        let mut targets = Vec::new();
        let mut seen_back = BitSet::new_empty(graph.arena_len());
        let mut stack = vec![to];
        while let Some(block) = stack.pop() {
            if !is_new(block) {
                targets.push(block);
                continue;
            }
            if !seen_back.insert(block) {
                continue;
            }
            for pred in graph.pred_blocks(block) {
                if pred == from {
                    return true;
                }
                stack.push(pred);
            }
        }

        // the blocks with reach sets that `from` reaches through new blocks
        let mut sources = Vec::new();
        let mut seen_fwd = BitSet::new_empty(graph.arena_len());
        stack.push(from);
        while let Some(block) = stack.pop() {
            if !is_new(block) {
                sources.push(block);
                continue;
            }
            if !seen_fwd.insert(block) {
                continue;
            }
            if seen_back.contains(block) {
                return true;
            }
            for succ in graph.successors(block) {
                if succ == to {
                    return true;
                }
                stack.push(succ);
            }
        }

        sources.iter().any(|&source| {
            targets.iter().any(|&target| {
                self.reach.reach_set(target).map_or(false, |reach| reach.contains(source))
            })
        })
    }
}
