use flowgraph::{Block, BlockGraph, JumpKind};
use workqueue::WorkQueue;

#[cfg(test)]
mod tests;

/// Marks blocks as rarely run when that follows from their neighbours:
///
/// * a block whose successors are all rarely run is rarely run,
/// * a block whose predecessors are all rarely run is rarely run unless it is an entry of the
///   function or of a handler,
/// * both halves of a call-handler pair share their rarity.
///
/// Blocks with profile weights keep their measured weight. Returns whether a block was marked.
pub fn expand_rarely_run_blocks<S>(graph: &mut BlockGraph<S>) -> bool {
    let mut queue: WorkQueue<Block> = WorkQueue::with_none(graph.arena_len());
    queue.extend(graph.blocks());

    let mut changed = false;
    while let Some(block) = queue.pop() {
        if !graph.is_in_layout(block) || graph[block].is_run_rarely() {
            continue;
        }
        let Some(reason) = rarely_run_reason(graph, block) else { continue };
        log::debug!("{block} is rarely run: {reason}");
        graph.set_run_rarely(block);
        changed = true;

        // the blocks whose rarity depends on `block`
        queue.extend(graph.pred_blocks(block));
        queue.extend(graph.successors(block));
        queue.extend(graph.prev_block(block));
        queue.extend(graph.next_block(block));
    }
    changed
}

fn rarely_run_reason<S>(graph: &BlockGraph<S>, block: Block) -> Option<&'static str> {
    let data = &graph[block];
    if data.has_profile_weight() {
        return None;
    }
    let rare = |block: Block| graph[block].is_run_rarely();

    match data.jump {
        JumpKind::Always(target) if target != block && rare(target) => {
            return Some("it jumps to a rarely run block");
        }
        JumpKind::Cond(target) => {
            if graph.next_block(block).map_or(false, rare) && rare(target) {
                return Some("both arms of its conditional are rarely run");
            }
        }
        JumpKind::CallHandler(_) if graph.is_call_handler_pair_head(block) => {
            if graph.next_block(block).map_or(false, rare) {
                return Some("the continuation of its handler call is rarely run");
            }
        }
        _ => (),
    }

    if graph.is_call_handler_pair_tail(block) {
        if graph.prev_block(block).map_or(false, rare) {
            return Some("its handler call is rarely run");
        }
        // the continuation is entered through the handler returns, not through the call
        return None;
    }

    if graph.is_first(block) || graph.eh.is_handler_begin(block) {
        return None;
    }
    let preds = graph.preds(block);
    if !preds.is_empty() && preds.iter().all(|edge| rare(edge.source)) {
        return Some("all of its predecessors are rarely run");
    }
    None
}
