use crate::test_utils::{bb, diamond, graph, TestStmt};
use crate::{
    remove_dead_blocks, BlockFlags, EhRegion, FlowAnalysis, FlowOptConfig, HandlerKind, JumpKind,
};

fn catch_region(try_block: usize, handler: usize) -> EhRegion {
    EhRegion {
        kind: HandlerKind::Catch,
        try_begin: bb(try_block),
        try_last: bb(try_block),
        hnd_begin: bb(handler),
        hnd_last: bb(handler),
        filter_begin: None.into(),
        enclosing_try: None.into(),
    }
}

#[test]
fn block_orphaned_by_redirect_is_removed() {
    let mut graph = graph(vec![
        (vec![], JumpKind::Always(bb(1))),
        (vec![TestStmt::Op(1)], JumpKind::Always(bb(2))),
        (vec![], JumpKind::Return),
    ]);
    graph.redirect_edge(bb(0), bb(1), bb(2));
    assert_eq!(graph.ref_count(bb(1)), 0);

    let mut analysis = FlowAnalysis::new();
    let changed = analysis.compute_reachability(&mut graph, &FlowOptConfig::default());

    assert_eq!(changed, Ok(true));
    assert!(!graph.is_in_layout(bb(1)));
    assert_eq!(graph.blocks().collect::<Vec<_>>(), [bb(0), bb(2)]);
    assert_eq!(graph.pred_blocks(bb(2)).collect::<Vec<_>>(), [bb(0)]);
    assert_eq!(graph.ref_count(bb(2)), 1);
    assert!(graph.is_numbered());
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn protected_block_becomes_throw_stub() {
    let mut graph = graph(vec![
        (vec![], JumpKind::Return),
        (vec![TestStmt::Op(1)], JumpKind::Always(bb(3))),
        (vec![TestStmt::Op(2)], JumpKind::CatchReturn(bb(3))),
        (vec![], JumpKind::Return),
    ]);
    graph.add_eh_region(catch_region(1, 2));
    graph.compute_preds();

    let mut analysis = FlowAnalysis::new();
    let changed = analysis.compute_reachability(&mut graph, &FlowOptConfig::default());

    assert_eq!(changed, Ok(true));
    assert!(graph.is_in_layout(bb(1)));
    assert_eq!(graph[bb(1)].jump, JumpKind::Throw);
    assert!(graph[bb(1)].stmts.is_empty());
    assert!(graph[bb(1)].is_run_rarely());
    assert!(graph[bb(1)].flags.contains(BlockFlags::IMPORTED));
    assert_eq!(graph.pred_blocks(bb(3)).collect::<Vec<_>>(), [bb(2)]);

    // the handler is an entry of its own
    assert!(analysis.reach.is_enter_block(bb(2)));
    assert!(graph[bb(2)].flags.contains(BlockFlags::DOMINATED_BY_EXCEPTIONAL_ENTRY));
    assert!(graph[bb(3)].flags.contains(BlockFlags::DOMINATED_BY_EXCEPTIONAL_ENTRY));
    assert!(!graph[bb(0)].flags.contains(BlockFlags::DOMINATED_BY_EXCEPTIONAL_ENTRY));
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn reach_sets_follow_back_edges() {
    let mut graph = graph(vec![
        (vec![], JumpKind::Always(bb(1))),
        (vec![TestStmt::Test(1)], JumpKind::Cond(bb(1))),
        (vec![], JumpKind::Return),
    ]);
    let mut analysis = FlowAnalysis::new();
    assert_eq!(analysis.compute_reachability(&mut graph, &FlowOptConfig::default()), Ok(false));

    let reach = analysis.reach.reach_set(bb(2)).unwrap();
    assert_eq!(reach.iter().collect::<Vec<_>>(), [bb(0), bb(1), bb(2)]);
    assert!(analysis.reachable(&graph, bb(1), bb(1)));
    assert!(analysis.reachable(&graph, bb(0), bb(2)));
    assert!(!analysis.reachable(&graph, bb(2), bb(0)));
    assert_eq!(analysis.reach.return_blocks(), [bb(2)]);
}

#[test]
fn queries_on_new_blocks() {
    let mut graph = diamond();
    let mut analysis = FlowAnalysis::new();
    assert_eq!(analysis.compute_reachability(&mut graph, &FlowOptConfig::default()), Ok(false));

    // bb2 now jumps to bb4 through a fresh block
    let new = graph.split_at_end(bb(2));
    assert!(analysis.reach.reach_set(new).is_none());

    assert!(analysis.reachable(&graph, bb(0), new));
    assert!(analysis.reachable(&graph, new, bb(4)));
    assert!(!analysis.reachable(&graph, new, bb(3)));
    assert!(analysis.dominates(&graph, bb(1), new));
    assert!(analysis.dominates(&graph, bb(2), new));
    assert!(!analysis.dominates(&graph, bb(3), new));
    assert!(!analysis.dominates(&graph, new, bb(4)));
    assert!(analysis.dominates(&graph, new, new));
}

#[test]
fn dead_blocks_outside_handlers() {
    let mut graph = graph(vec![
        (vec![TestStmt::Op(0)], JumpKind::Always(bb(2))),
        (vec![TestStmt::Op(1)], JumpKind::Return),
        (vec![], JumpKind::Return),
        (vec![TestStmt::Op(3)], JumpKind::CatchReturn(bb(2))),
    ]);
    graph.add_eh_region(catch_region(0, 3));
    graph.compute_preds();

    assert_eq!(remove_dead_blocks(&mut graph, &FlowOptConfig::default()), Ok(true));
    assert_eq!(graph.blocks().collect::<Vec<_>>(), [bb(0), bb(2), bb(3)]);
    assert_eq!(graph.validate(), Ok(()));

    assert_eq!(remove_dead_blocks(&mut graph, &FlowOptConfig::default()), Ok(false));
}
