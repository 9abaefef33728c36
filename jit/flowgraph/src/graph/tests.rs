use crate::test_utils::{bb, diamond, graph, TestStmt};
use crate::{BlockFlags, CfgError, EhRegion, HandlerKind, JumpKind, SwitchTable};

#[test]
fn preds_mirror_jumps() {
    let graph = diamond();
    assert!(graph.preds(bb(0)).is_empty());
    assert_eq!(graph.ref_count(bb(0)), 1);
    assert_eq!(graph.pred_blocks(bb(1)).collect::<Vec<_>>(), [bb(0)]);
    assert_eq!(graph.pred_blocks(bb(4)).collect::<Vec<_>>(), [bb(2), bb(3)]);
    assert_eq!(graph.ref_count(bb(4)), 2);
    assert_eq!(graph.successors(bb(1)).as_slice(), [bb(2), bb(3)]);
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn switch_duplicates() {
    let graph = graph(vec![
        (vec![TestStmt::Test(0)], JumpKind::Switch(SwitchTable::new(vec![bb(1), bb(1), bb(2)]))),
        (vec![], JumpKind::Return),
        (vec![], JumpKind::Return),
    ]);
    let edge = graph.pred_edge(bb(1), bb(0)).unwrap();
    assert_eq!(edge.dup_count, 2);
    assert_eq!(graph.ref_count(bb(1)), 2);
    assert_eq!(graph.successors(bb(0)).as_slice(), [bb(1), bb(2)]);
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn redirect_moves_weight_share() {
    // the conditional reaches bb1 through both arms
    let mut graph = graph(vec![
        (vec![TestStmt::Test(0)], JumpKind::Cond(bb(1))),
        (vec![], JumpKind::Return),
        (vec![], JumpKind::Return),
    ]);
    graph.pred_edge_mut(bb(1), bb(0)).unwrap().set_weights(40.0, 60.0);

    graph.redirect_edge(bb(0), bb(1), bb(2));

    assert_eq!(graph[bb(0)].jump, JumpKind::Cond(bb(2)));
    let kept = graph.pred_edge(bb(1), bb(0)).unwrap();
    assert_eq!((kept.dup_count, kept.weight_min, kept.weight_max), (1, 20.0, 30.0));
    let moved = graph.pred_edge(bb(2), bb(0)).unwrap();
    assert_eq!((moved.dup_count, moved.weight_min, moved.weight_max), (1, 20.0, 30.0));
    assert_eq!(graph.ref_count(bb(1)), 1);
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn split_moves_tail_and_jump() {
    let mut graph = graph(vec![
        (
            vec![TestStmt::Op(1), TestStmt::Op(2), TestStmt::Test(3)],
            JumpKind::Cond(bb(2)),
        ),
        (vec![], JumpKind::Return),
        (vec![], JumpKind::Return),
    ]);
    graph[bb(0)].flags.insert(BlockFlags::DONT_REMOVE | BlockFlags::KEEP_ALWAYS);

    let new = graph.split_at(bb(0), 1);

    assert_eq!(graph[bb(0)].stmts, [TestStmt::Op(1)]);
    assert_eq!(graph[bb(0)].jump, JumpKind::Always(new));
    assert_eq!(graph[new].stmts, [TestStmt::Op(2), TestStmt::Test(3)]);
    assert_eq!(graph[new].jump, JumpKind::Cond(bb(2)));
    assert!(graph.next_is(bb(0), new));
    assert_eq!(graph.pred_blocks(bb(1)).collect::<Vec<_>>(), [new]);
    assert_eq!(graph.pred_blocks(bb(2)).collect::<Vec<_>>(), [new]);
    assert_eq!(graph.pred_blocks(new).collect::<Vec<_>>(), [bb(0)]);

    assert!(graph[bb(0)].flags.contains(BlockFlags::DONT_REMOVE));
    assert!(!graph[bb(0)].flags.contains(BlockFlags::KEEP_ALWAYS));
    assert!(!graph[new].flags.contains(BlockFlags::DONT_REMOVE));
    assert!(graph[new].flags.contains(BlockFlags::KEEP_ALWAYS));
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn split_after_statement_keeps_statement() {
    let mut graph = graph(vec![
        (vec![TestStmt::Op(1), TestStmt::Op(2)], JumpKind::Return),
    ]);

    let new = graph.split_after_statement(bb(0), 0);

    assert_eq!(graph[bb(0)].stmts, [TestStmt::Op(1)]);
    assert_eq!(graph[new].stmts, [TestStmt::Op(2)]);
    assert_eq!(graph[new].jump, JumpKind::Return);
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn filter_starts_the_handler() {
    let mut graph = graph(vec![
        (vec![TestStmt::Op(1)], JumpKind::Always(bb(3))),
        (vec![TestStmt::Op(2)], JumpKind::FilterReturn(bb(2))),
        (vec![TestStmt::Op(3)], JumpKind::CatchReturn(bb(3))),
        (vec![], JumpKind::Return),
    ]);
    let region = graph.add_eh_region(EhRegion {
        kind: HandlerKind::Filter,
        try_begin: bb(0),
        try_last: bb(0),
        hnd_begin: bb(2),
        hnd_last: bb(2),
        filter_begin: bb(1).into(),
        enclosing_try: None.into(),
    });

    assert_eq!(graph.eh[region].handler_entry(), bb(1));
    assert!(graph.eh.is_filter_begin(bb(1)));
    assert!(!graph.eh.is_filter_begin(bb(2)));
    assert!(graph.eh.is_handler_begin(bb(1)));
    assert!(graph.eh.is_try_begin(bb(0)));
    assert_eq!(graph.eh.handler_entries().collect::<Vec<_>>(), [bb(1), bb(2)]);
}

#[test]
fn remove_empty_block() {
    let mut graph = graph(vec![
        (vec![], JumpKind::Always(bb(1))),
        (vec![TestStmt::Nop], JumpKind::Always(bb(2))),
        (vec![], JumpKind::Return),
    ]);

    graph.remove_block(bb(1), false);

    assert!(!graph.is_in_layout(bb(1)));
    assert!(graph[bb(1)].flags.is_removed());
    assert_eq!(graph[bb(0)].jump, JumpKind::Always(bb(2)));
    assert_eq!(graph.pred_blocks(bb(2)).collect::<Vec<_>>(), [bb(0)]);
    assert_eq!(graph.block_count(), 2);
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn new_first_block_takes_entry_ref() {
    let mut graph = graph(vec![(vec![], JumpKind::Return)]);

    let entry = graph.new_block_before(JumpKind::Always(bb(0)), bb(0), true);

    assert_eq!(graph.first_block(), Some(entry));
    assert_eq!(graph.ref_count(entry), 1);
    assert_eq!(graph.ref_count(bb(0)), 1);
    assert!(graph[entry].flags.contains(BlockFlags::INTERNAL));
    assert!(!graph.is_numbered());

    assert!(graph.renumber());
    assert_eq!((graph[entry].num, graph[bb(0)].num), (1, 2));
    assert_eq!(graph.validate(), Ok(()));
    assert!(!graph.renumber());
}

#[test]
fn fall_through_reconnected_after_move() {
    let mut graph = graph(vec![
        (vec![TestStmt::Test(0)], JumpKind::Cond(bb(2))),
        (vec![], JumpKind::Return),
        (vec![], JumpKind::Return),
    ]);

    graph.move_range_after(bb(1), bb(1), bb(2));
    let jmp = graph.connect_fall_through(bb(0), bb(1)).unwrap();

    assert!(graph.next_is(bb(0), jmp));
    assert_eq!(graph[jmp].jump, JumpKind::Always(bb(1)));
    assert_eq!(graph.pred_blocks(bb(1)).collect::<Vec<_>>(), [jmp]);
    assert_eq!(graph.pred_blocks(jmp).collect::<Vec<_>>(), [bb(0)]);
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn validate_reports_dangling_edge() {
    let mut graph = diamond();
    graph[bb(2)].jump = JumpKind::Always(bb(3));
    assert_eq!(graph.validate(), Err(CfgError::DanglingEdge { from: bb(2), to: bb(3) }));
}

#[test]
fn code_estimate_counts_jump_and_stmts() {
    let graph = diamond();
    assert_eq!(graph.code_estimate(bb(1)), 3);
    assert_eq!(graph.measure_ir(), 2 + 3 + 2 + 2 + 3);
}
