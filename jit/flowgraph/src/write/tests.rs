use expect_test::expect;

use crate::test_utils::{bb, diamond};
use crate::write::{decorate_graph, PredWriter};
use crate::{BlockFlags, EhRegion, HandlerKind, LoopDesc};

#[test]
fn plain() {
    let mut graph = diamond();
    graph.set_run_rarely(bb(3));
    graph.return_block = bb(4).into();

    let expected = expect![[r#"
        graph [return=bb4]
        bb0:
            jmp bb1
        bb1:
            test 1
            cond bb3
        bb2:
            jmp bb4
        bb3 [weight=0, run_rarely]:
            jmp bb4
        bb4:
            return
    "#]];
    expected.assert_eq(&graph.to_string());
}

#[test]
fn regions_and_loops() {
    let mut graph = diamond();
    graph.add_eh_region(EhRegion {
        kind: HandlerKind::Finally,
        try_begin: bb(2),
        try_last: bb(2),
        hnd_begin: bb(3),
        hnd_last: bb(3),
        filter_begin: None.into(),
        enclosing_try: None.into(),
    });
    graph.loops.push(LoopDesc {
        head: bb(0).into(),
        top: bb(1),
        entry: bb(1),
        bottom: bb(2),
        exit: None.into(),
        removed: false,
    });
    graph[bb(1)].flags.insert(BlockFlags::LOOP_HEAD);

    let expected = expect![[r#"
        eh0 finally try bb2..bb2 handler bb3..bb3
        loop0 top bb1 entry bb1 bottom bb2 head bb0
        bb0:
            jmp bb1
        bb1 [loop_head]:
            test 1
            cond bb3
        bb2 [dont_remove]:
            jmp bb4
        bb3 [dont_remove]:
            jmp bb4
        bb4:
            return
    "#]];
    expected.assert_eq(&graph.to_string());
}

#[test]
fn with_preds() {
    let graph = diamond();
    let mut out = String::new();
    decorate_graph(&mut PredWriter, &mut out, &graph).unwrap();

    let expected = expect![[r#"
        bb0:
            jmp bb1
        ; preds: bb0
        bb1:
            test 1
            cond bb3
        ; preds: bb1
        bb2:
            jmp bb4
        ; preds: bb1
        bb3:
            jmp bb4
        ; preds: bb2 bb3
        bb4:
            return
    "#]];
    expected.assert_eq(&out);
}
