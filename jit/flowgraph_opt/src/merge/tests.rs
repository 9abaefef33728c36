use expect_test::{expect, Expect};
use flowgraph::write::{decorate_graph, PredWriter};
use flowgraph::FlowOptConfig;
use flowgraph_reader::parse_graph;

use crate::head_tail_merge;

fn expect_test(src: &str, expect: Expect) {
    let mut graph = parse_graph(src).unwrap();
    assert!(head_tail_merge(&mut graph, &FlowOptConfig::default()));
    assert_eq!(graph.validate(), Ok(()));
    expect.assert_eq(&graph.to_string());
}

#[test]
fn common_tail_moves_into_successor() {
    let src = "
bb0:
    jtrue lt l1, 0
    cond bb2
bb1:
    l2 = 1
    l3 = add l3, 1
    jmp bb3
bb2:
    l2 = 2
    l3 = add l3, 1
    jmp bb3
bb3:
    ret l3
    return
";
    expect_test(
        src,
        expect![[r#"
            bb0:
                jtrue lt l1, 0
                cond bb2
            bb1:
                l2 = 1
                jmp bb3
            bb2:
                l2 = 2
                jmp bb3
            bb3:
                l3 = add l3, 1
                ret l3
                return
        "#]],
    );
}

#[test]
fn partial_tail_is_cross_jumped() {
    let src = "
bb0:
    jtrue lt l1, 0
    cond bb3
bb1:
    jtrue lt l2, 0
    cond bb4
bb2:
    l2 = 1
    l3 = add l3, 1
    jmp bb5
bb3:
    l3 = add l3, 1
    jmp bb5
bb4:
    l3 = 7
    jmp bb5
bb5:
    ret l3
    return
";
    expect_test(
        src,
        expect![[r#"
            bb0:
                jtrue lt l1, 0
                cond bb3
            bb1:
                jtrue lt l2, 0
                cond bb4
            bb2:
                l2 = 1
                jmp bb3
            bb3:
                l3 = add l3, 1
                jmp bb5
            bb4:
                l3 = 7
                jmp bb5
            bb5:
                ret l3
                return
        "#]],
    );
}

#[test]
fn identical_returns_are_shared() {
    let src = "
bb0:
    jtrue lt l1, 0
    cond bb2
bb1:
    ret l1
    return
bb2:
    ret l1
    return
";
    expect_test(
        src,
        expect![[r#"
            bb0:
                jtrue lt l1, 0
                cond bb2
            bb1:
                ret l1
                return
            bb2:
                jmp bb1
        "#]],
    );
}

#[test]
fn common_head_moves_before_conditional() {
    let src = "
bb0:
    jtrue lt l1, 0
    cond bb2
bb1:
    l2 = add l2, 1
    l3 = 1
    jmp bb3
bb2:
    l2 = add l2, 1
    l3 = 2
    jmp bb3
bb3:
    ret l3
    return
";
    expect_test(
        src,
        expect![[r#"
            bb0:
                l2 = add l2, 1
                jtrue lt l1, 0
                cond bb2
            bb1:
                l3 = 1
                jmp bb3
            bb2:
                l3 = 2
                jmp bb3
            bb3:
                ret l3
                return
        "#]],
    );
}

#[test]
fn head_stays_below_test_of_stored_local() {
    let src = "
bb0:
    jtrue lt l2, 0
    cond bb2
bb1:
    l2 = add l2, 1
    l3 = 1
    jmp bb3
bb2:
    l2 = add l2, 1
    l3 = 2
    jmp bb3
bb3:
    ret l3
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(!head_tail_merge(&mut graph, &FlowOptConfig::default()));
}

#[test]
fn cross_jump_forwards_edge_weights() {
    let src = "
graph [profile, edge_weights]
bb0 [prof_weight]:
    jtrue lt l1, 0
    cond bb3
bb1 [weight=60, prof_weight]:
    jtrue lt l2, 0
    cond bb4
bb2 [weight=20, prof_weight]:
    l2 = 1
    l3 = add l3, 1
    jmp bb5
bb3 [weight=40, prof_weight]:
    l3 = add l3, 1
    jmp bb5
bb4 [weight=40, prof_weight]:
    l3 = 7
    jmp bb5
bb5 [prof_weight]:
    ret l3
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(head_tail_merge(&mut graph, &FlowOptConfig::default()));
    assert_eq!(graph.validate(), Ok(()));
    let mut out = String::new();
    decorate_graph(&mut PredWriter, &mut out, &graph).unwrap();
    expect![[r#"
        graph [profile, edge_weights]
        bb0 [prof_weight]:
            jtrue lt l1, 0
            cond bb3
        ; preds: bb0(0..60)
        bb1 [weight=60, prof_weight]:
            jtrue lt l2, 0
            cond bb4
        ; preds: bb1(0..20)
        bb2 [weight=20, prof_weight]:
            l2 = 1
            jmp bb3
        ; preds: bb0(0..40) bb2(20..20)
        bb3 [weight=60, prof_weight]:
            l3 = add l3, 1
            jmp bb5
        ; preds: bb1(0..40)
        bb4 [weight=40, prof_weight]:
            l3 = 7
            jmp bb5
        ; preds: bb3(60..60) bb4(40..40)
        bb5 [prof_weight]:
            ret l3
            return
    "#]]
    .assert_eq(&out);
}
