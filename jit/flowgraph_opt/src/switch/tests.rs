use expect_test::expect;
use flowgraph::{Block, FlowOptConfig};
use flowgraph_reader::parse_graph;

use crate::{optimize_switch_branches, optimize_switch_jumps};

fn bb(n: u32) -> Block {
    Block::from(n)
}

#[test]
fn single_target_switch_becomes_jump() {
    let src = "
bb0:
    switch l1
    switch [bb1, bb1, bb1]
bb1:
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(optimize_switch_branches(&mut graph, bb(0)));
    assert_eq!(graph.pred_edge(bb(1), bb(0)).map(|edge| edge.dup_count), Some(1));
    assert_eq!(graph.ref_count(bb(1)), 1);
    assert_eq!(graph.validate(), Ok(()));
    expect![[r#"
        bb0:
            jmp bb1
        bb1:
            return
    "#]]
    .assert_eq(&graph.to_string());
}

#[test]
fn two_entry_switch_becomes_conditional() {
    let src = "
bb0:
    switch l1
    switch [bb2, bb1]
bb1:
    ret l1
    return
bb2:
    jmp bb3
bb3:
    l1 = 5
    ret l1
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(optimize_switch_branches(&mut graph, bb(0)));
    assert_eq!(graph.ref_count(bb(2)), 0);
    assert_eq!(graph.validate(), Ok(()));
    expect![[r#"
        bb0:
            jtrue eq l1, 0
            cond bb3
        bb1:
            ret l1
            return
        bb2:
            jmp bb3
        bb3:
            l1 = 5
            ret l1
            return
    "#]]
    .assert_eq(&graph.to_string());
}

#[test]
fn regular_switch_is_kept() {
    let src = "
bb0:
    switch l1
    switch [bb1, bb2, bb1]
bb1:
    return
bb2:
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(!optimize_switch_branches(&mut graph, bb(0)));
}

#[test]
fn dominant_case_is_peeled() {
    let src = "
graph [profile]
bb0 [weight=100, prof_weight]:
    l2 = 1
    switch l1
    switch [bb1, bb2, bb1] dominant 1 0.75
bb1 [weight=25, prof_weight]:
    return
bb2 [weight=75, prof_weight]:
    ret l2
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(optimize_switch_jumps(&mut graph, &FlowOptConfig::default()));
    assert_eq!(graph.validate(), Ok(()));
    expect![[r#"
        graph [profile]
        bb0 [prof_weight]:
            l2 = 1
            jtrue eq l1, 1
            cond bb2
        bb3 [weight=25, prof_weight]:
            switch l1
            switch [bb1, bb2, bb1]
        bb1 [weight=25, prof_weight]:
            return
        bb2 [weight=75, prof_weight]:
            ret l2
            return
    "#]]
    .assert_eq(&graph.to_string());
}

#[test]
fn weak_dominant_case_is_kept() {
    let src = "
graph [profile]
bb0 [weight=100, prof_weight]:
    switch l1
    switch [bb1, bb2, bb1] dominant 1 0.5
bb1 [weight=50, prof_weight]:
    return
bb2 [weight=50, prof_weight]:
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(!optimize_switch_jumps(&mut graph, &FlowOptConfig::default()));
}
