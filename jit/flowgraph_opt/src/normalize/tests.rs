use expect_test::{expect, Expect};
use flowgraph::write::{decorate_graph, PredWriter};
use flowgraph::{Block, FlowOptConfig};
use flowgraph_reader::parse_graph;

use crate::{optimize_branch_to_empty_unconditional, update_flow_graph};

fn expect_test(src: &str, tail_duplication: bool, expect: Expect) {
    let mut graph = parse_graph(src).unwrap();
    let config = FlowOptConfig::default();
    assert_eq!(update_flow_graph(&mut graph, &config, tail_duplication), Ok(true));
    expect.assert_eq(&graph.to_string());
    assert_eq!(update_flow_graph(&mut graph, &config, tail_duplication), Ok(false));
}

#[test]
fn straight_line_is_compacted() {
    let src = "
bb0:
    l1 = 0
    jmp bb1
bb1:
    jmp bb2
bb2:
    jmp bb3
bb3:
    ret l1
    return
";
    expect_test(
        src,
        false,
        expect![[r#"
            bb0:
                l1 = 0
                ret l1
                return
        "#]],
    );
}

#[test]
fn jumps_to_empty_blocks_are_redirected() {
    let src = "
bb0:
    jtrue lt l1, 0
    cond bb3
bb1:
    l2 = 1
    jmp bb4
bb2:
    ret l2
    return
bb3:
    jmp bb2
bb4:
    jmp bb2
";
    expect_test(
        src,
        false,
        expect![[r#"
            bb0:
                jtrue lt l1, 0
                cond bb2
            bb1:
                l2 = 1
                jmp bb2
            bb2:
                ret l2
                return
        "#]],
    );
}

#[test]
fn conditional_to_next_becomes_jump() {
    let src = "
bb0:
    l1 = call f1
    jtrue eq l1, 0
    cond bb1
bb1:
    ret l1
    return
";
    expect_test(
        src,
        false,
        expect![[r#"
            bb0:
                l1 = call f1
                ret l1
                return
        "#]],
    );
}

#[test]
fn condition_is_reversed_around_empty_jump() {
    let src = "
bb0:
    jtrue lt l1, 10
    cond bb2
bb1:
    jmp bb3
bb2:
    l2 = 1
    jmp bb3
bb3:
    ret l2
    return
";
    expect_test(
        src,
        false,
        expect![[r#"
            bb0:
                jtrue ge l1, 10
                cond bb3
            bb2:
                l2 = 1
                jmp bb3
            bb3:
                ret l2
                return
        "#]],
    );
}

#[test]
fn unreachable_blocks_are_removed() {
    let src = "
bb0:
    ret
    return
bb1:
    l1 = 1
    jmp bb1
bb2:
    l2 = 2
    jmp bb0
";
    expect_test(
        src,
        false,
        expect![[r#"
            bb0:
                ret
                return
        "#]],
    );
}

#[test]
fn empty_block_before_try_is_removed() {
    let src = "
eh0 catch try bb2..bb2 handler bb3..bb3
bb0:
    jtrue lt l1, 0
    cond bb4
bb1:
    jmp bb2
bb2:
    call f1
    jmp bb4
bb3:
    catchret bb4
bb4:
    return
";
    expect_test(
        src,
        false,
        expect![[r#"
            eh0 catch try bb2..bb2 handler bb3..bb3
            bb0:
                jtrue lt l1, 0
                cond bb4
            bb2 [dont_remove]:
                call f1
                jmp bb4
            bb3 [dont_remove]:
                catchret bb4
            bb4:
                return
        "#]],
    );
}

#[test]
fn loop_test_is_duplicated_into_entry() {
    let src = "
bb0:
    l1 = 0
    jmp bb2
bb1:
    l1 = add l1, 1
    jmp bb2
bb2:
    jtrue lt l1, 10
    cond bb1
bb3:
    ret l1
    return
";
    expect_test(
        src,
        true,
        expect![[r#"
            bb0:
                l1 = 0
                jtrue ge l1, 10
                cond bb3
            bb1:
                l1 = add l1, 1
                jtrue lt l1, 10
                cond bb1
            bb3:
                ret l1
                return
        "#]],
    );
}

#[test]
fn loop_test_is_kept_without_tail_duplication() {
    let src = "
bb0:
    l1 = 0
    jmp bb2
bb1:
    l1 = add l1, 1
    jmp bb2
bb2:
    jtrue lt l1, 10
    cond bb1
bb3:
    ret l1
    return
";
    let mut graph = parse_graph(src).unwrap();
    let config = FlowOptConfig::default();
    assert_eq!(update_flow_graph(&mut graph, &config, false), Ok(false));
}

#[test]
fn empty_jump_cycle_terminates() {
    let src = "
bb0:
    jtrue lt l1, 0
    cond bb2
bb1:
    ret
    return
bb2:
    jmp bb3
bb3:
    jmp bb2
";
    let mut graph = parse_graph(src).unwrap();
    let config = FlowOptConfig::default();
    assert!(update_flow_graph(&mut graph, &config, false).is_ok());
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn branch_over_empty_block_moves_edge_weight() {
    let src = "
graph [profile, edge_weights]
bb0 [prof_weight]:
    jtrue eq l1, 0
    cond bb2
bb1 [weight=30, prof_weight]:
    l2 = 1
    jmp bb3
bb2 [weight=70, prof_weight]:
    jmp bb3
bb3 [prof_weight]:
    ret l2
    return
";
    let mut graph = parse_graph(src).unwrap();
    let (bb0, bb1, bb2) = (Block::from(0u32), Block::from(1u32), Block::from(2u32));
    graph.pred_edge_mut(bb2, bb0).unwrap().set_weights(60.0, 70.0);
    graph.pred_edge_mut(bb1, bb0).unwrap().set_weights(30.0, 40.0);
    assert!(optimize_branch_to_empty_unconditional(&mut graph, bb0, bb2));
    assert_eq!(graph.validate(), Ok(()));
    let mut out = String::new();
    decorate_graph(&mut PredWriter, &mut out, &graph).unwrap();
    expect![[r#"
        graph [profile, edge_weights]
        bb0 [prof_weight]:
            jtrue eq l1, 0
            cond bb3
        ; preds: bb0(30..40)
        bb1 [weight=30, prof_weight]:
            l2 = 1
            jmp bb3
        bb2 [weight=5]:
            jmp bb3
        ; preds: bb1(30..30) bb2(10..10) bb0(60..70)
        bb3 [prof_weight]:
            ret l2
            return
    "#]]
    .assert_eq(&out);
}
