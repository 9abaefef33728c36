use expect_test::expect;
use flowgraph::Block;
use flowgraph_reader::parse_graph;

use crate::expand_rarely_run_blocks;

fn bb(n: u32) -> Block {
    Block::from(n)
}

#[test]
fn rarity_flows_to_successors() {
    let src = "
bb0:
    jtrue eq l1, 0
    cond bb2
bb1:
    ret
    return
bb2 [weight=0, run_rarely]:
    call f1
    jmp bb3
bb3:
    call f2
    jmp bb1
";
    let mut graph = parse_graph(src).unwrap();
    assert!(expand_rarely_run_blocks(&mut graph));
    expect![[r#"
        bb0:
            jtrue eq l1, 0
            cond bb2
        bb1:
            ret
            return
        bb2 [weight=0, run_rarely]:
            call f1
            jmp bb3
        bb3 [weight=0, run_rarely]:
            call f2
            jmp bb1
    "#]]
    .assert_eq(&graph.to_string());
}

#[test]
fn rarity_flows_to_predecessors() {
    let src = "
bb0:
    jtrue eq l1, 0
    cond bb3
bb1:
    jtrue eq l2, 0
    cond bb4
bb2 [weight=0, run_rarely]:
    throw
bb3:
    ret
    return
bb4 [weight=0, run_rarely]:
    throw
";
    let mut graph = parse_graph(src).unwrap();
    assert!(expand_rarely_run_blocks(&mut graph));
    assert!(graph[bb(1)].is_run_rarely());
    assert_eq!(graph[bb(1)].weight, 0.0);
    assert!(!graph[bb(0)].is_run_rarely());
    assert!(!graph[bb(3)].is_run_rarely());
}

#[test]
fn profiled_blocks_are_not_marked() {
    let src = "
graph [profile]
bb0 [prof_weight]:
    jtrue eq l1, 0
    cond bb2
bb1 [prof_weight]:
    ret
    return
bb2 [weight=5, prof_weight]:
    jmp bb3
bb3 [weight=0, run_rarely]:
    throw
";
    let mut graph = parse_graph(src).unwrap();
    assert!(!expand_rarely_run_blocks(&mut graph));
    assert!(!graph[bb(2)].is_run_rarely());
}
