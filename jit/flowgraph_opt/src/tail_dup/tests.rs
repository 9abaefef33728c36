use expect_test::expect;
use flowgraph::{Block, FlowOptConfig};
use flowgraph_reader::parse_graph;

use crate::optimize_branch;

fn bb(n: u32) -> Block {
    Block::from(n)
}

#[test]
fn loop_test_is_copied_to_entry() {
    let src = "
bb0:
    l1 = 0
    jmp bb2
bb1 [weight=800]:
    l1 = add l1, 1
    jmp bb2
bb2 [weight=800]:
    jtrue lt l1, 10
    cond bb1
bb3:
    ret l1
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(optimize_branch(&mut graph, &FlowOptConfig::default(), bb(0)));
    assert_eq!(graph.validate(), Ok(()));
    assert_eq!(graph.pred_blocks(bb(2)).collect::<Vec<_>>(), [bb(1)]);
    expect![[r#"
        bb0:
            l1 = 0
            jtrue ge l1, 10
            cond bb3
        bb1 [weight=800]:
            l1 = add l1, 1
            jmp bb2
        bb2 [weight=700]:
            jtrue lt l1, 10
            cond bb1
        bb3:
            ret l1
            return
    "#]]
    .assert_eq(&graph.to_string());
}

#[test]
fn expensive_test_is_not_copied() {
    let src = "
bb0:
    l1 = 0
    jmp bb2
bb1:
    l1 = add l1, 1
    jmp bb2
bb2:
    l2 = add l2, 1
    l3 = add l3, 1
    l4 = add l4, 1
    jtrue lt l1, 10
    cond bb1
bb3:
    ret l1
    return
";
    let mut graph = parse_graph(src).unwrap();
    assert!(!optimize_branch(&mut graph, &FlowOptConfig::default(), bb(0)));
    assert_eq!(graph[bb(0)].stmts.len(), 1);
}

#[test]
fn target_must_return_to_next() {
    let src = "
bb0:
    jmp bb2
bb1:
    ret
    return
bb2:
    jtrue lt l1, 10
    cond bb3
bb3:
    jmp bb1
";
    let mut graph = parse_graph(src).unwrap();
    assert!(!optimize_branch(&mut graph, &FlowOptConfig::default(), bb(0)));
}
