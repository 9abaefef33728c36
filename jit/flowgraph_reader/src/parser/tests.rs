use expect_test::expect;
use flowgraph::{Block, DominantCase, JumpKind, Local};

use super::*;

fn bb(n: u32) -> Block {
    Block::from(n)
}

#[test]
fn print_parsed_graph() {
    let src = r#"
graph [return=bb3, profile]
eh0 catch try bb1..bb2 handler bb4..bb4
loop0 top bb2 entry bb2 bottom bb2 exit bb3
bb0 [weight=100, prof_weight]:
    l1 = 0
    jmp bb1
bb1 [weight=100, prof_weight]:
    call f1
    jmp bb2
; preds: bb1 bb2
bb2 [weight=800, prof_weight, loop_head]:
    l1 = add l1, 1
    jtrue lt l1, 10
    cond bb2
bb3 [weight=100, prof_weight]:
    ret l1
    return
bb4 [weight=0, run_rarely]:
    catchret bb3
"#;
    let graph = parse_graph(src).unwrap();
    assert!(graph.is_numbered());
    assert_eq!(graph.ref_count(bb(4)), 1);
    assert_eq!(graph.pred_blocks(bb(3)).collect::<Vec<_>>(), [bb(2), bb(4)]);
    assert_eq!(graph.eh[flowgraph::EhIndex::from(0u32)].try_last, bb(2));
    assert!(graph[bb(2)].try_index.is_some());

    let expected = expect![[r#"
        graph [return=bb3, profile]
        eh0 catch try bb1..bb2 handler bb4..bb4
        loop0 top bb2 entry bb2 bottom bb2 exit bb3
        bb0 [prof_weight]:
            l1 = 0
            jmp bb1
        bb1 [dont_remove, prof_weight]:
            call f1
            jmp bb2
        bb2 [weight=800, loop_head, prof_weight]:
            l1 = add l1, 1
            jtrue lt l1, 10
            cond bb2
        bb3 [prof_weight]:
            ret l1
            return
        bb4 [weight=0, dont_remove, run_rarely]:
            catchret bb3
    "#]];
    expected.assert_eq(&graph.to_string());
}

#[test]
fn switch_edges() {
    let src = "
bb0:
    switch l1
    switch [bb1, bb2, bb1] dominant 2 0.75
bb1:
    return
bb2:
    return
";
    let graph = parse_graph(src).unwrap();
    assert_eq!(graph[bb(0)].stmts, [Stmt::Switch(Operand::Local(Local::from(1u32)))]);
    let JumpKind::Switch(table) = &graph[bb(0)].jump else { panic!("expected a switch") };
    assert_eq!(table.targets, [bb(1), bb(2), bb(1)]);
    assert_eq!(table.dominant, Some(DominantCase { case: 2, fraction: 0.75 }));
    assert_eq!(graph.pred_edge(bb(1), bb(0)).map(|edge| edge.dup_count), Some(2));
    assert_eq!(graph.ref_count(bb(1)), 2);
    assert_eq!(graph.ref_count(bb(0)), 1);
}

#[test]
fn layout_follows_text() {
    let src = "
bb2:
    jmp bb0
bb0:
    return
";
    let graph = parse_graph(src).unwrap();
    assert_eq!(graph.blocks().collect::<Vec<_>>(), [bb(2), bb(0)]);
    assert!(!graph.is_in_layout(bb(1)));
    assert_eq!(graph[bb(0)].num, 2);
}

#[test]
fn errors() {
    let err = parse_graph("bb0:\n    jmp bb7\n").unwrap_err();
    assert_eq!(err.location.line_number, 2);
    assert!(err.message.starts_with("invalid graph"), "{err}");

    let err = parse_graph("bb0 [hot]:\n    return\n").unwrap_err();
    assert_eq!(err.to_string(), "line 1: unknown block flag 'hot'");

    let err = parse_graph("bb0:\n    return\nbb0:\n    return\n").unwrap_err();
    assert_eq!(err.to_string(), "line 3: duplicate definition of bb0");

    let err = parse_graph("bb0:\n    l1 = 1\n").unwrap_err();
    assert_eq!(err.message, "expected a statement or a jump");

    let err = parse_graph("bb0:\n    return $\n").unwrap_err();
    assert_eq!(err.to_string(), "line 2: invalid character");
}
