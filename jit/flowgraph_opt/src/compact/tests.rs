use expect_test::{expect, Expect};
use flowgraph::{Block, FlowOptConfig};
use flowgraph_reader::parse_graph;

use crate::{can_compact_blocks, compact_blocks};

fn bb(n: u32) -> Block {
    Block::from(n)
}

fn expect_test(src: &str, block: u32, expect: Expect) {
    let mut graph = parse_graph(src).unwrap();
    let (block, next) = (bb(block), bb(block + 1));
    assert!(can_compact_blocks(&graph, &FlowOptConfig::default(), block, next));
    compact_blocks(&mut graph, block, next);
    assert_eq!(graph.validate(), Ok(()));
    expect.assert_eq(&graph.to_string());
}

#[test]
fn merged_block_keeps_heavier_weight() {
    let src = "
bb0:
    l1 = 1
    jmp bb1
bb1 [weight=300]:
    l2 = add l1, 2
    jmp bb2
bb2:
    ret l2
    return
";
    expect_test(
        src,
        0,
        expect![[r#"
            bb0 [weight=300]:
                l1 = 1
                l2 = add l1, 2
                jmp bb2
            bb2:
                ret l2
                return
        "#]],
    );
}

#[test]
fn profile_weight_survives_compaction() {
    let src = "
graph [profile]
bb0 [weight=50, prof_weight]:
    l1 = 1
    jmp bb1
bb1 [weight=80]:
    ret l1
    return
";
    expect_test(
        src,
        0,
        expect![[r#"
            graph [profile]
            bb0 [weight=80, prof_weight]:
                l1 = 1
                ret l1
                return
        "#]],
    );
}

#[test]
fn throw_makes_block_rare() {
    let src = "
bb0:
    jtrue eq l1, 0
    cond bb3
bb1:
    call f1
    jmp bb2
bb2:
    throw
bb3:
    return
";
    expect_test(
        src,
        1,
        expect![[r#"
            bb0:
                jtrue eq l1, 0
                cond bb3
            bb1 [weight=0, run_rarely]:
                call f1
                throw
            bb3:
                return
        "#]],
    );
}

#[test]
fn empty_block_takes_over_shared_successor() {
    let src = "
bb0:
    jtrue lt l1, 0
    cond bb2
bb1:
    jmp bb2
bb2:
    return
";
    expect_test(
        src,
        1,
        expect![[r#"
            bb0:
                jtrue lt l1, 0
                cond bb1
            bb1:
                return
        "#]],
    );
}

#[test]
fn shared_successor_needs_empty_block() {
    let src = "
bb0:
    jtrue lt l1, 0
    cond bb2
bb1:
    l1 = 1
    jmp bb2
bb2:
    return
";
    let graph = parse_graph(src).unwrap();
    let config = FlowOptConfig::default();
    assert!(!can_compact_blocks(&graph, &config, bb(1), bb(2)));
    assert!(!can_compact_blocks(&graph, &config, bb(0), bb(1)));
}

#[test]
fn try_begin_is_not_compacted() {
    let src = "
eh0 catch try bb1..bb1 handler bb2..bb2
bb0:
    jmp bb1
bb1:
    call f1
    jmp bb3
bb2:
    catchret bb3
bb3:
    return
";
    let graph = parse_graph(src).unwrap();
    let config = FlowOptConfig::default();
    assert!(!can_compact_blocks(&graph, &config, bb(0), bb(1)));
    assert!(!can_compact_blocks(&graph, &config, bb(2), bb(3)));
}
