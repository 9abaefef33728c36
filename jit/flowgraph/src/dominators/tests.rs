use crate::test_utils::{bb, diamond, graph, TestStmt};
use crate::{
    Block, BlockGraph, CfgError, DomTreeRender, DominatorTree, FlowAnalysis, FlowOptConfig,
    JumpKind, Reachability, SwitchTable,
};

fn analyse(graph: &mut BlockGraph<TestStmt>) -> FlowAnalysis {
    let mut analysis = FlowAnalysis::new();
    analysis.compute_reachability(graph, &FlowOptConfig::default()).unwrap();
    analysis
}

#[test]
fn diamond_dominators() {
    let mut graph = diamond();
    let analysis = analyse(&mut graph);
    let doms = &analysis.doms;

    assert_eq!(doms.idom(bb(4)), Some(bb(1)));
    assert_eq!(doms.idom(bb(1)), Some(bb(0)));
    assert_eq!(doms.idom(bb(0)), None);
    assert_eq!(doms.roots(), [bb(0)]);

    assert!(doms.dominates(&graph, bb(1), bb(4)));
    assert!(!doms.dominates(&graph, bb(3), bb(4)));
    assert!(!doms.dominates(&graph, bb(2), bb(4)));
    assert!(doms.dominates(&graph, bb(0), bb(1)));
    assert!(doms.dominates(&graph, bb(4), bb(4)));

    let mut children: Vec<Block> = doms.children(bb(1)).collect();
    children.sort();
    assert_eq!(children, [bb(2), bb(3), bb(4)]);
}

/// Loop with a back edge and a switch that shares targets.
fn loop_graph() -> BlockGraph<TestStmt> {
    graph(vec![
        (vec![], JumpKind::Always(bb(1))),
        (vec![TestStmt::Test(1)], JumpKind::Cond(bb(4))),
        (vec![TestStmt::Test(2)], JumpKind::Cond(bb(1))),
        (vec![], JumpKind::Always(bb(5))),
        (vec![TestStmt::Test(4)], JumpKind::Switch(SwitchTable::new(vec![bb(5), bb(6), bb(5)]))),
        (vec![], JumpKind::Always(bb(6))),
        (vec![], JumpKind::Return),
    ])
}

#[test]
fn dominance_properties() {
    let mut graph = loop_graph();
    let analysis = analyse(&mut graph);
    let blocks: Vec<Block> = graph.blocks().collect();

    for &a in &blocks {
        assert!(analysis.dominates(&graph, a, a));
        for &b in &blocks {
            if analysis.dominates(&graph, a, b) {
                assert!(analysis.reachable(&graph, a, b), "{a} dominates {b} but can't reach it");
                for &c in &blocks {
                    if analysis.dominates(&graph, b, c) {
                        assert!(analysis.dominates(&graph, a, c), "{a} dom {b} dom {c}");
                    }
                }
            }
        }
    }

    assert_eq!(analysis.doms.idom(bb(5)), Some(bb(1)));
    assert_eq!(analysis.doms.idom(bb(6)), Some(bb(1)));
    assert_eq!(analysis.doms.idom(bb(3)), Some(bb(2)));
    let set = analysis.doms.dominator_set(graph.arena_len(), bb(6));
    assert_eq!(set.iter().collect::<Vec<_>>(), [bb(0), bb(1), bb(6)]);
}

#[test]
fn requires_numbering() {
    let mut graph = diamond();
    let mut reach = Reachability::new();
    let mut doms = DominatorTree::new();
    assert_eq!(doms.compute(&mut graph, &reach), Err(CfgError::NotNumbered));

    graph.renumber();
    assert_eq!(doms.compute(&mut graph, &reach), Err(CfgError::AnalysisInvalid("reachability")));

    reach.compute_enter_blocks(&graph, &FlowOptConfig::default());
    reach.compute_dfs(&graph);
    reach.compute_reach_sets(&mut graph);
    assert_eq!(doms.compute(&mut graph, &reach), Ok(()));
    assert!(doms.is_valid(&graph));

    graph.split_at_end(bb(3));
    assert!(!doms.is_valid(&graph));
}

#[test]
fn render_dot() {
    let mut graph = diamond();
    let analysis = analyse(&mut graph);
    let mut dst = Vec::new();
    DomTreeRender { dom_tree: &analysis.doms, graph: &graph, name: "diamond" }
        .to_dot(&mut dst)
        .unwrap();
    let dot = String::from_utf8(dst).unwrap();
    assert!(dot.contains("digraph diamond"));
    assert!(dot.contains("bb1 -> bb4"));
}
