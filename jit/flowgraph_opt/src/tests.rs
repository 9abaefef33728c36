use expect_test::expect;
use flowgraph::{FlowAnalysis, FlowOptConfig};
use flowgraph_reader::parse_graph;

use crate::optimize_flow_graph;

#[test]
fn pipeline_folds_shared_return() {
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
bb3:
    l2 = 1
    jmp bb1
";
    let mut graph = parse_graph(src).unwrap();
    let mut analysis = FlowAnalysis::new();
    let config = FlowOptConfig::default();
    assert_eq!(optimize_flow_graph(&mut graph, &mut analysis, &config), Ok(true));
    assert!(graph.is_numbered());
    expect![[r#"
        bb0:
            ret l1
            return
    "#]]
    .assert_eq(&graph.to_string());
}

#[test]
fn pipeline_sinks_rare_code() {
    let src = "
bb0:
    l1 = call f1
    jtrue eq l1, 0
    cond bb2
bb1 [weight=0, run_rarely]:
    call f2
    throw
bb2:
    l2 = 1
    jmp bb3
bb3:
    ret l2
    return
";
    let mut graph = parse_graph(src).unwrap();
    let mut analysis = FlowAnalysis::new();
    let config = FlowOptConfig::default();
    assert_eq!(optimize_flow_graph(&mut graph, &mut analysis, &config), Ok(true));
    expect![[r#"
        bb0:
            l1 = call f1
            jtrue ne l1, 0
            cond bb1
        bb2:
            l2 = 1
            ret l2
            return
        bb1 [weight=0, run_rarely]:
            call f2
            throw
    "#]]
    .assert_eq(&graph.to_string());
}

#[test]
fn pipeline_peels_dominant_switch_case() {
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
    let mut analysis = FlowAnalysis::new();
    let config = FlowOptConfig {
        reorder_blocks: false,
        head_tail_merge: false,
        tail_duplication: false,
        ..FlowOptConfig::default()
    };
    assert_eq!(optimize_flow_graph(&mut graph, &mut analysis, &config), Ok(true));
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
