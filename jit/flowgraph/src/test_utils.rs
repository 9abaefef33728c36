//! A minimal statement type for the unit tests of this crate.

use std::fmt;

use crate::{Block, BlockGraph, JumpKind, SideEffects, Statement};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestStmt {
    Nop,
    Op(u32),
    /// The test of a conditional.
    Test(u32),
}

impl fmt::Display for TestStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStmt::Nop => write!(f, "nop"),
            TestStmt::Op(id) => write!(f, "op {id}"),
            TestStmt::Test(id) => write!(f, "test {id}"),
        }
    }
}

impl Statement for TestStmt {
    fn equivalent(&self, other: &Self) -> bool {
        self == other
    }

    fn side_effects(&self) -> SideEffects {
        SideEffects::empty()
    }

    fn cost(&self) -> u32 {
        1
    }

    fn is_nop(&self) -> bool {
        matches!(self, TestStmt::Nop)
    }

    fn is_terminator(&self) -> bool {
        matches!(self, TestStmt::Test(_))
    }
}

pub fn bb(n: usize) -> Block {
    Block::from(n)
}

/// Creates the blocks `bb0..bbN` in layout order and computes the predecessors.
pub fn graph(blocks: Vec<(Vec<TestStmt>, JumpKind)>) -> BlockGraph<TestStmt> {
    let mut graph = BlockGraph::new();
    for (stmts, jump) in blocks {
        let block = graph.create_block(jump);
        graph[block].stmts = stmts;
        graph.append_block(block);
    }
    graph.compute_preds();
    graph
}

/// entry -> A, A -> B (taken), A -> C (fall through), B -> D, C -> D
pub fn diamond() -> BlockGraph<TestStmt> {
    graph(vec![
        (vec![], JumpKind::Always(bb(1))),
        (vec![TestStmt::Test(1)], JumpKind::Cond(bb(3))),
        (vec![], JumpKind::Always(bb(4))),
        (vec![], JumpKind::Always(bb(4))),
        (vec![], JumpKind::Return),
    ])
}
