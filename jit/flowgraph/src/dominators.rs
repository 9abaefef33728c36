use std::io;

use bitset::BitSet;
use stdx::packed_option::PackedOption;
use typed_index_collections::TiVec;

use crate::write::dot_id;
use crate::{Block, BlockFlags, BlockGraph, CfgError, CfgResult, Reachability};

#[cfg(test)]
mod tests;

/// Immediate dominator during the fixpoint iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idom {
    Unset,
    /// The imaginary root that precedes the first block and every other block without
    /// predecessors (handler and filter entries).
    Root,
    Block(Block),
}

/// A finger of the intersect walk. The root has the highest postorder number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finger {
    Root,
    Block(Block),
}

#[derive(Debug, Clone, Default)]
pub struct DominatorTree {
    idom: TiVec<Block, PackedOption<Block>>,
    first_child: TiVec<Block, PackedOption<Block>>,
    next_sibling: TiVec<Block, PackedOption<Block>>,
    /// Preorder and postorder numbers of the tree walk, 0 for blocks that were not part of the
    /// layout.
    preorder: TiVec<Block, u32>,
    postorder: TiVec<Block, u32>,
    /// Roots of the dominator forest, the first block comes first.
    roots: Vec<Block>,
    /// Size of the block arena when the tree was computed. Blocks with a higher index were
    /// created afterwards.
    dom_block_count: usize,
    epoch: Option<u32>,
}

impl DominatorTree {
    pub fn new() -> DominatorTree {
        DominatorTree::default()
    }

    /// Computes the immediate dominators with the algorithm of Cooper, Harvey and Kennedy
    /// ("A Simple, Fast Dominance Algorithm") and numbers the resulting tree.
    ///
    /// The graph must be numbered and `reach` must be current.
    pub fn compute<S>(&mut self, graph: &mut BlockGraph<S>, reach: &Reachability) -> CfgResult<()> {
        if !graph.is_numbered() {
            return Err(CfgError::NotNumbered);
        }
        if !reach.is_valid(graph) {
            return Err(CfgError::AnalysisInvalid("reachability"));
        }
        self.clear();
        let Some(first) = graph.first_block() else { return Ok(()) };

        let idoms = compute_idoms(graph, reach, first)?;
        mark_exceptional_entries(graph, reach, first, &idoms);
        self.build_tree(graph, first, &idoms);
        self.number_tree();

        self.dom_block_count = graph.arena_len();
        self.epoch = Some(graph.epoch());
        log::trace!("computed dominators of {} blocks", graph.block_count());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.idom.clear();
        self.first_child.clear();
        self.next_sibling.clear();
        self.preorder.clear();
        self.postorder.clear();
        self.roots.clear();
        self.dom_block_count = 0;
        self.epoch = None;
    }

    /// The tree was computed for the current graph.
    pub fn is_valid<S>(&self, graph: &BlockGraph<S>) -> bool {
        self.epoch == Some(graph.epoch())
    }

    pub fn invalidate(&mut self) {
        self.epoch = None;
    }

    pub fn dom_block_count(&self) -> usize {
        self.dom_block_count
    }

    fn is_new(&self, block: Block) -> bool {
        block.index() >= self.dom_block_count
    }

    /// The immediate dominator of `block`, `None` for the roots of the forest and for blocks
    /// created after the computation.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.idom.get(block).and_then(|idom| idom.expand())
    }

    pub fn roots(&self) -> &[Block] {
        &self.roots
    }

    /// The blocks immediately dominated by `block`.
    pub fn children(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        let mut next = self.first_child.get(block).and_then(|child| child.expand());
        std::iter::from_fn(move || {
            let child = next?;
            next = self.next_sibling[child].expand();
            Some(child)
        })
    }

    /// `a` dominates `b`: every path from an entry to `b` passes through `a`.
    ///
    /// Blocks created after the tree was computed are handled by walking their predecessors: a
    /// new block is dominated by `a` if all of its predecessors are.
    pub fn dominates<S>(&self, graph: &BlockGraph<S>, a: Block, b: Block) -> bool {
        if a == b {
            return true;
        }
        if !self.is_new(b) {
            return !self.is_new(a) && self.dominates_numbered(a, b);
        }

        let mut visited = BitSet::new_empty(graph.arena_len());
        let mut stack = vec![b];
        while let Some(block) = stack.pop() {
            if !visited.insert(block) {
                continue;
            }
            if graph.preds(block).is_empty() {
                return false;
            }
            for pred in graph.pred_blocks(block) {
                if pred == a {
                    continue;
                }
                if self.is_new(pred) {
                    stack.push(pred);
                } else if self.is_new(a) || !self.dominates_numbered(a, pred) {
                    return false;
                }
            }
        }
        true
    }

    fn dominates_numbered(&self, a: Block, b: Block) -> bool {
        let (pre_a, pre_b) = (self.preorder[a], self.preorder[b]);
        if pre_a == 0 || pre_b == 0 {
            return a == b;
        }
        pre_a <= pre_b && self.postorder[a] >= self.postorder[b]
    }

    /// Every block on the dominator chain of `block`, including `block` itself.
    pub fn dominator_set(&self, domain: usize, block: Block) -> BitSet<Block> {
        let mut set = BitSet::new_empty(domain);
        let mut cursor = Some(block);
        while let Some(dom) = cursor {
            set.insert(dom);
            cursor = self.idom(dom);
        }
        set
    }

    fn build_tree<S>(&mut self, graph: &BlockGraph<S>, first: Block, idoms: &TiVec<Block, Idom>) {
        let arena_len = graph.arena_len();
        self.idom = TiVec::from(vec![PackedOption::default(); arena_len]);
        self.first_child = TiVec::from(vec![PackedOption::default(); arena_len]);
        self.next_sibling = TiVec::from(vec![PackedOption::default(); arena_len]);
        self.preorder = TiVec::from(vec![0; arena_len]);
        self.postorder = TiVec::from(vec![0; arena_len]);

        self.roots.push(first);
        for block in graph.blocks() {
            match idoms[block] {
                Idom::Block(parent) => {
                    self.idom[block] = parent.into();
                    self.next_sibling[block] = self.first_child[parent];
                    self.first_child[parent] = block.into();
                }
                Idom::Root if block != first => self.roots.push(block),
                _ => (),
            }
        }
    }

    fn number_tree(&mut self) {
        let mut preorder_num = 1;
        let mut postorder_num = 1;
        let mut stack: Vec<(Block, Option<Block>)> = Vec::new();

        for i in 0..self.roots.len() {
            let root = self.roots[i];
            self.preorder[root] = preorder_num;
            preorder_num += 1;
            stack.push((root, self.first_child[root].expand()));

            while let Some((block, next_child)) = stack.last_mut() {
                match *next_child {
                    Some(child) => {
                        *next_child = self.next_sibling[child].expand();
                        self.preorder[child] = preorder_num;
                        preorder_num += 1;
                        stack.push((child, self.first_child[child].expand()));
                    }
                    None => {
                        self.postorder[*block] = postorder_num;
                        postorder_num += 1;
                        stack.pop();
                    }
                }
            }
        }
    }
}

fn mark_exceptional_entries<S>(
    graph: &mut BlockGraph<S>,
    reach: &Reachability,
    first: Block,
    idoms: &TiVec<Block, Idom>,
) {
    for block in graph.blocks().collect::<Vec<_>>() {
        graph[block].flags.remove(BlockFlags::DOMINATED_BY_EXCEPTIONAL_ENTRY);
    }
    if reach.enter_blocks().count() <= 1 {
        return;
    }
    for &block in &reach.dfs().rpo {
        let dominated = if reach.is_enter_block(block) {
            block != first
        } else {
            match idoms[block] {
                Idom::Block(idom) => {
                    graph[idom].flags.contains(BlockFlags::DOMINATED_BY_EXCEPTIONAL_ENTRY)
                }
                Idom::Root | Idom::Unset => false,
            }
        };
        if dominated {
            graph[block].flags.insert(BlockFlags::DOMINATED_BY_EXCEPTIONAL_ENTRY);
        }
    }
}

fn compute_idoms<S>(
    graph: &BlockGraph<S>,
    reach: &Reachability,
    first: Block,
) -> CfgResult<TiVec<Block, Idom>> {
    let dfs = reach.dfs();
    let root_postorder = graph.block_count() + 1;
    let mut idoms: TiVec<Block, Idom> = TiVec::from(vec![Idom::Unset; graph.arena_len()]);
    let mut processed = BitSet::new_empty(graph.arena_len());

    idoms[first] = Idom::Root;
    processed.insert(first);
    for block in graph.blocks() {
        if block != first && graph.preds(block).is_empty() {
            idoms[block] = Idom::Root;
            processed.insert(block);
        }
    }
    for entry in graph.eh.handler_entries() {
        idoms[entry] = Idom::Root;
        processed.insert(entry);
    }

    let postorder = |finger: Finger| match finger {
        Finger::Root => root_postorder,
        Finger::Block(block) => dfs.postorder_num(block),
    };
    let parent = |idoms: &TiVec<Block, Idom>, finger: Finger| match finger {
        Finger::Block(block) => match idoms[block] {
            Idom::Block(idom) => Finger::Block(idom),
            Idom::Root | Idom::Unset => Finger::Root,
        },
        Finger::Root => Finger::Root,
    };
    let intersect = |idoms: &TiVec<Block, Idom>, mut finger1: Finger, mut finger2: Finger| {
        while finger1 != finger2 {
            while postorder(finger1) < postorder(finger2) {
                finger1 = parent(idoms, finger1);
            }
            while postorder(finger2) < postorder(finger1) {
                finger2 = parent(idoms, finger2);
            }
        }
        finger1
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &block in &dfs.rpo {
            if idoms[block] == Idom::Root {
                continue;
            }
            let Some(first_pred) =
                graph.pred_blocks(block).find(|&pred| processed.contains(pred))
            else {
                return Err(CfgError::MissingEntry(block));
            };

            let mut new_idom = Finger::Block(first_pred);
            for pred in graph.pred_blocks(block) {
                if pred != first_pred && idoms[pred] != Idom::Unset {
                    new_idom = intersect(&idoms, Finger::Block(pred), new_idom);
                }
            }
            let new_idom = match new_idom {
                Finger::Root => Idom::Root,
                Finger::Block(idom) => Idom::Block(idom),
            };
            if idoms[block] != new_idom {
                idoms[block] = new_idom;
                changed = true;
            }
            processed.insert(block);
        }
    }

    Ok(idoms)
}

/// Renders the dominator tree in the dot format.
pub struct DomTreeRender<'a, S> {
    pub dom_tree: &'a DominatorTree,
    pub graph: &'a BlockGraph<S>,
    pub name: &'a str,
}

impl<S> DomTreeRender<'_, S> {
    pub fn to_dot(&self, dst: &mut impl io::Write) -> io::Result<()> {
        dot::render(self, dst)
    }
}

impl<'a, S> dot::Labeller<'a, Block, (Block, Block)> for DomTreeRender<'a, S> {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot_id(self.name)
    }

    fn node_id(&'a self, n: &Block) -> dot::Id<'a> {
        dot_id(&n.to_string())
    }
}

impl<'a, S> dot::GraphWalk<'a, Block, (Block, Block)> for DomTreeRender<'a, S> {
    fn nodes(&'a self) -> dot::Nodes<'a, Block> {
        self.graph.blocks().collect()
    }

    fn edges(&'a self) -> dot::Edges<'a, (Block, Block)> {
        self.graph.blocks().filter_map(|bb| Some((self.dom_tree.idom(bb)?, bb))).collect()
    }

    fn source(&'a self, edge: &(Block, Block)) -> Block {
        edge.0
    }

    fn target(&'a self, edge: &(Block, Block)) -> Block {
        edge.1
    }
}
