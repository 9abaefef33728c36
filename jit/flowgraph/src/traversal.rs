//! Depth first numbering of the block graph.

use bitset::BitSet;
use smallvec::SmallVec;
use typed_index_collections::TiVec;

use crate::{Block, BlockGraph};

/// Pre- and postorder numbers of every block plus the reverse postorder.
///
/// The traversal starts at the first block. Exception handlers and filters are not reachable
/// through ordinary edges, so they are used as additional roots once the first block is
/// exhausted. Any blocks that are still unvisited afterwards (dead code) are visited last, in
/// layout order, so that every block in the layout has a number.
///
/// Numbers start at 1, a number of 0 marks a block that was not part of the layout when the
/// traversal ran.
#[derive(Debug, Clone, Default)]
pub struct DfsOrder {
    pub preorder: TiVec<Block, u32>,
    pub postorder: TiVec<Block, u32>,
    /// The blocks in reverse postorder.
    pub rpo: Vec<Block>,
    /// The highest postorder number of a block that is reachable from the first block or from an
    /// exception entry. Blocks with a higher number were only found by the final layout sweep.
    pub highest_reachable: u32,
}

struct Dfs<'a, S> {
    graph: &'a BlockGraph<S>,
    visited: BitSet<Block>,
    // successors are popped from the end, so the lists are stored reversed
    visit_stack: Vec<(Block, SmallVec<[Block; 4]>)>,
    preorder_num: u32,
    postorder_num: u32,
}

impl<'a, S> Dfs<'a, S> {
    fn visit(&mut self, order: &mut DfsOrder, root: Block) {
        if !self.visited.insert(root) {
            return;
        }
        self.enter(order, root);

        loop {
            while let Some(succ) = self.visit_stack.last_mut().and_then(|(_, succs)| succs.pop()) {
                if self.visited.insert(succ) {
                    self.enter(order, succ);
                }
            }

            match self.visit_stack.pop() {
                Some((block, _)) => {
                    self.postorder_num += 1;
                    order.postorder[block] = self.postorder_num;
                    let len = self.graph.block_count();
                    order.rpo[(len - self.postorder_num) as usize] = block;
                }
                None => break,
            }
        }
    }

    fn enter(&mut self, order: &mut DfsOrder, block: Block) {
        self.preorder_num += 1;
        order.preorder[block] = self.preorder_num;
        let mut succs = self.graph.successors(block);
        succs.reverse();
        self.visit_stack.push((block, succs));
    }
}

impl DfsOrder {
    pub fn compute<S>(graph: &BlockGraph<S>) -> DfsOrder {
        let arena_len = graph.arena_len();
        let block_count = graph.block_count();
        let mut order = DfsOrder {
            preorder: TiVec::from(vec![0; arena_len]),
            postorder: TiVec::from(vec![0; arena_len]),
            rpo: Vec::new(),
            highest_reachable: 0,
        };

        let Some(first) = graph.first_block() else { return order };
        order.rpo = vec![first; block_count as usize];

        let mut dfs = Dfs {
            graph,
            visited: BitSet::new_empty(arena_len),
            visit_stack: Vec::new(),
            preorder_num: 0,
            postorder_num: 0,
        };

        dfs.visit(&mut order, first);
        if dfs.postorder_num != block_count {
            for (_, region) in graph.eh.iter() {
                if let Some(filter) = region.filter_begin.expand() {
                    dfs.visit(&mut order, filter);
                }
                dfs.visit(&mut order, region.hnd_begin);
            }
        }
        order.highest_reachable = dfs.postorder_num;

        if dfs.postorder_num != block_count {
            for block in graph.blocks() {
                dfs.visit(&mut order, block);
            }
        }

        debug_assert_eq!(dfs.postorder_num, block_count);
        order
    }

    /// The block was part of the layout when the order was computed.
    pub fn contains(&self, block: Block) -> bool {
        self.postorder.get(block).map_or(false, |&num| num != 0)
    }

    pub fn postorder_num(&self, block: Block) -> u32 {
        self.postorder.get(block).copied().unwrap_or(0)
    }
}
