use smallvec::SmallVec;

use crate::{Block, BlockGraph, CfgError, CfgResult};

impl<S> BlockGraph<S> {
    /// Checks the structural invariants of the graph: a consistent layout, jump targets that are
    /// part of the layout, predecessor edges that mirror the jumps exactly, reference counts and
    /// contiguous exception regions. If the graph claims to be numbered the numbers must be dense.
    ///
    /// A failure indicates a defect in a pass.
    pub fn validate(&self) -> CfgResult<()> {
        self.validate_layout()?;

        for block in self.blocks() {
            let refs = self.jump_refs(block);
            if self[block].jump.is_cond() && self.next_block(block).is_none() {
                return Err(CfgError::BrokenLayout(block));
            }

            let mut counted: SmallVec<[(Block, u32); 4]> = SmallVec::new();
            for target in refs {
                if !self.is_in_layout(target) || self[target].flags.is_removed() {
                    return Err(CfgError::InvalidJumpTarget { from: block, to: target });
                }
                match counted.iter_mut().find(|(it, _)| *it == target) {
                    Some((_, count)) => *count += 1,
                    None => counted.push((target, 1)),
                }
            }
            for (target, count) in counted {
                match self.pred_edge(target, block) {
                    Some(edge) if edge.dup_count == count => (),
                    _ => return Err(CfgError::DanglingEdge { from: block, to: target }),
                }
            }

            let mut expected = self.implicit_refs(block);
            for edge in self.preds(block) {
                let refs = self.jump_refs(edge.source);
                let count = refs.iter().filter(|&&target| target == block).count() as u32;
                if !self.is_in_layout(edge.source) || count != edge.dup_count {
                    return Err(CfgError::DanglingEdge { from: edge.source, to: block });
                }
                expected += edge.dup_count;
            }
            let found = self.ref_count(block);
            if found != expected {
                return Err(CfgError::RefCountMismatch { block, expected, found });
            }
        }

        self.validate_regions()
    }

    fn validate_layout(&self) -> CfgResult<()> {
        let mut prev = None;
        let mut count = 0;
        for block in self.blocks() {
            count += 1;
            if self.prev_block(block) != prev || self[block].flags.is_removed() {
                return Err(CfgError::BrokenLayout(block));
            }
            if self.is_numbered() && self[block].num != count {
                return Err(CfgError::NotNumbered);
            }
            prev = Some(block);
        }
        if prev != self.last_block() {
            let block = prev.or(self.last_block()).unwrap_or(Block::from(0u32));
            return Err(CfgError::BrokenLayout(block));
        }
        if count != self.block_count() {
            let block = self.first_block().unwrap_or(Block::from(0u32));
            return Err(CfgError::BrokenLayout(block));
        }
        Ok(())
    }

    fn validate_regions(&self) -> CfgResult<()> {
        for (region, desc) in self.eh.iter() {
            let ranges = [
                (desc.try_begin, desc.try_last),
                (desc.handler_entry(), desc.hnd_last),
            ];
            for (first, last) in ranges {
                if !self.is_in_layout(first) || !self.is_in_layout(last) {
                    return Err(CfgError::BrokenRegion { region });
                }
                let mut cursor = Some(first);
                loop {
                    match cursor {
                        Some(block) if block == last => break,
                        Some(block) => cursor = self.next_block(block),
                        None => return Err(CfgError::BrokenRegion { region }),
                    }
                }
            }
        }
        Ok(())
    }
}
