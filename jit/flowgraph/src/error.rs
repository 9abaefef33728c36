use thiserror::Error;

use crate::{Block, EhIndex};

/// Violations of the flow graph invariants.
///
/// These are never caused by the input program: they indicate a defect in a pass. The caller is
/// expected to abandon optimization of the current function when it receives one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CfgError {
    #[error("{from} jumps to {to} but {to} has no matching predecessor edge")]
    DanglingEdge { from: Block, to: Block },

    #[error("{block} has {found} references, expected {expected}")]
    RefCountMismatch { block: Block, expected: u32, found: u32 },

    #[error("the block numbers are stale; renumber the graph first")]
    NotNumbered,

    #[error("{0} is not reachable from any entry block")]
    MissingEntry(Block),

    #[error("{pass} did not converge after {limit} iterations")]
    IterationLimit { pass: &'static str, limit: u32 },

    #[error("{0} was invalidated by a change to the graph")]
    AnalysisInvalid(&'static str),

    #[error("{from} jumps to {to} which is not part of the layout")]
    InvalidJumpTarget { from: Block, to: Block },

    #[error("broken layout at {0}")]
    BrokenLayout(Block),

    #[error("{region} does not describe a contiguous range of blocks")]
    BrokenRegion { region: EhIndex },
}

pub type CfgResult<T> = Result<T, CfgError>;
