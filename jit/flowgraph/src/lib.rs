//! The flow graph of a function under compilation.
//!
//! A function is represented as a graph of basic blocks. Every block holds a linear run of
//! statements and ends in a [`JumpKind`] that determines its successors. The statements
//! themselves are opaque to this crate: they only need to implement [`Statement`].
//!
//! Besides the [`BlockGraph`] itself the crate provides the analyses that the optimization
//! passes (found in the `flowgraph_opt` crate) and the later phases of the backend rely on:
//!
//! * [`Reachability`] computes for every block the set of blocks that can reach it and removes
//! unreachable code.
//! * [`DominatorTree`] computes immediate dominators and answers dominance queries in constant
//! time.
//!
//! Invariant violations are reported as [`CfgError`]. They always indicate a defect of a pass,
//! never a property of the input program.

mod analysis;
mod dominators;
mod entities;
mod error;
mod flags;
mod graph;
mod jump;
mod loops;
mod reachability;
mod stmt;
mod traversal;
mod validation;

#[cfg(test)]
mod test_utils;

pub mod config;
pub mod eh;
pub mod weight;
pub mod write;

pub use crate::analysis::{FlowAnalysis, FlowGraphUpdates};
pub use crate::config::FlowOptConfig;
pub use crate::dominators::{DomTreeRender, DominatorTree};
pub use crate::eh::{EhRegion, EhTable, HandlerKind};
pub use crate::entities::{Block, EhIndex, Local, LoopId};
pub use crate::error::{CfgError, CfgResult};
pub use crate::flags::BlockFlags;
pub use crate::graph::{BlockCursor, BlockData, BlockGraph, Blocks, FlowEdge};
pub use crate::jump::{DominantCase, JumpKind, SwitchTable};
pub use crate::loops::{LoopDesc, LoopTable};
pub use crate::reachability::{remove_dead_blocks, remove_unreachable_blocks, Reachability};
pub use crate::stmt::{LocalStore, SideEffects, Statement};
pub use crate::traversal::DfsOrder;
pub use crate::weight::{Weight, LOOP_WEIGHT_SCALE, MAX_WEIGHT, UNITY_WEIGHT, ZERO_WEIGHT};
