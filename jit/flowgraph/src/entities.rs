//! Entity references used throughout the flow graph.
//!
//! Blocks, exception regions, loops and locals are referred to by small integer newtypes that
//! index into tables owned by the [`BlockGraph`](crate::BlockGraph). Compact tables store them as
//! [`PackedOption`](stdx::packed_option::PackedOption)s, function arguments and return values use
//! `Option` instead.

use stdx::{impl_debug_display, impl_idx_from, impl_reserved_value};

/// A basic block.
///
/// The index is a stable arena key: it never changes while the block lives and is not reused
/// once the block is removed. The dense *number* of a block (see [`BlockData::num`]) is a
/// separate property that is reassigned by [`BlockGraph::renumber`].
///
/// [`BlockData::num`]: crate::BlockData::num
/// [`BlockGraph::renumber`]: crate::BlockGraph::renumber
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
impl_idx_from!(Block(u32));
impl_reserved_value!(Block(u32));
impl_debug_display! {
    match Block{
        Block(raw) => "bb{}", raw;
    }
}

impl Block {
    /// Create a block reference from the number in the `bbN` notation.
    ///
    /// This method is for use by the parser.
    pub fn with_number(n: u32) -> Option<Self> {
        if n < u32::MAX {
            Some(Self(n))
        } else {
            None
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An entry of the exception region table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EhIndex(u32);
impl_idx_from!(EhIndex(u32));
impl_reserved_value!(EhIndex(u32));
impl_debug_display! {
    match EhIndex{
        EhIndex(raw) => "eh{}", raw;
    }
}

/// An entry of the loop table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u32);
impl_idx_from!(LoopId(u32));
impl_reserved_value!(LoopId(u32));
impl_debug_display! {
    match LoopId{
        LoopId(raw) => "loop{}", raw;
    }
}

/// A local variable of the function, as seen by statements.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Local(u32);
impl_idx_from!(Local(u32));
impl_reserved_value!(Local(u32));
impl_debug_display! {
    match Local{
        Local(raw) => "l{}", raw;
    }
}
