//! The interface between the flow graph and the statements stored in its blocks.
//!
//! The flow graph never looks inside a statement. Everything the passes need to know (equality,
//! side effects, cost, a few shape queries used by branch rewriting) goes through [`Statement`].

use std::fmt;

use bitflags::bitflags;

use crate::Local;

bitflags! {
    /// Side effect classes of a statement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SideEffects: u8 {
        /// Stores to a local or to memory.
        const ASG = 1 << 0;
        /// Contains a call.
        const CALL = 1 << 1;
        /// May throw.
        const EXCEPT = 1 << 2;
        /// Reads global (heap) memory.
        const GLOB_REF = 1 << 3;
        /// Must stay ordered relative to other side effects (volatile accesses, barriers).
        const ORDER_SIDEEFF = 1 << 4;

        const ALL_EFFECT = Self::ASG.bits() | Self::CALL.bits() | Self::EXCEPT.bits();
        const PERSISTENT = Self::ASG.bits() | Self::CALL.bits();
    }
}

/// A statement that stores to a local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStore {
    pub local: Local,
    /// Side effects of the stored value.
    pub value_effects: SideEffects,
    /// The address of the local escapes, so memory accesses may alias it.
    pub address_exposed: bool,
}

pub trait Statement: Clone + fmt::Debug + fmt::Display {
    /// Structural equality: both statements compute the same thing.
    fn equivalent(&self, other: &Self) -> bool;

    fn side_effects(&self) -> SideEffects;

    /// Size estimate used by the duplication heuristics.
    fn cost(&self) -> u32;

    fn is_nop(&self) -> bool {
        false
    }

    /// The statement is the test of a conditional, the value of a switch or the returned value
    /// and therefore has to stay last in its block.
    fn is_terminator(&self) -> bool {
        false
    }

    /// Describes the store if the whole statement is a store to a local.
    fn local_store(&self) -> Option<LocalStore> {
        None
    }

    fn references_local(&self, _local: Local) -> bool {
        false
    }

    fn contains_tail_call(&self) -> bool {
        false
    }

    /// A statement that only performs the side effects of `self`, `None` if there are none.
    fn extract_side_effects(&self) -> Option<Self> {
        None
    }

    /// The statement is a conditional branch whose test is a relational compare.
    fn is_compare_branch(&self) -> bool {
        false
    }

    /// Reverses the condition of a conditional branch. Returns `false` if `self` is not one.
    fn reverse_condition(&mut self) -> bool {
        false
    }

    /// Turns a switch on `v` into the branch `v == 0`.
    fn switch_to_zero_compare(&self) -> Option<Self> {
        None
    }

    /// A conditional branch taken when the switch value equals `case`. `None` if the switch value
    /// can not be evaluated twice.
    fn switch_case_compare(&self, _case: usize) -> Option<Self> {
        None
    }

    /// For a branch of the shape `jtrue local <relop> const` (or const vs local) the tested local.
    fn tested_local(&self) -> Option<Local> {
        None
    }

    /// For a statement of the shape `dst = a <binop> b` where one of the operands is a local and
    /// the other is a constant (or both are the same local) returns `(dst, operand_local)`.
    fn simple_local_update(&self) -> Option<(Local, Local)> {
        None
    }

    /// The statement stores to `local` a value that makes a later compare of `local` against a
    /// constant foldable: a constant, an array length or a relational compare. Always `false`
    /// for address exposed locals.
    fn stores_favorable_value(&self, _local: Local) -> bool {
        false
    }
}
