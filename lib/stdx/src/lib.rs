//! Helpers shared by the crates of the workspace.

mod macros;
pub mod packed_option;

pub use packed_option::{PackedOption, ReservedValue};
