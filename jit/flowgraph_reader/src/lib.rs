//! Reads block graphs from the text produced by `flowgraph::write`.
//!
//! The statements of the parsed graphs use a tiny reference language ([`Stmt`]) that implements
//! the [`Statement`](flowgraph::Statement) interface. It exists to write readable tests for the
//! flow graph passes.

pub use crate::error::{Location, ParseError, ParseResult};
pub use crate::ir::{BinOp, Expr, Operand, RelOp, Stmt};
pub use crate::parser::{parse_graph, Parser};

#[macro_use]
mod error;
mod ir;
mod lexer;
mod parser;
