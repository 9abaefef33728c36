//! Converting a block graph to text.
//!
//! The textual form can be read back by the `flowgraph_reader` crate:
//!
//! ```text
//! graph [return=bb4, profile]
//! eh0 finally try bb1..bb1 handler bb3..bb3
//! loop0 top bb2 entry bb2 bottom bb2 exit bb4
//! bb0 [weight=100, prof_weight]:
//!     l1 = add l1, 1
//!     jtrue lt l1, 10
//!     cond bb2
//! ```

use std::fmt::{self, Write};
use std::io;

use crate::eh::HandlerKind;
use crate::{Block, BlockGraph, UNITY_WEIGHT};

#[cfg(test)]
mod tests;

/// A `GraphWriter` used to decorate graphs during printing.
pub trait GraphWriter<S: fmt::Display> {
    /// Write the block header, including its attributes.
    fn write_block_header(
        &mut self,
        w: &mut dyn Write,
        graph: &BlockGraph<S>,
        block: Block,
    ) -> fmt::Result {
        write_block_header(w, graph, block)
    }

    fn write_stmt(&mut self, w: &mut dyn Write, stmt: &S) -> fmt::Result {
        writeln!(w, "    {stmt}")
    }
}

/// Writes the graph without decorations.
pub struct PlainWriter;

impl<S: fmt::Display> GraphWriter<S> for PlainWriter {}

/// Annotates every block with its predecessor edges. Edge weights are included when the graph
/// has valid edge weights.
pub struct PredWriter;

impl<S: fmt::Display> GraphWriter<S> for PredWriter {
    fn write_block_header(
        &mut self,
        w: &mut dyn Write,
        graph: &BlockGraph<S>,
        block: Block,
    ) -> fmt::Result {
        let preds = graph.preds(block);
        if !preds.is_empty() {
            write!(w, "; preds:")?;
            for edge in preds {
                write!(w, " {}", edge.source)?;
                if edge.dup_count != 1 {
                    write!(w, "x{}", edge.dup_count)?;
                }
                if graph.have_valid_edge_weights {
                    write!(w, "({}..{})", edge.weight_min, edge.weight_max)?;
                }
            }
            writeln!(w)?;
        }
        write_block_header(w, graph, block)
    }
}

pub fn write_graph<S: fmt::Display>(w: &mut dyn Write, graph: &BlockGraph<S>) -> fmt::Result {
    decorate_graph(&mut PlainWriter, w, graph)
}

pub fn decorate_graph<S: fmt::Display, GW: GraphWriter<S>>(
    graph_w: &mut GW,
    w: &mut dyn Write,
    graph: &BlockGraph<S>,
) -> fmt::Result {
    write_graph_attrs(w, graph)?;

    for (idx, region) in graph.eh.iter() {
        let kind = match region.kind {
            HandlerKind::Catch => "catch",
            HandlerKind::Filter => "filter",
            HandlerKind::Finally => "finally",
            HandlerKind::Fault => "fault",
        };
        write!(w, "{idx} {kind} try {}..{}", region.try_begin, region.try_last)?;
        if let Some(filter) = region.filter_begin.expand() {
            write!(w, " filter {filter}")?;
        }
        writeln!(w, " handler {}..{}", region.hnd_begin, region.hnd_last)?;
    }

    for (id, desc) in graph.loops.iter() {
        write!(w, "{id} top {} entry {} bottom {}", desc.top, desc.entry, desc.bottom)?;
        if let Some(head) = desc.head.expand() {
            write!(w, " head {head}")?;
        }
        if let Some(exit) = desc.exit.expand() {
            write!(w, " exit {exit}")?;
        }
        writeln!(w)?;
    }

    for block in graph.blocks() {
        graph_w.write_block_header(w, graph, block)?;
        for stmt in &graph[block].stmts {
            graph_w.write_stmt(w, stmt)?;
        }
        writeln!(w, "    {}", graph[block].jump)?;
    }
    Ok(())
}

fn write_graph_attrs<S>(w: &mut dyn Write, graph: &BlockGraph<S>) -> fmt::Result {
    let mut attrs = Vec::new();
    if let Some(block) = graph.return_block.expand() {
        attrs.push(format!("return={block}"));
    }
    if let Some(block) = graph.scratch.expand() {
        attrs.push(format!("scratch={block}"));
    }
    if let Some(block) = graph.first_cold.expand() {
        attrs.push(format!("cold={block}"));
    }
    if graph.using_profile_weights {
        attrs.push("profile".to_owned());
    }
    if graph.have_valid_edge_weights {
        attrs.push("edge_weights".to_owned());
    }
    if !attrs.is_empty() {
        writeln!(w, "graph [{}]", attrs.join(", "))?;
    }
    Ok(())
}

/// Write out the block header with its non-default attributes:
///
///    bb1:
///    bb2 [weight=0, run_rarely]:
///
pub fn write_block_header<S>(
    w: &mut dyn Write,
    graph: &BlockGraph<S>,
    block: Block,
) -> fmt::Result {
    let data = &graph[block];
    let mut attrs = Vec::new();
    if data.weight != UNITY_WEIGHT {
        attrs.push(format!("weight={}", data.weight));
    }
    for (name, _) in data.flags.iter_names() {
        attrs.push(name.to_ascii_lowercase());
    }
    if attrs.is_empty() {
        writeln!(w, "{block}:")
    } else {
        writeln!(w, "{block} [{}]:", attrs.join(", "))
    }
}

impl<S: fmt::Display> fmt::Display for BlockGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_graph(f, self)
    }
}

/// A valid dot identifier for `name`.
pub(crate) fn dot_id(name: &str) -> dot::Id<'static> {
    let mut id: String =
        name.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect();
    if !id.starts_with(|c: char| c.is_ascii_alphabetic()) {
        id.insert(0, '_');
    }
    dot::Id::new(id).unwrap_or_else(|()| unreachable!("sanitized identifiers are valid"))
}

/// Renders the control flow graph in the dot format.
pub struct CfgRender<'a, S> {
    pub graph: &'a BlockGraph<S>,
    pub name: &'a str,
}

impl<S> CfgRender<'_, S> {
    pub fn to_dot(&self, dst: &mut impl io::Write) -> io::Result<()> {
        dot::render(self, dst)
    }
}

impl<'a, S> dot::Labeller<'a, Block, (Block, Block)> for CfgRender<'a, S> {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot_id(self.name)
    }

    fn node_id(&'a self, n: &Block) -> dot::Id<'a> {
        dot_id(&n.to_string())
    }

    fn node_label(&'a self, n: &Block) -> dot::LabelText<'a> {
        dot::LabelText::LabelStr(format!("{n} {}", self.graph[*n].jump).into())
    }
}

impl<'a, S> dot::GraphWalk<'a, Block, (Block, Block)> for CfgRender<'a, S> {
    fn nodes(&'a self) -> dot::Nodes<'a, Block> {
        self.graph.blocks().collect()
    }

    fn edges(&'a self) -> dot::Edges<'a, (Block, Block)> {
        self.graph
            .blocks()
            .flat_map(|bb| self.graph.successors(bb).into_iter().map(move |succ| (bb, succ)))
            .collect()
    }

    fn source(&'a self, edge: &(Block, Block)) -> Block {
        edge.0
    }

    fn target(&'a self, edge: &(Block, Block)) -> Block {
        edge.1
    }
}
