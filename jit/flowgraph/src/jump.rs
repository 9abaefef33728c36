use smallvec::SmallVec;
use stdx::impl_display;

use crate::Block;

/// The way control leaves a block. Together with the layout (the false arm of a conditional is
/// the next block) this determines the successors of the block.
#[derive(Debug, Clone, PartialEq)]
pub enum JumpKind {
    /// Unconditional jump.
    Always(Block),
    /// Jumps to the target when the terminating test is true, otherwise falls through to the
    /// next block.
    Cond(Block),
    Switch(SwitchTable),
    Return,
    Throw,
    /// Calls a finally handler. Unless the handler never returns, the next block is an `Always`
    /// block marked `KEEP_ALWAYS` that continues after the handler returns.
    CallHandler(Block),
    /// Returns from a finally handler to any of the continuations of the call-handler pairs that
    /// invoke it.
    HandlerReturn(SmallVec<[Block; 2]>),
    /// Returns from a filter into the filtered handler.
    FilterReturn(Block),
    /// Leaves a catch handler.
    CatchReturn(Block),
    /// Returns from a fault handler, the exception continues to propagate.
    FaultReturn,
}

/// The jump table of a switch. The last entry is the default case.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchTable {
    pub targets: Vec<Block>,
    pub dominant: Option<DominantCase>,
}

/// A switch case that profile data shows is taken most of the time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DominantCase {
    pub case: usize,
    /// Fraction of the executions of the switch that take this case.
    pub fraction: f64,
}

impl SwitchTable {
    pub fn new(targets: Vec<Block>) -> SwitchTable {
        SwitchTable { targets, dominant: None }
    }

    /// The distinct targets in table order.
    pub fn unique_targets(&self) -> SmallVec<[Block; 4]> {
        let mut res = SmallVec::new();
        for &target in &self.targets {
            if !res.contains(&target) {
                res.push(target)
            }
        }
        res
    }
}

impl JumpKind {
    /// The single explicit target of the jump, if it has one.
    pub fn target(&self) -> Option<Block> {
        match *self {
            JumpKind::Always(target)
            | JumpKind::Cond(target)
            | JumpKind::CallHandler(target)
            | JumpKind::FilterReturn(target)
            | JumpKind::CatchReturn(target) => Some(target),
            _ => None,
        }
    }

    /// Every explicitly named target, repeated once per reference.
    pub fn explicit_targets(&self) -> SmallVec<[Block; 4]> {
        match self {
            JumpKind::Switch(table) => table.targets.iter().copied().collect(),
            JumpKind::HandlerReturn(conts) => conts.iter().copied().collect(),
            _ => self.target().into_iter().collect(),
        }
    }

    /// Replaces every explicit reference to `old` with `new` and returns the number of references
    /// that were changed.
    pub fn replace_target(&mut self, old: Block, new: Block) -> u32 {
        let mut changed = 0;
        let mut replace = |dst: &mut Block| {
            if *dst == old {
                *dst = new;
                changed += 1;
            }
        };
        match self {
            JumpKind::Always(target)
            | JumpKind::Cond(target)
            | JumpKind::CallHandler(target)
            | JumpKind::FilterReturn(target)
            | JumpKind::CatchReturn(target) => replace(target),
            JumpKind::Switch(table) => table.targets.iter_mut().for_each(replace),
            JumpKind::HandlerReturn(conts) => conts.iter_mut().for_each(replace),
            JumpKind::Return | JumpKind::Throw | JumpKind::FaultReturn => (),
        }
        changed
    }

    pub fn is_always(&self) -> bool {
        matches!(self, JumpKind::Always(_))
    }

    pub fn is_cond(&self) -> bool {
        matches!(self, JumpKind::Cond(_))
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, JumpKind::Switch(_))
    }

    pub fn is_return(&self) -> bool {
        matches!(self, JumpKind::Return)
    }

    pub fn is_throw(&self) -> bool {
        matches!(self, JumpKind::Throw)
    }

    pub fn is_call_handler(&self) -> bool {
        matches!(self, JumpKind::CallHandler(_))
    }

    pub fn switch_table(&self) -> Option<&SwitchTable> {
        match self {
            JumpKind::Switch(table) => Some(table),
            _ => None,
        }
    }

    pub fn switch_table_mut(&mut self) -> Option<&mut SwitchTable> {
        match self {
            JumpKind::Switch(table) => Some(table),
            _ => None,
        }
    }

    /// Size estimate of the machine code for the jump itself.
    pub fn cost(&self) -> u32 {
        match self {
            JumpKind::Always(_) | JumpKind::Cond(_) | JumpKind::CatchReturn(_) => 2,
            JumpKind::CallHandler(_) => 5,
            JumpKind::Switch(_) => 10,
            JumpKind::Throw => 1,
            JumpKind::HandlerReturn(_) | JumpKind::FilterReturn(_) | JumpKind::FaultReturn => 1,
            JumpKind::Return => 3,
        }
    }
}

impl_display! {
    match JumpKind{
        JumpKind::Always(target) => "jmp {}", target;
        JumpKind::Cond(target) => "cond {}", target;
        JumpKind::Switch(table) => "switch {}", table;
        JumpKind::Return => "return";
        JumpKind::Throw => "throw";
        JumpKind::CallHandler(target) => "callhandler {}", target;
        JumpKind::HandlerReturn(conts) => "handlerret [{}]", DisplayList(conts);
        JumpKind::FilterReturn(target) => "filterret {}", target;
        JumpKind::CatchReturn(target) => "catchret {}", target;
        JumpKind::FaultReturn => "faultret";
    }
}

impl std::fmt::Display for SwitchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", DisplayList(&self.targets))?;
        if let Some(dominant) = self.dominant {
            write!(f, " dominant {} {}", dominant.case, dominant.fraction)?;
        }
        Ok(())
    }
}

struct DisplayList<'a>(&'a [Block]);

impl std::fmt::Display for DisplayList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for block in self.0 {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{block}")?;
        }
        Ok(())
    }
}
