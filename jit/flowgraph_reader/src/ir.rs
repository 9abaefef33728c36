//! The statement language of the reader.
//!
//! ```text
//! nop
//! l1 = 5
//! l1 = add l1, 1
//! l2 = lt l1, l3
//! l2 = len l4
//! l2 = call f1
//! call f2
//! tailcall f3
//! jtrue lt l1, 10
//! switch l1
//! ret l1
//! ```
//!
//! `jtrue`, `switch` and `ret` supply the test or value of the block's jump and therefore always
//! come last in their block.

use std::fmt;

use flowgraph::{Local, LocalStore, SideEffects, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Local(Local),
    Const(i64),
}

impl Operand {
    pub fn local(self) -> Option<Local> {
        match self {
            Operand::Local(local) => Some(local),
            Operand::Const(_) => None,
        }
    }

    pub fn is_const(self) -> bool {
        matches!(self, Operand::Const(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Local(local) => write!(f, "{local}"),
            Operand::Const(val) => write!(f, "{val}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
}

impl BinOp {
    pub fn from_name(name: &str) -> Option<BinOp> {
        let op = match name {
            "add" => BinOp::Add,
            "sub" => BinOp::Sub,
            "mul" => BinOp::Mul,
            "and" => BinOp::And,
            "or" => BinOp::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    pub fn from_name(name: &str) -> Option<RelOp> {
        let op = match name {
            "eq" => RelOp::Eq,
            "ne" => RelOp::Ne,
            "lt" => RelOp::Lt,
            "le" => RelOp::Le,
            "gt" => RelOp::Gt,
            "ge" => RelOp::Ge,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(self) -> &'static str {
        match self {
            RelOp::Eq => "eq",
            RelOp::Ne => "ne",
            RelOp::Lt => "lt",
            RelOp::Le => "le",
            RelOp::Gt => "gt",
            RelOp::Ge => "ge",
        }
    }

    /// The relation that holds exactly when `self` does not.
    pub fn reverse(self) -> RelOp {
        match self {
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Le => RelOp::Gt,
            RelOp::Gt => RelOp::Le,
            RelOp::Ge => RelOp::Lt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Use(Operand),
    Binary(BinOp, Operand, Operand),
    Compare(RelOp, Operand, Operand),
    /// Length of the array stored in a local.
    Len(Local),
    /// Result of a call to the function with the given number.
    Call(u32),
}

impl Expr {
    fn effects(&self) -> SideEffects {
        match self {
            Expr::Call(_) => SideEffects::CALL | SideEffects::EXCEPT | SideEffects::GLOB_REF,
            Expr::Len(_) => SideEffects::EXCEPT,
            Expr::Use(_) | Expr::Binary(..) | Expr::Compare(..) => SideEffects::empty(),
        }
    }

    fn cost(&self) -> u32 {
        match self {
            Expr::Use(_) => 1,
            Expr::Binary(..) | Expr::Compare(..) | Expr::Len(_) => 2,
            Expr::Call(_) => 5,
        }
    }

    fn operands(&self) -> impl Iterator<Item = Operand> {
        let (a, b) = match *self {
            Expr::Use(op) => (Some(op), None),
            Expr::Binary(_, lhs, rhs) | Expr::Compare(_, lhs, rhs) => (Some(lhs), Some(rhs)),
            Expr::Len(local) => (Some(Operand::Local(local)), None),
            Expr::Call(_) => (None, None),
        };
        a.into_iter().chain(b)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Use(op) => write!(f, "{op}"),
            Expr::Binary(op, lhs, rhs) => write!(f, "{} {lhs}, {rhs}", op.name()),
            Expr::Compare(op, lhs, rhs) => write!(f, "{} {lhs}, {rhs}", op.name()),
            Expr::Len(local) => write!(f, "len {local}"),
            Expr::Call(func) => write!(f, "call f{func}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Nop,
    Store { dst: Local, value: Expr },
    Call { func: u32, tail: bool },
    /// The test of a `cond` jump.
    JumpTrue(RelOp, Operand, Operand),
    /// The value a `switch` jump dispatches on.
    Switch(Operand),
    /// The value returned by a `return` jump.
    Ret(Option<Operand>),
}

impl Stmt {
    fn operands(&self) -> Vec<Operand> {
        match self {
            Stmt::Nop | Stmt::Call { .. } | Stmt::Ret(None) => Vec::new(),
            Stmt::Store { dst, value } => {
                let mut res = vec![Operand::Local(*dst)];
                res.extend(value.operands());
                res
            }
            Stmt::JumpTrue(_, lhs, rhs) => vec![*lhs, *rhs],
            Stmt::Switch(op) | Stmt::Ret(Some(op)) => vec![*op],
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Nop => write!(f, "nop"),
            Stmt::Store { dst, value } => write!(f, "{dst} = {value}"),
            Stmt::Call { func, tail: false } => write!(f, "call f{func}"),
            Stmt::Call { func, tail: true } => write!(f, "tailcall f{func}"),
            Stmt::JumpTrue(op, lhs, rhs) => write!(f, "jtrue {} {lhs}, {rhs}", op.name()),
            Stmt::Switch(op) => write!(f, "switch {op}"),
            Stmt::Ret(None) => write!(f, "ret"),
            Stmt::Ret(Some(op)) => write!(f, "ret {op}"),
        }
    }
}

impl Statement for Stmt {
    fn equivalent(&self, other: &Self) -> bool {
        self == other
    }

    fn side_effects(&self) -> SideEffects {
        match self {
            Stmt::Store { value, .. } => SideEffects::ASG | value.effects(),
            Stmt::Call { .. } => SideEffects::CALL | SideEffects::EXCEPT | SideEffects::GLOB_REF,
            Stmt::Nop | Stmt::JumpTrue(..) | Stmt::Switch(_) | Stmt::Ret(_) => SideEffects::empty(),
        }
    }

    fn cost(&self) -> u32 {
        match self {
            Stmt::Nop => 0,
            Stmt::Store { value, .. } => 1 + value.cost(),
            Stmt::Call { .. } => 5,
            Stmt::JumpTrue(..) => 2,
            Stmt::Switch(_) | Stmt::Ret(_) => 1,
        }
    }

    fn is_nop(&self) -> bool {
        matches!(self, Stmt::Nop)
    }

    fn is_terminator(&self) -> bool {
        matches!(self, Stmt::JumpTrue(..) | Stmt::Switch(_) | Stmt::Ret(_))
    }

    fn local_store(&self) -> Option<LocalStore> {
        match self {
            Stmt::Store { dst, value } => Some(LocalStore {
                local: *dst,
                value_effects: value.effects(),
                address_exposed: false,
            }),
            _ => None,
        }
    }

    fn references_local(&self, local: Local) -> bool {
        self.operands().contains(&Operand::Local(local))
    }

    fn contains_tail_call(&self) -> bool {
        matches!(self, Stmt::Call { tail: true, .. })
    }

    fn extract_side_effects(&self) -> Option<Self> {
        match self {
            Stmt::Store { value: Expr::Call(func), .. } => {
                Some(Stmt::Call { func: *func, tail: false })
            }
            Stmt::Call { .. } => Some(self.clone()),
            _ => None,
        }
    }

    fn is_compare_branch(&self) -> bool {
        matches!(self, Stmt::JumpTrue(..))
    }

    fn reverse_condition(&mut self) -> bool {
        match self {
            Stmt::JumpTrue(op, ..) => {
                *op = op.reverse();
                true
            }
            _ => false,
        }
    }

    fn switch_to_zero_compare(&self) -> Option<Self> {
        match *self {
            Stmt::Switch(val) => Some(Stmt::JumpTrue(RelOp::Eq, val, Operand::Const(0))),
            _ => None,
        }
    }

    fn switch_case_compare(&self, case: usize) -> Option<Self> {
        match *self {
            Stmt::Switch(val) => {
                Some(Stmt::JumpTrue(RelOp::Eq, val, Operand::Const(case as i64)))
            }
            _ => None,
        }
    }

    fn tested_local(&self) -> Option<Local> {
        match *self {
            Stmt::JumpTrue(_, Operand::Local(local), Operand::Const(_))
            | Stmt::JumpTrue(_, Operand::Const(_), Operand::Local(local)) => Some(local),
            _ => None,
        }
    }

    fn simple_local_update(&self) -> Option<(Local, Local)> {
        let Stmt::Store { dst, value: Expr::Binary(_, lhs, rhs) } = *self else { return None };
        match (lhs, rhs) {
            (Operand::Local(local), Operand::Const(_))
            | (Operand::Const(_), Operand::Local(local)) => Some((dst, local)),
            (Operand::Local(a), Operand::Local(b)) if a == b => Some((dst, a)),
            _ => None,
        }
    }

    fn stores_favorable_value(&self, local: Local) -> bool {
        match self {
            Stmt::Store { dst, value } if *dst == local => match value {
                Expr::Use(op) => op.is_const(),
                Expr::Len(_) | Expr::Compare(..) => true,
                Expr::Binary(..) | Expr::Call(_) => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(n: u32) -> Local {
        Local::from(n)
    }

    #[test]
    fn branch_shapes() {
        let mut test = Stmt::JumpTrue(RelOp::Lt, Operand::Local(l(1)), Operand::Const(10));
        assert_eq!(test.tested_local(), Some(l(1)));
        assert!(test.reverse_condition());
        assert_eq!(test.to_string(), "jtrue ge l1, 10");

        let switch = Stmt::Switch(Operand::Local(l(2)));
        let zero = switch.switch_to_zero_compare().unwrap();
        assert_eq!(zero.to_string(), "jtrue eq l2, 0");
        let case = switch.switch_case_compare(3).unwrap();
        assert_eq!(case.to_string(), "jtrue eq l2, 3");
        assert!(switch.is_terminator());
    }

    #[test]
    fn store_shapes() {
        let incr = Stmt::Store {
            dst: l(3),
            value: Expr::Binary(BinOp::Add, Operand::Local(l(3)), Operand::Const(1)),
        };
        assert_eq!(incr.simple_local_update(), Some((l(3), l(3))));
        assert!(!incr.stores_favorable_value(l(3)));
        assert!(incr.references_local(l(3)));
        assert_eq!(incr.side_effects(), SideEffects::ASG);

        let call = Stmt::Store { dst: l(1), value: Expr::Call(4) };
        assert_eq!(call.extract_side_effects(), Some(Stmt::Call { func: 4, tail: false }));
        assert!(call.side_effects().contains(SideEffects::CALL));

        let cnst = Stmt::Store { dst: l(1), value: Expr::Use(Operand::Const(0)) };
        assert!(cnst.stores_favorable_value(l(1)));
        assert!(!cnst.stores_favorable_value(l(2)));
    }
}
