use std::fmt;

use crate::symbol::Register;

/// Register or immediate operand.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Value {
    Reg(Register),
    Imm(i32),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Reg(reg) => write!(f, "{reg}"),
            Value::Imm(imm) => write!(f, "{imm}"),
        }
    }
}

/// Comparison carried by compare-set and conditional jump instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Cond {
    /// Logical complement, so that `a OP b == !(a OP.negate() b)`.
    pub const fn negate(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
        }
    }

    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Cond::Eq => lhs == rhs,
            Cond::Ne => lhs != rhs,
            Cond::Lt => lhs < rhs,
            Cond::Gt => lhs > rhs,
            Cond::Le => lhs <= rhs,
            Cond::Ge => lhs >= rhs,
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lt",
            Cond::Gt => "gt",
            Cond::Le => "le",
            Cond::Ge => "ge",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Op {
    Mov,
    Add,
    Sub,
    Load,
    Store,
    Putc,
    Getc,
    Exit,
    Dump,
    /// Compare and write 1 or 0 into the destination
    Set(Cond),
    Jmp,
    /// Conditional jump
    Jcc(Cond),
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Mov => f.write_str("mov"),
            Op::Add => f.write_str("add"),
            Op::Sub => f.write_str("sub"),
            Op::Load => f.write_str("load"),
            Op::Store => f.write_str("store"),
            Op::Putc => f.write_str("putc"),
            Op::Getc => f.write_str("getc"),
            Op::Exit => f.write_str("exit"),
            Op::Dump => f.write_str("dump"),
            Op::Set(cond) => f.write_str(cond.suffix()),
            Op::Jmp => f.write_str("jmp"),
            Op::Jcc(cond) => write!(f, "j{}", cond.suffix()),
        }
    }
}

/// Reduce a comparison opcode to its condition, complemented when `invert` is set.
///
/// Returns `None` for opcodes that carry no comparison.
pub fn normalize_cond(op: Op, invert: bool) -> Option<Cond> {
    let cond = match op {
        Op::Set(cond) | Op::Jcc(cond) => cond,
        _ => return None,
    };
    Some(if invert { cond.negate() } else { cond })
}

/// Single instruction. Which operands are present depends on the opcode.
///
/// `store` keeps the value in `dst` and the address in `src`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Inst {
    pub op: Op,
    pub dst: Option<Value>,
    pub src: Option<Value>,
    pub jmp: Option<Value>,
    /// Source line, for diagnostics. Zero when built by hand.
    pub line: usize,
}

impl Inst {
    pub fn new(op: Op) -> Self {
        Inst {
            op,
            dst: None,
            src: None,
            jmp: None,
            line: 0,
        }
    }

    pub fn dst(mut self, value: Value) -> Self {
        self.dst = Some(value);
        self
    }

    pub fn src(mut self, value: Value) -> Self {
        self.src = Some(value);
        self
    }

    pub fn jmp(mut self, value: Value) -> Self {
        self.jmp = Some(value);
        self
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        let operands = [self.jmp, self.dst, self.src];
        let mut first = true;
        for value in operands.iter().flatten() {
            f.write_str(if first { " " } else { ", " })?;
            write!(f, "{value}")?;
            first = false;
        }
        Ok(())
    }
}

/// A whole program: instruction stream plus initial memory.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Module {
    pub text: Vec<Inst>,
    /// Word at index `i` is the initial value of address `i`. Zeros are not materialized.
    pub data: Vec<i32>,
}

impl Module {
    pub fn new(text: Vec<Inst>, data: Vec<i32>) -> Self {
        Module { text, data }
    }

    /// Nonzero initial memory words as `(address, value)` pairs.
    pub fn initial_memory(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(|(addr, v)| (addr as i32, *v))
    }
}
