//! Splits the instruction stream into units of `chunk_size` instructions, one
//! function each, and builds the `loop` function that routes the program
//! counter to its unit until the program halts.

use miette::Result;

use crate::emit::{call, Block, Datapack, Execute, Function, Guard, MatchRange};
use crate::ir::Inst;
use crate::symbol::Register;

pub const LOOP: &str = "loop";

/// One dispatch unit, owning instructions `start..end`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Unit {
    pub id: usize,
    pub start: usize,
    pub end: usize,
    chunk_size: usize,
}

impl Unit {
    pub fn name(&self) -> String {
        format!("func{}", self.id)
    }

    /// Program counter values routed here. The last unit's range runs past
    /// the end of the program.
    pub fn range(&self) -> MatchRange {
        let start = self.id * self.chunk_size;
        MatchRange::between(start as i32, (start + self.chunk_size - 1) as i32)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Layout {
    len: usize,
    chunk_size: usize,
}

impl Layout {
    pub fn new(len: usize, chunk_size: usize) -> Self {
        debug_assert!(chunk_size > 0);
        Layout { len, chunk_size }
    }

    pub fn unit_count(&self) -> usize {
        self.len.div_ceil(self.chunk_size)
    }

    pub fn units(&self) -> impl Iterator<Item = Unit> + '_ {
        (0..self.unit_count()).map(|id| Unit {
            id,
            start: id * self.chunk_size,
            end: ((id + 1) * self.chunk_size).min(self.len),
            chunk_size: self.chunk_size,
        })
    }

    /// Every routed program counter, up to the end of the last unit, is a
    /// non-negative score.
    pub fn fits_scores(&self) -> bool {
        self.unit_count()
            .checked_mul(self.chunk_size)
            .is_some_and(|end| end <= i32::MAX as usize)
    }

    /// Unit owning `pc`, if it is an instruction index.
    pub fn unit_for(&self, pc: i64) -> Option<usize> {
        if pc < 0 || pc as u64 >= self.len as u64 {
            return None;
        }
        Some(pc as usize / self.chunk_size)
    }
}

/// Emit one function per unit, each instruction compiled under its own pc guard.
pub fn emit_units<F>(pack: &mut Datapack, layout: &Layout, text: &[Inst], mut compile: F) -> Result<()>
where
    F: FnMut(&mut Block, usize, &Inst) -> Result<()>,
{
    for unit in layout.units() {
        let mut func = Function::new(unit.name());
        for (pc, inst) in text.iter().enumerate().take(unit.end).skip(unit.start) {
            let mut out = func.guarded(Guard::pc(pc as i32));
            compile(&mut out, pc, inst)?;
        }
        log::trace!("{}: {} commands", unit.name(), func.lines().len());
        pack.insert(func);
    }
    Ok(())
}

/// The dispatcher: run the unit owning pc, then recurse while pc is not negative.
pub fn dispatcher(layout: &Layout) -> Function {
    let pc = Register::Pc.objective();
    let mut func = Function::new(LOOP);
    for unit in layout.units() {
        func.line(Execute::new().matches(true, pc, unit.range()).run(&call(&unit.name())));
    }
    // An empty program would spin forever
    if layout.unit_count() > 0 {
        func.line(Execute::new().matches(true, pc, MatchRange::at_least(0)).run(&call(LOOP)));
    }
    func
}
