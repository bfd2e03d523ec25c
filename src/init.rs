use crate::codegen::CodegenOptions;
use crate::dispatch::{Layout, LOOP};
use crate::emit::{call, objective_add, set, Function};
use crate::ir::{Module, Value};
use crate::memory::{self, MemTable, BUCKETS, MEM_PHI};
use crate::symbol::{Register, Scratch};

pub const MAIN: &str = "main";

/// The `main` function: declares and zeroes every score, resets memory,
/// writes initial data, then hands over to the dispatcher.
pub fn initializer(module: &Module, opts: &CodegenOptions, layout: &Layout) -> Function {
    let mut func = Function::new(MAIN);
    let mut out = func.block();

    let objectives = Register::ALL
        .iter()
        .map(|r| r.objective())
        .chain(Scratch::ALL.iter().map(|s| s.objective()));
    for objective in objectives.clone() {
        out.emit(objective_add(objective));
    }
    for objective in objectives {
        out.emit(set(objective, 0));
    }
    out.emit(set(Scratch::MemPhi.objective(), MEM_PHI));
    out.emit(set(Scratch::MemLen.objective(), BUCKETS as i32));
    out.emit(set(Scratch::UintMax.objective(), opts.modulus()));
    out.emit(set(Scratch::SignBit.objective(), i32::MIN));

    memory::emit_reset(&mut out);
    let words = module
        .initial_memory()
        .map(|(addr, value)| (opts.word(addr), opts.word(value)));
    if opts.literal_data {
        let mut table = MemTable::new();
        for (addr, value) in words {
            table.store(addr, value);
        }
        if !table.is_empty() {
            memory::emit_literal(&mut out, &table);
        }
    } else {
        for (addr, value) in words {
            memory::emit_store(&mut out, Value::Imm(addr), Value::Imm(value));
        }
    }

    log::debug!(
        "initializer: {} data words, {} units",
        module.initial_memory().count(),
        layout.unit_count()
    );
    out.emit(call(LOOP));
    func
}
