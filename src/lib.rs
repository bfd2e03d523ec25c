// Front end
mod lexer;
mod parser;
pub use parser::EirParser;
pub mod ir;
pub use ir::{Inst, Module, Op, Value};

// Code generation
pub mod codegen;
pub use codegen::{generate, Codegen, CodegenOptions};
pub mod dispatch;
pub mod emit;
pub use emit::{Datapack, Function};
pub mod init;
pub mod memory;
pub use memory::MemTable;

// Simulation
pub mod runtime;
pub use runtime::{RunOptions, RunState, Simulator};
pub mod output;

mod error;
pub mod symbol;
pub use symbol::Register;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;

/// Parse `.eir` source into a module.
pub fn parse(src: &str) -> miette::Result<Module> {
    EirParser::new(src)?.parse()
}
