use std::cell::RefCell;
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::memory::{bucket_of, MemTable};
use crate::runtime::RunState;
use crate::symbol::Register;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    /// Program results, to stdout
    Normal,
    /// Command trace, to stderr. Silent if `--minimal`
    Trace,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }

    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    pub fn print_str(&self, string: &str) {
        match (self, Self::is_minimal()) {
            (Self::Normal, false) => print!("{string}"),
            // Dumps are compared verbatim by tests
            (Self::Normal, true) => print!("{}", Decolored::new(string).collect::<String>()),
            (Self::Trace, false) => eprint!("{}", ColoredString::from(string).blue()),
            (Self::Trace, true) => (),
        }
    }

    pub fn print_command(&self, function: &str, line: usize, cmd: &str) {
        self.print_str(&format!("{function}:{line:<4} {cmd}\n"));
    }

    pub fn print_registers(&self, state: &RunState) {
        if Self::is_minimal() {
            for reg in Register::ALL {
                match reg {
                    // Halted is -1
                    Register::Pc => self.print_str(&format!("PC {}\n", state.pc())),
                    _ => self.print_str(&format!("{} {}\n", reg.name(), state.reg(reg))),
                }
            }
            return;
        }

        self.print_str("\x1b[2m┌───────────────────────────────────────┐\x1b[0m\n");
        self.print_str(
            "\x1b[2m│        \x1b[3mhex            uint         int\x1b[0m\x1b[2m │\x1b[0m\n",
        );
        for reg in Register::ALL {
            let value = state.reg(reg);
            self.print_str("\x1b[2m│\x1b[0m");
            self.print_str(&format!(" \x1b[1m{:<3}\x1b[0m ", reg.name()));
            self.print_str(&format!(
                "0x{value:08x}  {value:>10}  {:>11}",
                value as i32
            ));
            self.print_str(" \x1b[2m│\x1b[0m\n");
        }
        self.print_str("\x1b[2m└───────────────────────────────────────┘\x1b[0m\n");
    }

    pub fn print_memory(&self, table: &MemTable) {
        let records = table.records();
        if Self::is_minimal() {
            for record in records {
                self.print_str(&format!("{} {}\n", record.addr, record.value));
            }
            return;
        }

        if records.is_empty() {
            self.print_str("\x1b[2m(memory is empty)\x1b[0m\n");
            return;
        }
        self.print_str("\x1b[2m     \x1b[3maddress        value  bucket\x1b[0m\n");
        for record in records {
            self.print_str(&format!(
                " {:>11}  {:>11}  \x1b[2m{:>6}\x1b[0m\n",
                record.addr,
                record.value,
                bucket_of(record.addr)
            ));
        }
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}
