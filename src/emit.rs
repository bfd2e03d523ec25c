use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::Path;

use crate::ir::Value;
use crate::symbol::{fx_map, FxMap, Register, HOLDER};

/// Namespace for every generated function and for the storage root.
pub const NAMESPACE: &str = "elvm";
/// Storage holding the emulated memory and its scratch lists.
pub const STORAGE: &str = "elvm:elvm";
/// Datapack format written to `pack.mcmeta`.
pub const PACK_FORMAT: u32 = 48;

/// Inclusive score range as accepted by `matches`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MatchRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl MatchRange {
    pub fn exactly(value: i32) -> Self {
        MatchRange {
            min: Some(value),
            max: Some(value),
        }
    }

    pub fn between(min: i32, max: i32) -> Self {
        MatchRange {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: i32) -> Self {
        MatchRange {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: i32) -> Self {
        MatchRange {
            min: None,
            max: Some(max),
        }
    }

    pub fn contains(&self, value: i32) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

impl fmt::Display for MatchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min == max => write!(f, "{min}"),
            (Some(min), Some(max)) => write!(f, "{min}..{max}"),
            (Some(min), None) => write!(f, "{min}.."),
            (None, Some(max)) => write!(f, "..{max}"),
            (None, None) => f.write_str(".."),
        }
    }
}

/// Condition gating every command of one instruction: the program counter
/// must equal the instruction's index.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Guard {
    pc: i32,
}

impl Guard {
    pub fn pc(pc: i32) -> Self {
        Guard { pc }
    }

    /// Splice the guard into `cmd`, merging with an existing `execute` chain.
    pub fn wrap(&self, cmd: &str) -> String {
        let test = format!(
            "if score {HOLDER} {} matches {}",
            Register::Pc.objective(),
            self.pc
        );
        match cmd.strip_prefix("execute ") {
            Some(rest) => format!("execute {test} {rest}"),
            None => format!("execute {test} run {cmd}"),
        }
    }
}

/// Builder for `execute` chains.
#[derive(Clone, Default, Debug)]
pub struct Execute {
    parts: Vec<String>,
}

impl Execute {
    pub fn new() -> Self {
        Self::default()
    }

    fn test(mut self, positive: bool, rest: String) -> Self {
        let kw = if positive { "if" } else { "unless" };
        self.parts.push(format!("{kw} {rest}"));
        self
    }

    pub fn matches(self, positive: bool, objective: &str, range: MatchRange) -> Self {
        self.test(positive, format!("score {HOLDER} {objective} matches {range}"))
    }

    pub fn compare(self, positive: bool, lhs: &str, op: &str, rhs: &str) -> Self {
        self.test(positive, format!("score {HOLDER} {lhs} {op} {HOLDER} {rhs}"))
    }

    pub fn data(self, positive: bool, path: &str) -> Self {
        self.test(positive, format!("data storage {STORAGE} {path}"))
    }

    pub fn store_score(mut self, objective: &str) -> Self {
        self.parts
            .push(format!("store result score {HOLDER} {objective}"));
        self
    }

    pub fn store_storage(mut self, path: &str) -> Self {
        self.parts
            .push(format!("store result storage {STORAGE} {path} int 1"));
        self
    }

    pub fn run(self, cmd: &str) -> String {
        format!("execute {} run {cmd}", self.parts.join(" "))
    }
}

pub fn objective_add(objective: &str) -> String {
    format!("scoreboard objectives add {objective} dummy")
}

pub fn set(objective: &str, value: i32) -> String {
    format!("scoreboard players set {HOLDER} {objective} {value}")
}

pub fn add(objective: &str, amount: i32) -> String {
    debug_assert!(amount >= 0);
    format!("scoreboard players add {HOLDER} {objective} {amount}")
}

pub fn remove(objective: &str, amount: i32) -> String {
    debug_assert!(amount >= 0);
    format!("scoreboard players remove {HOLDER} {objective} {amount}")
}

pub fn operation(dst: &str, op: &str, src: &str) -> String {
    format!("scoreboard players operation {HOLDER} {dst} {op} {HOLDER} {src}")
}

/// Copy a register or load an immediate into `objective`.
pub fn assign(objective: &str, value: Value) -> String {
    match value {
        Value::Reg(reg) => operation(objective, "=", reg.objective()),
        Value::Imm(imm) => set(objective, imm),
    }
}

pub fn get(objective: &str) -> String {
    format!("scoreboard players get {HOLDER} {objective}")
}

pub fn call(name: &str) -> String {
    format!("function {NAMESPACE}:{name}")
}

pub fn data_set(path: &str, snbt: &str) -> String {
    format!("data modify storage {STORAGE} {path} set value {snbt}")
}

pub fn data_append(path: &str, snbt: &str) -> String {
    format!("data modify storage {STORAGE} {path} append value {snbt}")
}

pub fn data_append_from(path: &str, src: &str) -> String {
    format!("data modify storage {STORAGE} {path} append from storage {STORAGE} {src}")
}

pub fn data_prepend_from(path: &str, src: &str) -> String {
    format!("data modify storage {STORAGE} {path} prepend from storage {STORAGE} {src}")
}

pub fn data_remove(path: &str) -> String {
    format!("data remove storage {STORAGE} {path}")
}

pub fn data_get(path: &str) -> String {
    format!("data get storage {STORAGE} {path}")
}

/// A single `.mcfunction` file.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Function {
    name: String,
    lines: Vec<String>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource location, e.g. `elvm:func0`.
    pub fn id(&self) -> String {
        format!("{NAMESPACE}:{}", self.name)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line(&mut self, cmd: impl Into<String>) {
        self.lines.push(cmd.into());
    }

    /// Unguarded sink for command sequences.
    pub fn block(&mut self) -> Block<'_> {
        Block {
            lines: &mut self.lines,
            guard: None,
        }
    }

    /// Sink whose every command only runs under `guard`.
    pub fn guarded(&mut self, guard: Guard) -> Block<'_> {
        Block {
            lines: &mut self.lines,
            guard: Some(guard),
        }
    }
}

/// Where instruction and memory sequences are written.
pub struct Block<'a> {
    lines: &'a mut Vec<String>,
    guard: Option<Guard>,
}

impl Block<'_> {
    pub fn emit(&mut self, cmd: impl AsRef<str>) {
        let cmd = cmd.as_ref();
        let line = match &self.guard {
            Some(guard) => guard.wrap(cmd),
            None => cmd.to_string(),
        };
        self.lines.push(line);
    }
}

/// Every generated function, in emission order.
#[derive(Clone, Debug)]
pub struct Datapack {
    functions: FxMap<String, Function>,
}

impl Default for Datapack {
    fn default() -> Self {
        Self::new()
    }
}

impl Datapack {
    pub fn new() -> Self {
        Datapack {
            functions: fx_map(),
        }
    }

    pub fn insert(&mut self, function: Function) {
        let prev = self.functions.insert(function.name.clone(), function);
        debug_assert!(prev.is_none(), "function defined twice");
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Total number of command lines across all functions.
    pub fn command_count(&self) -> usize {
        self.functions().map(|f| f.lines.len()).sum()
    }

    /// All functions in one text, each under a `.mcfunction` header.
    pub fn render_listing(&self) -> String {
        let mut out = String::new();
        for function in self.functions() {
            let _ = writeln!(out, "========= {}.mcfunction =========", function.id());
            out.push_str("# Generated by lodestone\n");
            for line in &function.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Write a loadable datapack rooted at `root`.
    pub fn write_to(&self, root: &Path) -> io::Result<()> {
        let func_dir = root.join("data").join(NAMESPACE).join("function");
        let tag_dir = root
            .join("data")
            .join("minecraft")
            .join("tags")
            .join("function");
        fs::create_dir_all(&func_dir)?;
        fs::create_dir_all(&tag_dir)?;

        fs::write(
            root.join("pack.mcmeta"),
            format!(
                "{{\"pack\":{{\"pack_format\":{PACK_FORMAT},\"description\":\"Generated by lodestone\"}}}}\n"
            ),
        )?;
        fs::write(
            tag_dir.join("load.json"),
            format!("{{\"values\":[\"{NAMESPACE}:main\"]}}\n"),
        )?;
        for function in self.functions() {
            let mut text = String::from("# Generated by lodestone\n");
            for line in &function.lines {
                text.push_str(line);
                text.push('\n');
            }
            fs::write(func_dir.join(format!("{}.mcfunction", function.name)), text)?;
        }
        Ok(())
    }
}
