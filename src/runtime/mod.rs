//! Executes a generated [`Datapack`] the way the game would, closely enough
//! to check generated programs without a server.

use miette::Result;

use crate::emit::{Datapack, STORAGE};
use crate::error;
use crate::init::MAIN;
use crate::memory::{MemTable, Record, BUCKETS};
use crate::output::Output;
use crate::symbol::{fx_map, FxMap, Register, HOLDER};

pub mod command;
pub mod storage;

use command::{Command, Condition, DataSource, Mode, ScoreOp, ScoreRef, Subcommand};
use storage::{Nbt, NbtPath, Storage};

#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    /// Commands executed before giving up
    pub max_commands: u64,
    /// Print every command before executing it
    pub trace: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            max_commands: 50_000_000,
            trace: false,
        }
    }
}

/// Scores and storage after (or during) a run.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    /// Objective to holder to value
    scores: FxMap<String, FxMap<String, i32>>,
    storage: Storage,
    executed: u64,
}

impl MemTable {
    /// Decode `mem`. `None` unless it is 32 lists of `{a,v}` records.
    pub fn from_storage(storage: &Storage) -> Option<MemTable> {
        let path: NbtPath = "mem".parse().ok()?;
        let buckets = storage.get(STORAGE, &path)?.as_list()?;
        if buckets.len() != BUCKETS {
            return None;
        }
        let buckets = buckets
            .iter()
            .map(|chain| {
                chain
                    .as_list()?
                    .iter()
                    .map(|record| {
                        let Nbt::Compound(fields) = record else {
                            return None;
                        };
                        Some(Record {
                            addr: fields.get("a")?.as_int()?,
                            value: fields.get("v")?.as_int()?,
                        })
                    })
                    .collect::<Option<Vec<_>>>()
            })
            .collect::<Option<Vec<_>>>()?;
        Some(MemTable::from_buckets(buckets))
    }
}

/// Result of one command.
enum Outcome {
    /// Command result, `None` when the command failed
    Done(Option<i32>),
    /// Continue in another function
    Call(usize),
}

impl RunState {
    pub fn new() -> Self {
        RunState {
            scores: fx_map(),
            storage: Storage::new(),
            executed: 0,
        }
    }

    /// Score of the machine holder, if set.
    pub fn score(&self, objective: &str) -> Option<i32> {
        self.scores.get(objective)?.get(HOLDER).copied()
    }

    /// Register value as an unsigned word.
    pub fn reg(&self, reg: Register) -> u32 {
        self.score(reg.objective()).unwrap_or(0) as u32
    }

    pub fn pc(&self) -> i32 {
        self.score(Register::Pc.objective()).unwrap_or(0)
    }

    pub fn halted(&self) -> bool {
        self.pc() < 0
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn commands_executed(&self) -> u64 {
        self.executed
    }

    /// Storage entry under the generated storage id.
    pub fn data(&self, path: &str) -> Option<&Nbt> {
        let path: NbtPath = path.parse().ok()?;
        self.storage.get(STORAGE, &path)
    }

    /// The emulated memory, if storage holds a well-shaped table.
    pub fn memory(&self) -> Option<MemTable> {
        MemTable::from_storage(&self.storage)
    }

    fn objective_mut(&mut self, objective: &str) -> Result<&mut FxMap<String, i32>, String> {
        self.scores
            .get_mut(objective)
            .ok_or_else(|| format!("unknown objective `{objective}`"))
    }

    fn read(&self, score: &ScoreRef) -> Result<Option<i32>, String> {
        let objective = self
            .scores
            .get(&score.objective)
            .ok_or_else(|| format!("unknown objective `{}`", score.objective))?;
        Ok(objective.get(&score.holder).copied())
    }

    /// Reading an unset score is an error outside of conditions.
    fn read_set(&self, score: &ScoreRef) -> Result<i32, String> {
        self.read(score)?
            .ok_or_else(|| format!("score {} {} is not set", score.holder, score.objective))
    }

    fn write(&mut self, score: &ScoreRef, value: i32) -> Result<(), String> {
        self.objective_mut(&score.objective)?
            .insert(score.holder.clone(), value);
        Ok(())
    }

    fn test(&self, cond: &Condition) -> Result<bool, String> {
        Ok(match cond {
            Condition::Matches(score, range) => self.read(score)?.is_some_and(|v| range.contains(v)),
            Condition::Compare(lhs, rel, rhs) => match (self.read(lhs)?, self.read(rhs)?) {
                (Some(l), Some(r)) => rel.holds(l, r),
                _ => false,
            },
            Condition::Data(data) => self.storage.get(&data.storage, &data.path).is_some(),
        })
    }

    fn execute(&mut self, cmd: &Command, functions: &FxMap<String, usize>) -> Result<Outcome, String> {
        let result = match cmd {
            Command::ObjectiveAdd(name) => {
                self.scores.entry(name.clone()).or_insert_with(fx_map);
                Some(0)
            }
            Command::Set(score, value) => {
                self.write(score, *value)?;
                Some(*value)
            }
            Command::Add(score, amount) | Command::Remove(score, amount) => {
                let amount = match cmd {
                    Command::Remove(..) => amount.wrapping_neg(),
                    _ => *amount,
                };
                let value = self.read(score)?.unwrap_or(0).wrapping_add(amount);
                self.write(score, value)?;
                Some(value)
            }
            Command::Operation(dst, op, src) => {
                let rhs = self.read_set(src)?;
                let lhs = self.read(dst)?.unwrap_or(0);
                let value = match op {
                    ScoreOp::Assign => rhs,
                    ScoreOp::Add => lhs.wrapping_add(rhs),
                    ScoreOp::Sub => lhs.wrapping_sub(rhs),
                    ScoreOp::Mul => lhs.wrapping_mul(rhs),
                    ScoreOp::Div => floor_div(lhs, rhs),
                    ScoreOp::Mod => floor_mod(lhs, rhs),
                    ScoreOp::Min => lhs.min(rhs),
                    ScoreOp::Max => lhs.max(rhs),
                    ScoreOp::Swap => {
                        self.write(src, lhs)?;
                        rhs
                    }
                };
                self.write(dst, value)?;
                Some(value)
            }
            Command::Get(score) => self.read(score)?,
            Command::Modify {
                target,
                mode,
                source,
            } => {
                let value = match source {
                    DataSource::Value(nbt) => Some(nbt.clone()),
                    DataSource::From(from) => self.storage.get(&from.storage, &from.path).cloned(),
                };
                match value {
                    None => None,
                    Some(value) => match mode {
                        Mode::Set => self
                            .storage
                            .set(&target.storage, &target.path, value)
                            .then_some(1),
                        Mode::Append | Mode::Prepend => {
                            match self.storage.get_mut(&target.storage, &target.path) {
                                Some(Nbt::List(items)) => {
                                    if *mode == Mode::Append {
                                        items.push(value);
                                    } else {
                                        items.insert(0, value);
                                    }
                                    Some(items.len() as i32)
                                }
                                _ => None,
                            }
                        }
                    },
                }
            }
            Command::DataRemove(data) => self.storage.remove(&data.storage, &data.path).then_some(1),
            Command::DataGet(data) => self
                .storage
                .get(&data.storage, &data.path)
                .map(Nbt::get_result),
            Command::Function(name) => {
                let idx = functions
                    .get(name)
                    .ok_or_else(|| format!("unknown function `{name}`"))?;
                return Ok(Outcome::Call(*idx));
            }
            Command::Execute { subcommands, run } => {
                let mut stores = Vec::new();
                for sub in subcommands {
                    match sub {
                        Subcommand::Test { positive, cond } => {
                            if self.test(cond)? != *positive {
                                return Ok(Outcome::Done(None));
                            }
                        }
                        store => stores.push(store),
                    }
                }
                let result = match self.execute(run, functions)? {
                    Outcome::Call(idx) if stores.is_empty() => return Ok(Outcome::Call(idx)),
                    Outcome::Call(_) => {
                        return Err("cannot store the result of a function".to_string())
                    }
                    Outcome::Done(result) => result,
                };
                // Failed commands store 0
                let value = result.unwrap_or(0);
                for store in stores {
                    match store {
                        Subcommand::StoreScore(score) => self.write(score, value)?,
                        Subcommand::StoreStorage { target, scale } => {
                            let scaled = (value as f64 * scale) as i32;
                            self.storage
                                .set(&target.storage, &target.path, Nbt::Int(scaled));
                        }
                        Subcommand::Test { .. } => {}
                    }
                }
                result
            }
        };
        Ok(Outcome::Done(result))
    }
}

/// Division rounding toward negative infinity. A zero divisor leaves `lhs` unchanged.
fn floor_div(lhs: i32, rhs: i32) -> i32 {
    if rhs == 0 {
        return lhs;
    }
    let q = lhs.wrapping_div(rhs);
    if lhs.wrapping_rem(rhs) != 0 && ((lhs < 0) != (rhs < 0)) {
        q.wrapping_sub(1)
    } else {
        q
    }
}

/// Remainder with the sign of the divisor. A zero divisor leaves `lhs` unchanged.
fn floor_mod(lhs: i32, rhs: i32) -> i32 {
    if rhs == 0 {
        return lhs;
    }
    let r = lhs.wrapping_rem(rhs);
    if r != 0 && ((r < 0) != (rhs < 0)) {
        r + rhs
    } else {
        r
    }
}

struct Frame {
    func: usize,
    line: usize,
}

/// A datapack with every command parsed, ready to run.
pub struct Simulator<'p> {
    pack: &'p Datapack,
    /// Function id to index into `bodies`
    functions: FxMap<String, usize>,
    bodies: Vec<Vec<Command>>,
    state: RunState,
    opts: RunOptions,
}

impl<'p> Simulator<'p> {
    pub fn new(pack: &'p Datapack, opts: RunOptions) -> Result<Self> {
        let mut functions = fx_map();
        for (idx, func) in pack.functions().enumerate() {
            functions.insert(func.id(), idx);
        }
        let mut bodies = Vec::with_capacity(pack.len());
        for func in pack.functions() {
            let mut body = Vec::with_capacity(func.lines().len());
            for (line, text) in func.lines().iter().enumerate() {
                let cmd: Command = text
                    .parse()
                    .map_err(|reason: String| error::runtime_command(func.name(), line + 1, text, &reason))?;
                if let Some(callee) = cmd.callee() {
                    if !functions.contains_key(callee) {
                        return Err(error::runtime_function(callee));
                    }
                }
                body.push(cmd);
            }
            bodies.push(body);
        }
        Ok(Simulator {
            pack,
            functions,
            bodies,
            state: RunState::new(),
            opts,
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn into_state(self) -> RunState {
        self.state
    }

    /// Run function `name` (without namespace) to completion.
    pub fn call(&mut self, name: &str) -> Result<()> {
        let id = format!("{}:{name}", crate::emit::NAMESPACE);
        let start = *self
            .functions
            .get(&id)
            .ok_or_else(|| error::runtime_function(&id))?;
        let pack = self.pack;
        let names: Vec<&str> = pack.functions().map(|f| f.name()).collect();

        let mut stack = vec![Frame {
            func: start,
            line: 0,
        }];
        while let Some(frame) = stack.last_mut() {
            let body = &self.bodies[frame.func];
            if frame.line >= body.len() {
                stack.pop();
                continue;
            }
            let (func, line) = (frame.func, frame.line);
            frame.line += 1;
            let is_last = frame.line == body.len();

            self.state.executed += 1;
            if self.state.executed > self.opts.max_commands {
                return Err(error::runtime_budget(self.opts.max_commands));
            }
            let text = || {
                pack.get(names[func])
                    .map_or("", |f| f.lines()[line].as_str())
            };
            if self.opts.trace {
                Output::Trace.print_command(names[func], line + 1, text());
            }

            let outcome = self
                .state
                .execute(&self.bodies[func][line], &self.functions)
                .map_err(|reason| error::runtime_command(names[func], line + 1, text(), &reason))?;
            if let Outcome::Call(target) = outcome {
                // Tail calls replace the caller, keeping the stack flat
                if is_last {
                    stack.pop();
                }
                stack.push(Frame {
                    func: target,
                    line: 0,
                });
            }
        }
        Ok(())
    }
}

/// Run `main` of a generated datapack.
pub fn run(pack: &Datapack, opts: RunOptions) -> Result<RunState> {
    let mut sim = Simulator::new(pack, opts)?;
    sim.call(MAIN)?;
    log::debug!("executed {} commands", sim.state().commands_executed());
    Ok(sim.into_state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::Function;

    fn pack_of(functions: &[(&str, &[&str])]) -> Datapack {
        let mut pack = Datapack::new();
        for (name, lines) in functions {
            let mut f = Function::new(*name);
            for line in *lines {
                f.line(*line);
            }
            pack.insert(f);
        }
        pack
    }

    #[test]
    fn floor_semantics() {
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(7, -2), -4);
        assert_eq!(floor_div(7, 0), 7);
        assert_eq!(floor_mod(-7, 32), 25);
        assert_eq!(floor_mod(7, -2), -1);
        assert_eq!(floor_mod(i32::MIN, -1), 0);
        assert_eq!(floor_div(i32::MIN, -1), i32::MIN);
    }

    #[test]
    fn scores_wrap() {
        let pack = pack_of(&[(
            "main",
            &[
                "scoreboard objectives add x dummy",
                "scoreboard players set ELVM x 2147483647",
                "scoreboard players add ELVM x 1",
            ],
        )]);
        let state = run(&pack, RunOptions::default()).unwrap();
        assert_eq!(state.score("x"), Some(i32::MIN));
    }

    #[test]
    fn execute_store_and_conditions() {
        let pack = pack_of(&[(
            "main",
            &[
                "scoreboard objectives add x dummy",
                "scoreboard objectives add y dummy",
                "data modify storage elvm:elvm l set value [{a:5}]",
                "execute if data storage elvm:elvm l[0] store result score ELVM x run data get storage elvm:elvm l[0].a",
                "execute unless score ELVM x matches 5 run scoreboard players set ELVM x 0",
                "execute if score ELVM y matches 0.. run scoreboard players set ELVM x 0",
                "execute store result storage elvm:elvm l[0].a int 1 run data get storage elvm:elvm missing",
            ],
        )]);
        let state = run(&pack, RunOptions::default()).unwrap();
        assert_eq!(state.score("x"), Some(5));
        assert_eq!(state.data("l[0].a"), Some(&Nbt::Int(0)));
    }

    #[test]
    fn tail_calls_do_not_grow_the_stack() {
        let pack = pack_of(&[
            (
                "main",
                &[
                    "scoreboard objectives add n dummy",
                    "scoreboard players set ELVM n 100000",
                    "function elvm:count",
                ],
            ),
            (
                "count",
                &[
                    "scoreboard players remove ELVM n 1",
                    "execute if score ELVM n matches 1.. run function elvm:count",
                ],
            ),
        ]);
        let state = run(&pack, RunOptions::default()).unwrap();
        assert_eq!(state.score("n"), Some(0));
    }

    #[test]
    fn budget_stops_runaway_programs() {
        let pack = pack_of(&[("main", &["function elvm:main"])]);
        let err = run(
            &pack,
            RunOptions {
                max_commands: 1000,
                trace: false,
            },
        )
        .unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "runtime::budget");
    }

    #[test]
    fn unknown_commands_and_functions_are_rejected() {
        let pack = pack_of(&[("main", &["say hello"])]);
        let err = run(&pack, RunOptions::default()).unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "runtime::command");

        let pack = pack_of(&[("main", &["function elvm:nowhere"])]);
        let err = run(&pack, RunOptions::default()).unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "runtime::function");
    }

    #[test]
    fn unset_scores_fail_operations() {
        let pack = pack_of(&[(
            "main",
            &[
                "scoreboard objectives add x dummy",
                "scoreboard players operation ELVM x = ELVM y",
            ],
        )]);
        let err = run(&pack, RunOptions::default()).unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "runtime::command");
    }
}
