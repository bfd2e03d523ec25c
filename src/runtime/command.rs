use std::str::FromStr;

use crate::emit::MatchRange;
use crate::runtime::storage::{Nbt, NbtPath};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ScoreRef {
    pub holder: String,
    pub objective: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DataRef {
    pub storage: String,
    pub path: NbtPath,
}

/// Operators of `scoreboard players operation`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScoreOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Swap,
}

impl FromStr for ScoreOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "=" => ScoreOp::Assign,
            "+=" => ScoreOp::Add,
            "-=" => ScoreOp::Sub,
            "*=" => ScoreOp::Mul,
            "/=" => ScoreOp::Div,
            "%=" => ScoreOp::Mod,
            "<" => ScoreOp::Min,
            ">" => ScoreOp::Max,
            "><" => ScoreOp::Swap,
            _ => return Err(format!("unknown operation `{s}`")),
        })
    }
}

/// Relations of `execute if score ... <op> ...`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Relation {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Relation {
    pub fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Relation::Lt => lhs < rhs,
            Relation::Le => lhs <= rhs,
            Relation::Eq => lhs == rhs,
            Relation::Ge => lhs >= rhs,
            Relation::Gt => lhs > rhs,
        }
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "<" => Relation::Lt,
            "<=" => Relation::Le,
            "=" => Relation::Eq,
            ">=" => Relation::Ge,
            ">" => Relation::Gt,
            _ => return Err(format!("unknown relation `{s}`")),
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Condition {
    Matches(ScoreRef, MatchRange),
    Compare(ScoreRef, Relation, ScoreRef),
    Data(DataRef),
}

#[derive(Clone, PartialEq, Debug)]
pub enum Subcommand {
    Test { positive: bool, cond: Condition },
    StoreScore(ScoreRef),
    StoreStorage { target: DataRef, scale: f64 },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Set,
    Append,
    Prepend,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum DataSource {
    Value(Nbt),
    From(DataRef),
}

/// One parsed command line.
#[derive(Clone, PartialEq, Debug)]
pub enum Command {
    ObjectiveAdd(String),
    Set(ScoreRef, i32),
    Add(ScoreRef, i32),
    Remove(ScoreRef, i32),
    Operation(ScoreRef, ScoreOp, ScoreRef),
    Get(ScoreRef),
    Modify {
        target: DataRef,
        mode: Mode,
        source: DataSource,
    },
    DataRemove(DataRef),
    DataGet(DataRef),
    Function(String),
    Execute {
        subcommands: Vec<Subcommand>,
        run: Box<Command>,
    },
}

impl Command {
    /// Function called by this command, looking through `execute`.
    pub fn callee(&self) -> Option<&str> {
        match self {
            Command::Function(name) => Some(name),
            Command::Execute { run, .. } => run.callee(),
            _ => None,
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = Words::new(s);
        let cmd = parse_command(&mut words)?;
        match words.next() {
            Some(extra) => Err(format!("unexpected `{extra}`")),
            None => Ok(cmd),
        }
    }
}

/// Whitespace separated words with access to the unparsed rest.
struct Words<'a> {
    rest: &'a str,
}

impl<'a> Words<'a> {
    fn new(s: &'a str) -> Self {
        Words { rest: s }
    }

    fn next(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let (word, rest) = trimmed.split_at(end);
        self.rest = rest;
        Some(word)
    }

    fn word(&mut self, what: &str) -> Result<&'a str, String> {
        self.next().ok_or_else(|| format!("expected {what}"))
    }

    fn keyword(&mut self, kw: &str) -> Result<(), String> {
        match self.next() {
            Some(word) if word == kw => Ok(()),
            Some(word) => Err(format!("expected `{kw}`, found `{word}`")),
            None => Err(format!("expected `{kw}`")),
        }
    }

    fn take_rest(&mut self) -> &'a str {
        let rest = self.rest.trim();
        self.rest = "";
        rest
    }

    fn int(&mut self) -> Result<i32, String> {
        let word = self.word("an integer")?;
        word.parse().map_err(|_| format!("invalid integer `{word}`"))
    }

    fn score(&mut self) -> Result<ScoreRef, String> {
        let holder = self.word("a score holder")?.to_string();
        let objective = self.word("an objective")?.to_string();
        Ok(ScoreRef { holder, objective })
    }

    /// `storage <id> <path>`
    fn data(&mut self) -> Result<DataRef, String> {
        self.keyword("storage")?;
        let storage = self.word("a storage id")?.to_string();
        let path = self.word("an NBT path")?.parse()?;
        Ok(DataRef { storage, path })
    }
}

fn parse_range(s: &str) -> Result<MatchRange, String> {
    let bound = |b: &str| -> Result<Option<i32>, String> {
        if b.is_empty() {
            Ok(None)
        } else {
            b.parse()
                .map(Some)
                .map_err(|_| format!("invalid range `{s}`"))
        }
    };
    match s.split_once("..") {
        Some((min, max)) => Ok(MatchRange {
            min: bound(min)?,
            max: bound(max)?,
        }),
        None => bound(s)?
            .map(MatchRange::exactly)
            .ok_or_else(|| "empty range".to_string()),
    }
}

fn parse_command(words: &mut Words) -> Result<Command, String> {
    match words.word("a command")? {
        "scoreboard" => match words.word("`objectives` or `players`")? {
            "objectives" => {
                words.keyword("add")?;
                let name = words.word("an objective")?.to_string();
                words.word("a criterion")?;
                Ok(Command::ObjectiveAdd(name))
            }
            "players" => match words.word("a players action")? {
                "set" => Ok(Command::Set(words.score()?, words.int()?)),
                "add" => Ok(Command::Add(words.score()?, words.int()?)),
                "remove" => Ok(Command::Remove(words.score()?, words.int()?)),
                "get" => Ok(Command::Get(words.score()?)),
                "operation" => {
                    let dst = words.score()?;
                    let op = words.word("an operation")?.parse()?;
                    let src = words.score()?;
                    Ok(Command::Operation(dst, op, src))
                }
                other => Err(format!("unsupported players action `{other}`")),
            },
            other => Err(format!("unsupported scoreboard action `{other}`")),
        },
        "data" => match words.word("a data action")? {
            "modify" => {
                let target = words.data()?;
                let mode = match words.word("a modify mode")? {
                    "set" => Mode::Set,
                    "append" => Mode::Append,
                    "prepend" => Mode::Prepend,
                    other => return Err(format!("unsupported modify mode `{other}`")),
                };
                let source = match words.word("`value` or `from`")? {
                    "value" => DataSource::Value(words.take_rest().parse()?),
                    "from" => DataSource::From(words.data()?),
                    other => return Err(format!("unsupported data source `{other}`")),
                };
                Ok(Command::Modify {
                    target,
                    mode,
                    source,
                })
            }
            "remove" => Ok(Command::DataRemove(words.data()?)),
            "get" => Ok(Command::DataGet(words.data()?)),
            other => Err(format!("unsupported data action `{other}`")),
        },
        "function" => Ok(Command::Function(words.word("a function")?.to_string())),
        "execute" => parse_execute(words),
        other => Err(format!("unsupported command `{other}`")),
    }
}

fn parse_execute(words: &mut Words) -> Result<Command, String> {
    let mut subcommands = Vec::new();
    loop {
        match words.word("an execute subcommand")? {
            kw @ ("if" | "unless") => {
                let positive = kw == "if";
                let cond = match words.word("`score` or `data`")? {
                    "score" => {
                        let lhs = words.score()?;
                        match words.word("`matches` or a relation")? {
                            "matches" => Condition::Matches(lhs, parse_range(words.word("a range")?)?),
                            rel => Condition::Compare(lhs, rel.parse()?, words.score()?),
                        }
                    }
                    "data" => Condition::Data(words.data()?),
                    other => return Err(format!("unsupported condition `{other}`")),
                };
                subcommands.push(Subcommand::Test { positive, cond });
            }
            "store" => {
                words.keyword("result")?;
                match words.word("`score` or `storage`")? {
                    "score" => subcommands.push(Subcommand::StoreScore(words.score()?)),
                    "storage" => {
                        let storage = words.word("a storage id")?.to_string();
                        let path = words.word("an NBT path")?.parse()?;
                        words.keyword("int")?;
                        let scale = words.word("a scale")?;
                        let scale = scale
                            .parse()
                            .map_err(|_| format!("invalid scale `{scale}`"))?;
                        subcommands.push(Subcommand::StoreStorage {
                            target: DataRef { storage, path },
                            scale,
                        });
                    }
                    other => return Err(format!("unsupported store target `{other}`")),
                }
            }
            "run" => {
                let run = Box::new(parse_command(words)?);
                return Ok(Command::Execute { subcommands, run });
            }
            other => return Err(format!("unsupported execute subcommand `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(objective: &str) -> ScoreRef {
        ScoreRef {
            holder: "ELVM".to_string(),
            objective: objective.to_string(),
        }
    }

    #[test]
    fn scoreboard_commands() {
        assert_eq!(
            "scoreboard players operation ELVM elvm_a %= ELVM elvm_uint_max".parse::<Command>(),
            Ok(Command::Operation(score("elvm_a"), ScoreOp::Mod, score("elvm_uint_max")))
        );
        assert_eq!(
            "scoreboard players set ELVM elvm_pc -1".parse::<Command>(),
            Ok(Command::Set(score("elvm_pc"), -1))
        );
        assert_eq!(
            "scoreboard objectives add elvm_a dummy".parse::<Command>(),
            Ok(Command::ObjectiveAdd("elvm_a".to_string()))
        );
    }

    #[test]
    fn execute_chain() {
        let cmd: Command = "execute if score ELVM elvm_pc matches 3 unless score ELVM elvm_a <= ELVM elvm_b run function elvm:loop"
            .parse()
            .unwrap();
        let Command::Execute { subcommands, run } = &cmd else {
            panic!("not an execute: {cmd:?}");
        };
        assert_eq!(subcommands.len(), 2);
        assert_eq!(
            subcommands[0],
            Subcommand::Test {
                positive: true,
                cond: Condition::Matches(score("elvm_pc"), MatchRange::exactly(3))
            }
        );
        assert_eq!(
            subcommands[1],
            Subcommand::Test {
                positive: false,
                cond: Condition::Compare(score("elvm_a"), Relation::Le, score("elvm_b"))
            }
        );
        assert_eq!(**run, Command::Function("elvm:loop".to_string()));
        assert_eq!(cmd.callee(), Some("elvm:loop"));
    }

    #[test]
    fn store_into_storage() {
        let cmd: Command = "execute store result storage elvm:elvm mem[0][0].v int 1 run scoreboard players get ELVM elvm_mem_val"
            .parse()
            .unwrap();
        let Command::Execute { subcommands, .. } = cmd else {
            panic!("not an execute");
        };
        let Subcommand::StoreStorage { target, scale } = &subcommands[0] else {
            panic!("not a store");
        };
        assert_eq!(target.path.to_string(), "mem[0][0].v");
        assert_eq!(*scale, 1.0);
    }

    #[test]
    fn data_commands() {
        let cmd: Command = "data modify storage elvm:elvm mem set value [[], []]".parse().unwrap();
        let Command::Modify { mode, source, .. } = cmd else {
            panic!("not a modify");
        };
        assert_eq!(mode, Mode::Set);
        assert_eq!(source, DataSource::Value("[[],[]]".parse().unwrap()));
        assert!("data remove storage elvm:elvm mem_tmp[-1]"
            .parse::<Command>()
            .is_ok());
    }

    #[test]
    fn ranges() {
        assert_eq!(parse_range("..7"), Ok(MatchRange::at_most(7)));
        assert_eq!(parse_range("-2.."), Ok(MatchRange::at_least(-2)));
        assert_eq!(parse_range("0..511"), Ok(MatchRange::between(0, 511)));
        assert!(parse_range("x").is_err());
    }

    #[test]
    fn rejects_malformed() {
        assert!("data modify remove storage elvm:elvm mem".parse::<Command>().is_err());
        assert!("scoreboard players set elvm_a 1".parse::<Command>().is_err());
        assert!("say hi".parse::<Command>().is_err());
        assert!("function elvm:loop extra".parse::<Command>().is_err());
    }
}
