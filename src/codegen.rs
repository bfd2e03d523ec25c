use miette::Result;

use crate::dispatch::{self, Layout};
use crate::emit::{add, assign, operation, remove, set, Block, Datapack, Execute, MatchRange};
use crate::error;
use crate::init;
use crate::ir::{normalize_cond, Cond, Inst, Module, Op, Value};
use crate::memory;
use crate::symbol::{Register, Scratch};

/// Knobs of the generator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CodegenOptions {
    /// Instructions per dispatch unit
    pub chunk_size: usize,
    /// Machine word width. Scores are 32 bits wide, narrower words are
    /// reduced after every add and sub.
    pub word_bits: u32,
    /// Write initial memory as one pre-hashed literal instead of a store per word
    pub literal_data: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            chunk_size: 512,
            word_bits: 32,
            literal_data: false,
        }
    }
}

impl CodegenOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > i32::MAX as usize {
            return Err(error::config_chunk_size(self.chunk_size));
        }
        if !(8..=32).contains(&self.word_bits) {
            return Err(error::config_word_bits(self.word_bits));
        }
        Ok(())
    }

    pub fn word_mask(&self) -> u32 {
        if self.word_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.word_bits) - 1
        }
    }

    /// `2^word_bits` as a score. Truncates to 0 for full-width words, which never reduce.
    pub fn modulus(&self) -> i32 {
        (1u64 << self.word_bits) as u32 as i32
    }

    pub fn wraps_natively(&self) -> bool {
        self.word_bits >= 32
    }

    /// Truncate an immediate to the word width.
    pub fn word(&self, imm: i32) -> i32 {
        if self.wraps_natively() {
            imm
        } else {
            (imm as u32 & self.word_mask()) as i32
        }
    }

    fn word_value(&self, value: Value) -> Value {
        match value {
            Value::Imm(imm) => Value::Imm(self.word(imm)),
            reg => reg,
        }
    }
}

/// Translates a [`Module`] into a [`Datapack`].
pub struct Codegen {
    opts: CodegenOptions,
}

impl Codegen {
    pub fn new(opts: CodegenOptions) -> Self {
        Codegen { opts }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.opts
    }

    /// Functions come out as units, `loop`, `main`, then the memory routines.
    pub fn generate(&self, module: &Module) -> Result<Datapack> {
        self.opts.validate()?;
        let layout = Layout::new(module.text.len(), self.opts.chunk_size);
        if !layout.fits_scores() {
            return Err(error::codegen_size(module.text.len(), self.opts.chunk_size));
        }
        let mut pack = Datapack::new();

        dispatch::emit_units(&mut pack, &layout, &module.text, |out, pc, inst| {
            self.compile(out, pc, inst)
        })?;
        pack.insert(dispatch::dispatcher(&layout));
        pack.insert(init::initializer(module, &self.opts, &layout));
        memory::define_routines(&mut pack);

        log::debug!(
            "generated {} functions ({} commands) for {} instructions in {} units",
            pack.len(),
            pack.command_count(),
            module.text.len(),
            layout.unit_count()
        );
        Ok(pack)
    }

    /// Emit the command sequence for one instruction. Every command lands under
    /// the guard of `out`, and exactly one of them moves the program counter.
    pub fn compile(&self, out: &mut Block, pc: usize, inst: &Inst) -> Result<()> {
        log::trace!("pc {pc}: {inst}");
        let pc_obj = Register::Pc.objective();
        match inst.op {
            Op::Mov => {
                let dst = self.dst_reg(pc, inst)?;
                let src = self.src(pc, inst)?;
                out.emit(assign(dst.objective(), src));
                out.emit(add(pc_obj, 1));
            }
            Op::Add | Op::Sub => {
                let dst = self.dst_reg(pc, inst)?.objective();
                let src = self.src(pc, inst)?;
                self.emit_arith(out, inst.op == Op::Add, dst, src);
                out.emit(add(pc_obj, 1));
            }
            Op::Load => {
                let dst = self.dst_reg(pc, inst)?;
                let addr = self.src(pc, inst)?;
                memory::emit_load(out, addr);
                out.emit(operation(dst.objective(), "=", Scratch::MemRes.objective()));
                out.emit(add(pc_obj, 1));
            }
            Op::Store => {
                let value = self.operand(pc, inst, inst.dst, "destination")?;
                let addr = self.src(pc, inst)?;
                memory::emit_store(out, addr, value);
                out.emit(add(pc_obj, 1));
            }
            // No console to talk to; these only step over
            Op::Putc | Op::Getc | Op::Dump => out.emit(add(pc_obj, 1)),
            Op::Exit => out.emit(set(pc_obj, -1)),
            Op::Set(_) => {
                let dst = self.dst_reg(pc, inst)?;
                let tmp = Scratch::Tmp.objective();
                self.emit_test(out, pc, inst, &set(tmp, 0), &set(tmp, 1))?;
                out.emit(operation(dst.objective(), "=", tmp));
                out.emit(add(pc_obj, 1));
            }
            Op::Jmp => {
                let target = self.operand(pc, inst, inst.jmp, "jump")?;
                out.emit(assign(pc_obj, target));
            }
            Op::Jcc(_) => {
                let target = self.operand(pc, inst, inst.jmp, "jump")?;
                self.emit_test(out, pc, inst, &add(pc_obj, 1), &assign(pc_obj, target))?;
            }
        }
        Ok(())
    }

    fn emit_arith(&self, out: &mut Block, is_add: bool, dst: &str, src: Value) {
        match src {
            Value::Imm(imm) => {
                if self.opts.word(imm) == 0 {
                    return;
                }
                // Adding a negative is removing its magnitude
                let adding = is_add == (imm >= 0);
                let mut magnitude = imm.unsigned_abs();
                while magnitude > 0 {
                    let step = magnitude.min(i32::MAX as u32);
                    out.emit(if adding {
                        add(dst, step as i32)
                    } else {
                        remove(dst, step as i32)
                    });
                    magnitude -= step;
                }
            }
            Value::Reg(reg) => {
                out.emit(operation(dst, if is_add { "+=" } else { "-=" }, reg.objective()));
            }
        }
        if !self.opts.wraps_natively() {
            out.emit(operation(dst, "%=", Scratch::UintMax.objective()));
        }
    }

    /// Emit two commands so that exactly one of `when_false` and `when_true` runs.
    ///
    /// `ne`, `lt` and `gt` are tested as `eq`, `ge` and `le` with the outcomes
    /// swapped, since a match range expresses only those three directly.
    ///
    /// Scores compare signed. Narrow words never reach the sign bit, but full
    /// 32-bit words are ordered by biasing both sides with `i32::MIN` first.
    fn emit_test(
        &self,
        out: &mut Block,
        pc: usize,
        inst: &Inst,
        when_false: &str,
        when_true: &str,
    ) -> Result<()> {
        let cond = normalize_cond(inst.op, false).ok_or_else(|| error::codegen_opcode(pc, inst))?;
        let inverted = matches!(cond, Cond::Ne | Cond::Lt | Cond::Gt);
        let canon = if inverted { cond.negate() } else { cond };
        let mut lhs = self.dst_reg(pc, inst)?.objective();
        let mut rhs = match self.src(pc, inst)? {
            Value::Imm(imm) => Operand::Imm(imm),
            Value::Reg(reg) => Operand::Score(reg.objective()),
        };

        if canon != Cond::Eq && self.opts.wraps_natively() {
            lhs = bias(out, Scratch::CmpLhs, lhs);
            rhs = match rhs {
                Operand::Imm(imm) => Operand::Imm(imm ^ i32::MIN),
                Operand::Score(obj) => Operand::Score(bias(out, Scratch::CmpRhs, obj)),
            };
        }

        let test = |positive: bool| match rhs {
            Operand::Imm(imm) => {
                let range = match canon {
                    Cond::Le => MatchRange::at_most(imm),
                    Cond::Ge => MatchRange::at_least(imm),
                    _ => MatchRange::exactly(imm),
                };
                Execute::new().matches(positive, lhs, range)
            }
            Operand::Score(obj) => {
                let op = match canon {
                    Cond::Le => "<=",
                    Cond::Ge => ">=",
                    _ => "=",
                };
                Execute::new().compare(positive, lhs, op, obj)
            }
        };
        out.emit(test(inverted).run(when_false));
        out.emit(test(!inverted).run(when_true));
        Ok(())
    }

    fn operand(&self, pc: usize, inst: &Inst, value: Option<Value>, role: &str) -> Result<Value> {
        value
            .map(|v| self.opts.word_value(v))
            .ok_or_else(|| error::codegen_operand(pc, inst, role, "a register or an immediate"))
    }

    fn src(&self, pc: usize, inst: &Inst) -> Result<Value> {
        self.operand(pc, inst, inst.src, "source")
    }

    fn dst_reg(&self, pc: usize, inst: &Inst) -> Result<Register> {
        match inst.dst {
            Some(Value::Reg(reg)) => Ok(reg),
            _ => Err(error::codegen_operand(pc, inst, "destination", "a register")),
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Clone, Copy)]
enum Operand {
    Imm(i32),
    Score(&'static str),
}

/// Copy `objective` into `scratch` with the sign bit flipped, so that signed
/// order on the copy is unsigned order on the original.
fn bias(out: &mut Block, scratch: Scratch, objective: &str) -> &'static str {
    let biased = scratch.objective();
    out.emit(operation(biased, "=", objective));
    out.emit(operation(biased, "+=", Scratch::SignBit.objective()));
    biased
}

/// Generate with the given options.
pub fn generate(module: &Module, opts: CodegenOptions) -> Result<Datapack> {
    Codegen::new(opts).generate(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{Function, Guard};
    use test_log::test;

    fn compile_one(inst: Inst, opts: CodegenOptions) -> Result<Vec<String>> {
        let mut f = Function::new("t");
        Codegen::new(opts).compile(&mut f.guarded(Guard::pc(0)), 0, &inst)?;
        Ok(f.lines().to_vec())
    }

    fn lines(inst: Inst) -> Vec<String> {
        compile_one(inst, CodegenOptions::default()).unwrap()
    }

    fn reg(r: Register) -> Value {
        Value::Reg(r)
    }

    const PREFIX: &str = "execute if score ELVM elvm_pc matches 0 ";

    #[test]
    fn mov_advances() {
        let out = lines(Inst::new(Op::Mov).dst(reg(Register::A)).src(Value::Imm(5)));
        assert_eq!(
            out,
            vec![
                format!("{PREFIX}run scoreboard players set ELVM elvm_a 5"),
                format!("{PREFIX}run scoreboard players add ELVM elvm_pc 1"),
            ]
        );
    }

    #[test]
    fn zero_add_only_advances() {
        let out = lines(Inst::new(Op::Add).dst(reg(Register::A)).src(Value::Imm(0)));
        assert_eq!(out.len(), 1);
        assert!(out[0].ends_with("add ELVM elvm_pc 1"));
    }

    #[test]
    fn negative_immediate_flips_direction() {
        let out = lines(Inst::new(Op::Add).dst(reg(Register::B)).src(Value::Imm(-4)));
        assert!(out[0].ends_with("scoreboard players remove ELVM elvm_b 4"));
        let out = lines(Inst::new(Op::Sub).dst(reg(Register::B)).src(Value::Imm(-4)));
        assert!(out[0].ends_with("scoreboard players add ELVM elvm_b 4"));
    }

    #[test]
    fn min_immediate_splits() {
        let out = lines(Inst::new(Op::Sub).dst(reg(Register::C)).src(Value::Imm(i32::MIN)));
        assert_eq!(out.len(), 3);
        assert!(out[0].ends_with(&format!("add ELVM elvm_c {}", i32::MAX)));
        assert!(out[1].ends_with("add ELVM elvm_c 1"));
    }

    #[test]
    fn narrow_words_reduce() {
        let opts = CodegenOptions {
            word_bits: 24,
            ..Default::default()
        };
        let out = compile_one(
            Inst::new(Op::Add).dst(reg(Register::A)).src(reg(Register::B)),
            opts,
        )
        .unwrap();
        assert!(out[0].ends_with("operation ELVM elvm_a += ELVM elvm_b"));
        assert!(out[1].ends_with("operation ELVM elvm_a %= ELVM elvm_uint_max"));
        assert_eq!(opts.modulus(), 1 << 24);
        assert_eq!(opts.word(-1), 0xFF_FFFF);

        let full = lines(Inst::new(Op::Add).dst(reg(Register::A)).src(reg(Register::B)));
        assert!(full.iter().all(|l| !l.contains("%=")));
    }

    #[test]
    fn branch_canonicalizes_less_than() {
        let jlt = Inst::new(Op::Jcc(Cond::Lt))
            .jmp(Value::Imm(9))
            .dst(reg(Register::A))
            .src(Value::Imm(3));
        let out = compile_one(
            jlt.clone(),
            CodegenOptions {
                word_bits: 24,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                format!("{PREFIX}if score ELVM elvm_a matches 3.. run scoreboard players add ELVM elvm_pc 1"),
                format!("{PREFIX}unless score ELVM elvm_a matches 3.. run scoreboard players set ELVM elvm_pc 9"),
            ]
        );

        // Full words order unsigned through the biased copy
        let out = lines(jlt);
        assert_eq!(
            out,
            vec![
                format!("{PREFIX}run scoreboard players operation ELVM elvm_cmp_lhs = ELVM elvm_a"),
                format!("{PREFIX}run scoreboard players operation ELVM elvm_cmp_lhs += ELVM elvm_sign_bit"),
                format!("{PREFIX}if score ELVM elvm_cmp_lhs matches -2147483645.. run scoreboard players add ELVM elvm_pc 1"),
                format!("{PREFIX}unless score ELVM elvm_cmp_lhs matches -2147483645.. run scoreboard players set ELVM elvm_pc 9"),
            ]
        );
    }

    #[test]
    fn branch_keeps_less_equal() {
        let out = lines(
            Inst::new(Op::Jcc(Cond::Le))
                .jmp(reg(Register::C))
                .dst(reg(Register::A))
                .src(reg(Register::B)),
        );
        assert_eq!(
            out,
            vec![
                format!("{PREFIX}run scoreboard players operation ELVM elvm_cmp_lhs = ELVM elvm_a"),
                format!("{PREFIX}run scoreboard players operation ELVM elvm_cmp_lhs += ELVM elvm_sign_bit"),
                format!("{PREFIX}run scoreboard players operation ELVM elvm_cmp_rhs = ELVM elvm_b"),
                format!("{PREFIX}run scoreboard players operation ELVM elvm_cmp_rhs += ELVM elvm_sign_bit"),
                format!("{PREFIX}unless score ELVM elvm_cmp_lhs <= ELVM elvm_cmp_rhs run scoreboard players add ELVM elvm_pc 1"),
                format!("{PREFIX}if score ELVM elvm_cmp_lhs <= ELVM elvm_cmp_rhs run scoreboard players operation ELVM elvm_pc = ELVM elvm_c"),
            ]
        );
    }

    #[test]
    fn equality_needs_no_bias() {
        let out = lines(
            Inst::new(Op::Jcc(Cond::Eq))
                .jmp(Value::Imm(2))
                .dst(reg(Register::A))
                .src(reg(Register::B)),
        );
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|l| !l.contains("elvm_cmp_")));
    }

    #[test]
    fn compare_set_goes_through_tmp() {
        let out = lines(Inst::new(Op::Set(Cond::Ne)).dst(reg(Register::D)).src(Value::Imm(0)));
        assert_eq!(out.len(), 4);
        assert!(out[0].contains("if score ELVM elvm_d matches 0 run scoreboard players set ELVM elvm_tmp 0"));
        assert!(out[1].contains("unless score ELVM elvm_d matches 0 run scoreboard players set ELVM elvm_tmp 1"));
        assert!(out[2].ends_with("operation ELVM elvm_d = ELVM elvm_tmp"));
    }

    #[test]
    fn exit_halts() {
        let out = lines(Inst::new(Op::Exit));
        assert_eq!(out, vec![format!("{PREFIX}run scoreboard players set ELVM elvm_pc -1")]);
    }

    #[test]
    fn immediate_destination_is_rejected() {
        let err = compile_one(
            Inst::new(Op::Add).dst(Value::Imm(1)).src(Value::Imm(1)),
            CodegenOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "codegen::operand");
    }

    #[test]
    fn missing_jump_target_is_rejected() {
        let err = compile_one(
            Inst::new(Op::Jcc(Cond::Eq)).dst(reg(Register::A)).src(Value::Imm(1)),
            CodegenOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "codegen::operand");
    }

    #[test]
    fn options_are_validated() {
        let module = Module::default();
        let bad = CodegenOptions {
            chunk_size: 0,
            ..Default::default()
        };
        let err = generate(&module, bad).unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "config::chunk_size");
        let bad = CodegenOptions {
            chunk_size: i32::MAX as usize + 1,
            ..Default::default()
        };
        let err = generate(&module, bad).unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "config::chunk_size");
        let bad = CodegenOptions {
            word_bits: 40,
            ..Default::default()
        };
        let err = generate(&module, bad).unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "config::word_bits");
    }

    #[test]
    fn units_past_the_score_range_are_rejected() {
        let module = Module::new(vec![Inst::new(Op::Exit), Inst::new(Op::Exit)], vec![]);
        let wide = CodegenOptions {
            chunk_size: i32::MAX as usize,
            ..Default::default()
        };
        let err = generate(&module, wide).unwrap_err();
        assert_eq!(err.code().unwrap().to_string(), "codegen::size");

        let single = Module::new(vec![Inst::new(Op::Exit)], vec![]);
        let pack = generate(&single, wide).unwrap();
        assert_eq!(
            pack.get("loop").unwrap().lines()[0],
            "execute if score ELVM elvm_pc matches 0..2147483646 run function elvm:func0"
        );
    }

    #[test]
    fn function_order() {
        let module = Module::new(
            vec![
                Inst::new(Op::Mov).dst(reg(Register::A)).src(Value::Imm(1)),
                Inst::new(Op::Exit),
            ],
            vec![],
        );
        let opts = CodegenOptions {
            chunk_size: 1,
            ..Default::default()
        };
        let pack = generate(&module, opts).unwrap();
        let names: Vec<_> = pack.functions().map(|f| f.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "func0",
                "func1",
                "loop",
                "main",
                "storemem",
                "storememsh",
                "safestorebin",
                "storebin",
                "storebinsh",
                "storeval",
                "loadmem",
                "loadmemsh",
                "safeloadbin",
                "loadbin",
                "loadbinsh",
            ]
        );
    }
}
