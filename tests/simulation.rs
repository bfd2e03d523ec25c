use lodestone::ir::Cond;
use lodestone::memory::{bucket_of, BUCKETS};
use lodestone::runtime::{self, storage::Nbt};
use lodestone::{generate, CodegenOptions, Inst, MemTable, Module, Op, Register, RunOptions, RunState, Value};

use Register::*;

fn run_module(module: &Module, opts: CodegenOptions) -> RunState {
    let pack = generate(module, opts).unwrap();
    runtime::run(&pack, RunOptions::default()).unwrap()
}

fn run_src(src: &str, opts: CodegenOptions) -> RunState {
    run_module(&lodestone::parse(src).unwrap(), opts)
}

fn chunked(chunk_size: usize) -> CodegenOptions {
    CodegenOptions {
        chunk_size,
        ..Default::default()
    }
}

fn reg(r: Register) -> Value {
    Value::Reg(r)
}

fn imm(v: i32) -> Value {
    Value::Imm(v)
}

fn mov(r: Register, v: Value) -> Inst {
    Inst::new(Op::Mov).dst(reg(r)).src(v)
}

/// Scratch lists are empty and every record sits in its own bucket.
fn assert_memory_clean(state: &RunState) -> MemTable {
    assert_eq!(state.data("mem_tmp"), Some(&Nbt::List(vec![])));
    assert_eq!(state.data("bin_tmp"), Some(&Nbt::List(vec![])));
    let table = state.memory().expect("well-shaped memory");
    assert!(table.is_well_formed());
    table
}

#[test]
fn loads_adds_and_stores() {
    let module = Module::new(
        vec![
            Inst::new(Op::Load).dst(reg(A)).src(imm(2)),
            Inst::new(Op::Add).dst(reg(A)).src(imm(3)),
            Inst::new(Op::Store).dst(reg(A)).src(imm(5)),
            Inst::new(Op::Exit),
        ],
        vec![0, 0, 7],
    );
    for opts in [
        CodegenOptions::default(),
        chunked(1),
        chunked(3),
        CodegenOptions {
            literal_data: true,
            ..chunked(2)
        },
    ] {
        let state = run_module(&module, opts);
        assert!(state.halted());
        assert_eq!(state.reg(A), 10);
        let table = assert_memory_clean(&state);
        assert_eq!(table.load(5), 10);
        assert_eq!(table.load(2), 7);
        assert_eq!(table.len(), 2);
    }
}

#[test]
fn store_then_load_round_trips() {
    let src = "
        mov A, 1234
        store A, 40
        mov B, 41
        mov C, -99
        store C, B
        load D, 40
        load SP, B
        load BP, 42
        exit
    ";
    let state = run_src(src, CodegenOptions::default());
    assert_eq!(state.reg(D), 1234);
    assert_eq!(state.reg(Sp) as i32, -99);
    assert_eq!(state.reg(Bp), 0);
    assert_memory_clean(&state);
}

#[test]
fn overwrite_keeps_record_count() {
    let src = "
        mov A, 1
        store A, 7
        mov A, 2
        store A, 7
        mov B, 7
        mov A, 3
        store A, B
        load C, 7
        exit
    ";
    let state = run_src(src, CodegenOptions::default());
    assert_eq!(state.reg(C), 3);
    let table = assert_memory_clean(&state);
    assert_eq!(table.len(), 1);
}

#[test]
fn colliding_addresses_chain() {
    // An odd multiplier keeps the low five bits, so these share a bucket
    let (a, b, c) = (3, 3 + 32, 3 + 64);
    assert_eq!(bucket_of(a), bucket_of(b));
    assert_eq!(bucket_of(a), bucket_of(c));

    let src = format!(
        "
        mov A, 10
        store A, {a}
        mov A, 20
        store A, {b}
        mov A, 30
        mov D, {c}
        store A, D
        mov A, 21
        store A, {b}
        load B, {a}
        load C, {b}
        load D, {c}
        exit
    "
    );
    let state = run_src(&src, CodegenOptions::default());
    assert_eq!((state.reg(B), state.reg(C), state.reg(D)), (10, 21, 30));

    let table = assert_memory_clean(&state);
    let chain: Vec<_> = table.buckets()[bucket_of(a)]
        .iter()
        .map(|r| (r.addr, r.value))
        .collect();
    assert_eq!(chain, vec![(a, 10), (b, 21), (c, 30)]);
}

#[test]
fn accesses_leave_bucket_order_intact() {
    let mut model = MemTable::new();
    let mut text = Vec::new();
    for (i, addr) in [5, 37, 69, 6, 5, 101, 38, 1000, -4, 37].into_iter().enumerate() {
        let value = (i as i32 + 1) * 11;
        model.store(addr, value);
        text.push(mov(A, imm(value)));
        text.push(mov(B, imm(addr)));
        text.push(Inst::new(Op::Store).dst(reg(A)).src(reg(B)));
        // Loads in between must not disturb anything
        text.push(Inst::new(Op::Load).dst(reg(C)).src(imm(69)));
    }
    text.push(Inst::new(Op::Exit));

    let state = run_module(&Module::new(text, vec![]), chunked(7));
    let table = assert_memory_clean(&state);
    assert_eq!(table, model);
}

#[test]
fn negative_register_addresses_hash_like_immediates() {
    let src = "
        mov A, 77
        mov B, -5
        store A, B
        load C, -5
        mov D, -2147483648
        store A, D
        load SP, -2147483648
        exit
    ";
    let state = run_src(src, CodegenOptions::default());
    assert_eq!(state.reg(C), 77);
    assert_eq!(state.reg(Sp), 77);
    let table = assert_memory_clean(&state);
    assert_eq!(table.buckets()[bucket_of(-5)].len(), 1);
}

#[test]
fn initial_data_strategies_agree() {
    let mut data = vec![0; 200];
    for (i, word) in data.iter_mut().enumerate() {
        if i % 3 != 1 {
            *word = (i as i32) * 7 - 300;
        }
    }
    let module = Module::new(vec![Inst::new(Op::Exit)], data);
    let replayed = run_module(&module, CodegenOptions::default());
    let literal = run_module(
        &module,
        CodegenOptions {
            literal_data: true,
            ..Default::default()
        },
    );
    let replayed = assert_memory_clean(&replayed);
    assert_eq!(replayed, assert_memory_clean(&literal));
    assert_eq!(replayed.len(), module.initial_memory().count());
    assert_eq!(replayed.buckets().len(), BUCKETS);
}

#[test]
fn arithmetic_wraps_at_32_bits() {
    let src = "
        mov A, -1
        add A, 3
        mov B, 1
        sub B, 3
        mov C, 2147483647
        add C, C
        mov D, 5
        sub D, -2147483648
        exit
    ";
    let state = run_src(src, CodegenOptions::default());
    assert_eq!(state.reg(A), 2);
    assert_eq!(state.reg(B), u32::MAX - 1);
    assert_eq!(state.reg(C), u32::MAX - 1);
    assert_eq!(state.reg(D), 5u32.wrapping_add(1 << 31));
}

#[test]
fn narrow_words_reduce_after_arithmetic() {
    let opts = CodegenOptions {
        word_bits: 24,
        ..Default::default()
    };
    let src = "
        mov A, 16777215
        add A, 1
        mov B, 1
        sub B, 3
        mov C, -1
        mov D, 16777215
        add D, D
        exit
    ";
    let state = run_src(src, opts);
    assert_eq!(state.reg(A), 0);
    assert_eq!(state.reg(B), (1 << 24) - 2);
    assert_eq!(state.reg(C), (1 << 24) - 1);
    assert_eq!(state.reg(D), (1 << 24) - 2);
}

#[test]
fn every_condition_matches_its_definition() {
    let conds = [Cond::Eq, Cond::Ne, Cond::Lt, Cond::Gt, Cond::Le, Cond::Ge];
    let pairs = [
        (-3, 5),
        (5, 5),
        (9, 2),
        (0, 0),
        (-1, -2),
        (-1, 0),
        (0, -1),
        (i32::MIN, i32::MAX),
        (i32::MAX, i32::MIN),
        (i32::MIN, 1),
        (i32::MIN, i32::MIN),
    ];
    for word_bits in [32, 24] {
        let opts = CodegenOptions {
            word_bits,
            chunk_size: 4,
            ..Default::default()
        };
        for cond in conds {
            for (x, y) in pairs {
                for src in [reg(B), imm(y)] {
                    let text = vec![
                        mov(A, imm(x)),
                        mov(B, imm(y)),
                        mov(D, reg(A)),
                        Inst::new(Op::Set(cond)).dst(reg(D)).src(src),
                        Inst::new(Op::Jcc(cond)).jmp(imm(7)).dst(reg(A)).src(src),
                        mov(C, imm(1)),
                        Inst::new(Op::Exit),
                        mov(C, imm(2)),
                        Inst::new(Op::Exit),
                    ];
                    let state = run_module(&Module::new(text, vec![]), opts);
                    // Registers are unsigned words
                    let word = |v: i32| (v as u32 & opts.word_mask()) as i64;
                    let holds = cond.holds(word(x), word(y));
                    let case = format!("{cond:?} {x} {y} {src} at {word_bits} bits");
                    assert_eq!(state.reg(D), holds as u32, "{case}");
                    assert_eq!(state.reg(C), if holds { 2 } else { 1 }, "{case}");
                    assert!(state.halted());
                }
            }
        }
    }
}

#[test]
fn high_words_compare_above_small_ones() {
    let src = "
        mov A, 0
        sub A, 1
        jlt small, A, 5
        mov C, 1
        mov B, 0x80000000
        mov D, B
        gt D, 1
        exit
    small:
        mov C, 2
        exit
    ";
    let state = run_src(src, CodegenOptions::default());
    assert_eq!(state.reg(A), u32::MAX);
    assert_eq!(state.reg(C), 1);
    assert_eq!(state.reg(D), 1);
}

#[test]
fn loops_across_units() {
    let src = "
        .data
        result:
            .long 0
        .text
            mov A, 0
            mov B, 1
        loop:
            add A, B
            add B, 1
            jle loop, B, 10
            store A, result
            jmp done
            mov A, 999
        done:
            exit
    ";
    for k in [1, 2, 3, 5, 512] {
        let state = run_src(src, chunked(k));
        assert_eq!(state.reg(A), 55, "chunk size {k}");
        assert_eq!(state.reg(B), 11);
        assert!(state.halted());
        assert_eq!(state.memory().unwrap().load(0), 55);
    }
}

#[test]
fn register_jump_targets() {
    let src = "
        mov D, target
        jmp D
        mov A, 1
        exit
    target:
        mov A, 2
        mov C, skip
        jeq C, A, 2
        mov A, 3
    skip:
        exit
    ";
    let state = run_src(src, chunked(2));
    assert_eq!(state.reg(A), 2);
}

#[test]
fn exit_stops_immediately() {
    let src = "
        exit
        mov A, 1
    ";
    let state = run_src(src, CodegenOptions::default());
    assert_eq!(state.pc(), -1);
    assert_eq!(state.reg(A), 0);
}

#[test]
fn io_instructions_only_step() {
    let src = "
        putc A
        getc B
        dump
        mov C, 1
        exit
    ";
    let state = run_src(src, CodegenOptions::default());
    assert_eq!(state.reg(C), 1);
    assert_eq!(state.reg(B), 0);
}

#[test]
fn empty_program_stops_without_halting() {
    let state = run_module(&Module::default(), CodegenOptions::default());
    assert!(!state.halted());
    assert_eq!(state.pc(), 0);
}

#[test]
fn running_off_the_end_exhausts_the_budget() {
    let module = Module::new(vec![Inst::new(Op::Jmp).jmp(imm(100))], vec![]);
    let pack = generate(&module, CodegenOptions::default()).unwrap();
    let err = runtime::run(
        &pack,
        RunOptions {
            max_commands: 10_000,
            trace: false,
        },
    )
    .unwrap_err();
    assert_eq!(err.code().unwrap().to_string(), "runtime::budget");
}
