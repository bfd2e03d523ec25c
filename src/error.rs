use std::fmt::Display;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::ir::Inst;
use crate::symbol::Span;

// Lexer errors

pub fn lex_unknown(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "operands are registers, integers or label names",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unknown token",
    )
    .with_source_code(src.to_string())
}

pub fn lex_unclosed_str(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::str_lit",
        help = "make sure to close string literals with a \" character.",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an unterminated string literal.",
    )
    .with_source_code(src.to_string())
}

pub fn lex_invalid_lit(span: Span, src: &str, e: impl Display) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::bad_lit",
        help = "values from -2,147,483,648 to 4,294,967,295 are allowed",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid literal: {e}",
    )
    .with_source_code(src.to_string())
}

// Parser errors

pub fn parse_unknown_op(span: Span, src: &str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unknown_op",
        help = "instructions are mov, add, sub, load, store, putc, getc, exit, dump, \
                eq/ne/lt/gt/le/ge, jmp and jeq/jne/jlt/jgt/jle/jge",
        labels = vec![LabeledSpan::at(span, "unknown instruction")],
        "Unknown instruction `{name}`",
    )
    .with_source_code(src.to_string())
}

pub fn parse_unknown_dir(span: Span, src: &str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::dir",
        help = "available directives are .text, .data, .long and .string",
        labels = vec![LabeledSpan::at(span, "incorrect directive")],
        "Encountered an invalid directive `{name}`.",
    )
    .with_source_code(src.to_string())
}

pub fn parse_misplaced(span: Span, src: &str, section: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::section",
        help = "instructions belong in .text, data directives in .data",
        labels = vec![LabeledSpan::at(span, "wrong section")],
        "Statement is not allowed in the {section} section",
    )
    .with_source_code(src.to_string())
}

pub fn parse_duplicate_label(span: Span, src: &str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::duplicate_label",
        help = "labels may only be defined once per file",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label `{name}`"
    )
    .with_source_code(src.to_string())
}

pub fn parse_undefined_label(span: Span, src: &str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::undefined_label",
        help = format!("define the label with `{name}:` in .text or .data"),
        labels = vec![LabeledSpan::at(span, "undefined label")],
        "Undefined label `{name}`"
    )
    .with_source_code(src.to_string())
}

pub fn parse_operand(span: Span, src: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::operand",
        help = "check the operands allowed for this instruction",
        labels = vec![LabeledSpan::at(span, "unexpected operand")],
        "Expected {expected}",
    )
    .with_source_code(src.to_string())
}

pub fn parse_missing_operand(span: Span, src: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::missing_operand",
        help = "you may be missing operands in this statement",
        labels = vec![LabeledSpan::at(span, "statement ends here")],
        "Missing operand: expected {expected}",
    )
    .with_source_code(src.to_string())
}

pub fn parse_trailing(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::trailing",
        help = "one statement per line",
        labels = vec![LabeledSpan::at(span, "unexpected token")],
        "Expected end of line",
    )
    .with_source_code(src.to_string())
}

// Code generation errors

pub fn codegen_operand(pc: usize, inst: &Inst, role: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "codegen::operand",
        help = "operands are a register or an immediate; destinations must be registers",
        "Unsupported {role} operand for `{inst}` at pc {pc} (line {}): expected {expected}",
        inst.line,
    )
}

pub fn codegen_opcode(pc: usize, inst: &Inst) -> Report {
    miette!(
        severity = Severity::Error,
        code = "codegen::opcode",
        "Unsupported opcode `{}` at pc {pc} (line {})",
        inst.op,
        inst.line,
    )
}

pub fn codegen_size(len: usize, chunk_size: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "codegen::size",
        help = "units may cover at most 2,147,483,647 program counter values",
        "{len} instructions in units of {chunk_size} do not fit the program counter",
    )
}

pub fn config_chunk_size(size: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "config::chunk_size",
        help = "use between 1 and 2,147,483,647 instructions per function",
        "Invalid chunk size {size}",
    )
}

pub fn config_word_bits(bits: u32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "config::word_bits",
        help = "word width must be between 8 and 32 bits",
        "Invalid word width {bits}",
    )
}

// Runtime errors

pub fn runtime_command(function: &str, line: usize, cmd: &str, reason: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "runtime::command",
        "Cannot execute `{cmd}` ({function}, line {line}): {reason}",
    )
}

pub fn runtime_function(name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "runtime::function",
        help = "only functions in the generated namespace can be called",
        "Unknown function `{name}`",
    )
}

pub fn runtime_budget(limit: u64) -> Report {
    miette!(
        severity = Severity::Error,
        code = "runtime::budget",
        help = "the program may never reach `exit`; raise --max-commands if it is just long",
        "Command budget of {limit} exhausted",
    )
}
