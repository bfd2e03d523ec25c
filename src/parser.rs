use std::borrow::Cow;
use std::iter::Peekable;
use std::vec::IntoIter;

use miette::Result;

use crate::{
    error,
    ir::{Cond, Inst, Module, Op, Value},
    lexer::{tokenize, LiteralKind, Token, TokenKind},
    symbol::{fx_map, FxMap, Register, Span},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Section {
    Text,
    Data,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Section::Text => ".text",
            Section::Data => ".data",
        }
    }
}

/// Operand before label resolution.
#[derive(Clone, Debug)]
enum Operand {
    Value(Value),
    Label(String, Span),
}

/// Instruction whose operands may still name labels.
#[derive(Debug)]
struct PendingInst {
    op: Op,
    dst: Option<Operand>,
    src: Option<Operand>,
    jmp: Option<Operand>,
    line: usize,
}

/// Which operands an instruction takes, in source order.
#[derive(Clone, Copy)]
enum Slot {
    /// Destination register
    Dst,
    /// Register or immediate source
    Src,
    /// Jump target
    Jmp,
}

fn lookup_op(name: &str) -> Option<(Op, &'static [Slot])> {
    use Slot::*;
    let cond = |s: &str| match s {
        "eq" => Some(Cond::Eq),
        "ne" => Some(Cond::Ne),
        "lt" => Some(Cond::Lt),
        "gt" => Some(Cond::Gt),
        "le" => Some(Cond::Le),
        "ge" => Some(Cond::Ge),
        _ => None,
    };
    let name = name.to_ascii_lowercase();
    let res: (Op, &'static [Slot]) = match name.as_str() {
        "mov" => (Op::Mov, &[Dst, Src]),
        "add" => (Op::Add, &[Dst, Src]),
        "sub" => (Op::Sub, &[Dst, Src]),
        "load" => (Op::Load, &[Dst, Src]),
        "store" => (Op::Store, &[Dst, Src]),
        "putc" => (Op::Putc, &[Src]),
        "getc" => (Op::Getc, &[Dst]),
        "exit" => (Op::Exit, &[]),
        "dump" => (Op::Dump, &[]),
        "jmp" => (Op::Jmp, &[Jmp]),
        other => {
            if let Some(c) = cond(other) {
                (Op::Set(c), &[Dst, Src])
            } else if let Some(c) = other.strip_prefix('j').and_then(cond) {
                (Op::Jcc(c), &[Jmp, Dst, Src])
            } else {
                return None;
            }
        }
    };
    Some(res)
}

/// Transforms IR text into a [`Module`].
pub struct EirParser<'a> {
    /// Reference to the source file
    src: &'a str,
    /// Tokens without whitespace or comments
    toks: Peekable<IntoIter<Token>>,
    section: Section,
    text: Vec<PendingInst>,
    data: Vec<i32>,
    /// Data words that hold a label address, resolved at the end
    data_fixups: Vec<(usize, String, Span)>,
    labels: FxMap<String, i32>,
    /// Tracker for current line
    line: usize,
}

impl<'a> EirParser<'a> {
    pub fn new(src: &'a str) -> Result<Self> {
        let mut toks = Vec::new();
        for tok in tokenize(src) {
            match tok.kind {
                TokenKind::Whitespace | TokenKind::Comment => continue,
                TokenKind::Unknown => return Err(error::lex_unknown(tok.span, src)),
                TokenKind::Lit(LiteralKind::Str { terminated: false }) => {
                    return Err(error::lex_unclosed_str(tok.span, src))
                }
                _ => toks.push(tok),
            }
        }
        Ok(EirParser {
            src,
            toks: toks.into_iter().peekable(),
            section: Section::Text,
            text: Vec::new(),
            data: Vec::new(),
            data_fixups: Vec::new(),
            labels: fx_map(),
            line: 1,
        })
    }

    fn get_span(&self, span: Span) -> &'a str {
        &self.src[span.offs()..span.end()]
    }

    /// Parse the whole source and resolve labels.
    pub fn parse(mut self) -> Result<Module> {
        while let Some(tok) = self.toks.next() {
            match tok.kind {
                TokenKind::Newline => {
                    self.line += 1;
                    continue;
                }
                TokenKind::Label => {
                    self.define_label(tok)?;
                    // A label may share its line with a statement
                    continue;
                }
                TokenKind::Dir => self.parse_dir(tok)?,
                TokenKind::Ident => self.parse_instr(tok)?,
                _ => return Err(error::parse_operand(tok.span, self.src, "a statement")),
            }
            self.expect_line_end()?;
        }

        let text = std::mem::take(&mut self.text)
            .into_iter()
            .map(|inst| self.resolve_inst(inst))
            .collect::<Result<Vec<_>>>()?;
        for (addr, name, span) in std::mem::take(&mut self.data_fixups) {
            self.data[addr] = self.resolve_label(&name, span)?;
        }
        Ok(Module::new(text, self.data))
    }

    fn define_label(&mut self, tok: Token) -> Result<()> {
        let raw = self.get_span(tok.span);
        let name = &raw[..raw.len() - 1];
        let value = match self.section {
            Section::Text => self.text.len(),
            Section::Data => self.data.len(),
        } as i32;
        if self.labels.insert(name.to_string(), value).is_some() {
            return Err(error::parse_duplicate_label(tok.span, self.src, name));
        }
        Ok(())
    }

    fn parse_dir(&mut self, tok: Token) -> Result<()> {
        let name = self.get_span(tok.span);
        match name {
            ".text" | ".data" => {
                self.section = if name == ".text" {
                    Section::Text
                } else {
                    Section::Data
                };
                // Optional subsection number
                if let Some(Token {
                    kind: TokenKind::Lit(LiteralKind::Dec),
                    ..
                }) = self.toks.peek()
                {
                    self.toks.next();
                }
                Ok(())
            }
            ".long" | ".string" if self.section != Section::Data => {
                Err(error::parse_misplaced(tok.span, self.src, self.section.name()))
            }
            ".long" => {
                match self.expect_operand(tok.span, "an integer or label")? {
                    (Operand::Value(Value::Imm(val)), _) => self.data.push(val),
                    (Operand::Label(name, span), _) => {
                        self.data_fixups.push((self.data.len(), name, span));
                        self.data.push(0);
                    }
                    (Operand::Value(Value::Reg(_)), span) => {
                        return Err(error::parse_operand(span, self.src, "an integer or label"))
                    }
                }
                Ok(())
            }
            ".string" => {
                let lit = match self.toks.next() {
                    Some(t) if t.kind == TokenKind::Lit(LiteralKind::Str { terminated: true }) => t,
                    Some(t) => return Err(error::parse_operand(t.span, self.src, "a string literal")),
                    None => {
                        return Err(error::parse_missing_operand(tok.span, self.src, "a string literal"))
                    }
                };
                let raw = self.get_span(lit.span);
                // Get rid of start and end \"
                for b in unescape(&raw[1..raw.len() - 1]).bytes() {
                    self.data.push(b as i32);
                }
                // Terminating null byte
                self.data.push(0);
                Ok(())
            }
            _ => Err(error::parse_unknown_dir(tok.span, self.src, name)),
        }
    }

    fn parse_instr(&mut self, tok: Token) -> Result<()> {
        let name = self.get_span(tok.span);
        let Some((op, slots)) = lookup_op(name) else {
            return Err(error::parse_unknown_op(tok.span, self.src, name));
        };
        if self.section != Section::Text {
            return Err(error::parse_misplaced(tok.span, self.src, self.section.name()));
        }

        let mut inst = PendingInst {
            op,
            dst: None,
            src: None,
            jmp: None,
            line: self.line,
        };
        for slot in slots {
            match slot {
                Slot::Dst => {
                    let (operand, span) = self.expect_operand(tok.span, "a destination register")?;
                    if !matches!(operand, Operand::Value(Value::Reg(_))) {
                        return Err(error::parse_operand(span, self.src, "a destination register"));
                    }
                    inst.dst = Some(operand);
                }
                Slot::Src => {
                    inst.src = Some(self.expect_operand(tok.span, "a register or immediate")?.0);
                }
                Slot::Jmp => {
                    inst.jmp = Some(self.expect_operand(tok.span, "a jump target")?.0);
                }
            }
        }
        self.text.push(inst);
        Ok(())
    }

    /// Register, literal or label. `stmt` locates the statement for missing operands.
    fn expect_operand(&mut self, stmt: Span, expected: &str) -> Result<(Operand, Span)> {
        let tok = match self.toks.peek() {
            Some(tok) if tok.kind != TokenKind::Newline => *tok,
            _ => return Err(error::parse_missing_operand(stmt, self.src, expected)),
        };
        self.toks.next();
        let raw = self.get_span(tok.span);
        let operand = match tok.kind {
            TokenKind::Ident => match raw.parse::<Register>() {
                Ok(reg) => Operand::Value(Value::Reg(reg)),
                Err(()) => Operand::Label(raw.to_string(), tok.span),
            },
            // `.L0` style label references
            TokenKind::Dir => Operand::Label(raw.to_string(), tok.span),
            TokenKind::Lit(LiteralKind::Dec) => {
                let val = raw
                    .parse::<i64>()
                    .map_err(|e| error::lex_invalid_lit(tok.span, self.src, e))?;
                Operand::Value(Value::Imm(self.fit_word(val, tok.span)?))
            }
            TokenKind::Lit(LiteralKind::Hex) => {
                let val = i64::from_str_radix(&raw[2..], 16)
                    .map_err(|e| error::lex_invalid_lit(tok.span, self.src, e))?;
                Operand::Value(Value::Imm(self.fit_word(val, tok.span)?))
            }
            _ => return Err(error::parse_operand(tok.span, self.src, expected)),
        };
        Ok((operand, tok.span))
    }

    /// Accept anything representable in 32 bits, signed or unsigned.
    fn fit_word(&self, val: i64, span: Span) -> Result<i32> {
        if (i32::MIN as i64..=u32::MAX as i64).contains(&val) {
            Ok(val as u32 as i32)
        } else {
            Err(error::lex_invalid_lit(span, self.src, "does not fit in 32 bits"))
        }
    }

    fn expect_line_end(&mut self) -> Result<()> {
        match self.toks.peek() {
            None => Ok(()),
            Some(tok) if tok.kind == TokenKind::Newline => Ok(()),
            // Labels may start the next statement on the same line
            Some(tok) => Err(error::parse_trailing(tok.span, self.src)),
        }
    }

    fn resolve_label(&self, name: &str, span: Span) -> Result<i32> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| error::parse_undefined_label(span, self.src, name))
    }

    fn resolve(&self, operand: Option<Operand>) -> Result<Option<Value>> {
        Ok(match operand {
            None => None,
            Some(Operand::Value(value)) => Some(value),
            Some(Operand::Label(name, span)) => Some(Value::Imm(self.resolve_label(&name, span)?)),
        })
    }

    fn resolve_inst(&self, inst: PendingInst) -> Result<Inst> {
        Ok(Inst {
            op: inst.op,
            dst: self.resolve(inst.dst)?,
            src: self.resolve(inst.src)?,
            jmp: self.resolve(inst.jmp)?,
            line: inst.line,
        })
    }
}

fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('0') => result.push('\0'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                // Trailing backslash; include it as is
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    Cow::Owned(result)
}
