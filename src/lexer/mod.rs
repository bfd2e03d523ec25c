use crate::lexer::cursor::Cursor;
use crate::symbol::{Span, SrcOffset};

pub mod cursor;

/// A 'light' token that only carries basic and easily derivable info
#[derive(Debug)]
pub struct LToken {
    pub kind: TokenKind,
    pub len: u32,
}

impl LToken {
    pub fn new(kind: TokenKind, len: u32) -> Self {
        LToken { kind, len }
    }
}

/// Token with its location in the source.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LiteralKind {
    Hex,
    Dec,
    Str { terminated: bool },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Mnemonic, register or label reference
    Ident,
    /// Label definition, including the trailing `:`
    Label,
    Lit(LiteralKind),
    /// `.text`, `.long`, ...
    Dir,
    /// Statements end at line breaks
    Newline,
    Comment,
    /// Also includes commas
    Whitespace,
    Unknown,
    Eof,
}

/// Tokenize the whole input, stopping before `Eof`.
pub fn tokenize(input: &str) -> impl Iterator<Item = Token> + '_ {
    let mut cursor = Cursor::new(input);
    let mut offs = 0;
    std::iter::from_fn(move || {
        let token = cursor.advance_token();
        if token.kind == TokenKind::Eof {
            return None;
        }
        let span = Span::new(SrcOffset(offs), token.len as usize);
        offs += token.len as usize;
        Some(Token {
            kind: token.kind,
            span,
        })
    })
}

/// Test if a character is considered to be whitespace.
pub(crate) fn is_whitespace(c: char) -> bool {
    // Commas only separate operands
    matches!(c, ' ' | '\t' | '\r' | ',')
}

/// Test if a character can start an identifier.
pub(crate) fn is_id_start(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '_' | '$')
}

/// Test if a character can continue an identifier.
pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '$' | '.')
}

impl Cursor<'_> {
    pub fn advance_token(&mut self) -> LToken {
        let first_char = match self.bump() {
            Some(c) => c,
            None => return LToken::new(TokenKind::Eof, 0),
        };
        let token_kind = match first_char {
            '#' => {
                self.take_while(|c| c != '\n');
                TokenKind::Comment
            }
            '\n' => TokenKind::Newline,
            c if is_whitespace(c) => {
                self.take_while(is_whitespace);
                TokenKind::Whitespace
            }
            '0' if matches!(self.first(), 'x' | 'X') => {
                self.bump();
                self.take_while(|c| c.is_ascii_hexdigit());
                TokenKind::Lit(LiteralKind::Hex)
            }
            '-' if self.first().is_ascii_digit() => {
                self.take_while(|c| c.is_ascii_digit());
                TokenKind::Lit(LiteralKind::Dec)
            }
            c if c.is_ascii_digit() => {
                self.take_while(|c| c.is_ascii_digit());
                TokenKind::Lit(LiteralKind::Dec)
            }
            // Directives, or local labels like `.L0:`
            '.' => {
                self.take_while(is_id);
                self.label_or(TokenKind::Dir)
            }
            c if is_id_start(c) => {
                self.take_while(is_id);
                self.label_or(TokenKind::Ident)
            }
            '"' => {
                let terminated = self.string_body();
                TokenKind::Lit(LiteralKind::Str { terminated })
            }
            _ => TokenKind::Unknown,
        };
        let res = LToken::new(token_kind, self.pos_in_token());
        self.reset_pos();
        res
    }

    fn label_or(&mut self, kind: TokenKind) -> TokenKind {
        if self.first() == ':' {
            self.bump();
            TokenKind::Label
        } else {
            kind
        }
    }

    /// Consume up to and including the closing quote. Strings cannot span lines.
    fn string_body(&mut self) -> bool {
        loop {
            match self.first() {
                '"' => {
                    self.bump();
                    return true;
                }
                '\\' => {
                    self.bump();
                    if self.first() != '\n' {
                        self.bump();
                    }
                }
                '\n' => return false,
                _ if self.is_eof() => return false,
                _ => {
                    self.bump();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::Whitespace)
            .collect()
    }

    #[test]
    fn instruction_line() {
        use TokenKind::*;
        assert_eq!(
            kinds("main:\n  jlt done, A, -12 # loop\n"),
            vec![
                Label,
                Newline,
                Ident,
                Ident,
                Ident,
                Lit(LiteralKind::Dec),
                Comment,
                Newline
            ]
        );
    }

    #[test]
    fn directives_and_literals() {
        use TokenKind::*;
        assert_eq!(
            kinds(".data\n.L3: .long 0x1F\n.string \"a\\\"b\""),
            vec![
                Dir,
                Newline,
                Label,
                Dir,
                Lit(LiteralKind::Hex),
                Newline,
                Dir,
                Lit(LiteralKind::Str { terminated: true })
            ]
        );
    }

    #[test]
    fn unterminated_string_stops_at_newline() {
        let toks: Vec<_> = tokenize("\"abc\nexit").collect();
        assert_eq!(
            toks[0].kind,
            TokenKind::Lit(LiteralKind::Str { terminated: false })
        );
        assert_eq!(toks[0].span.len(), 4);
        assert_eq!(toks[1].kind, TokenKind::Newline);
    }

    #[test]
    fn spans_cover_source() {
        let src = "mov A, 1 ; ?";
        let toks: Vec<_> = tokenize(src).collect();
        let total: usize = toks.iter().map(|t| t.span.len()).sum();
        assert_eq!(total, src.len());
        assert_eq!(toks.last().map(|t| t.kind), Some(TokenKind::Unknown));
    }
}
