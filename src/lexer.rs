//! Tokenizer: turns the raw source bytes into a flat token stream.
//!
//! Tokens keep their byte span into the source so every later stage can
//! render a caret diagnostic from a token alone.

use anyhow::Result;

use crate::ty::{TypeId, Types};
use crate::SourceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Keyword or punctuation.
    Reserved,
    Ident,
    Str,
    Num,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first byte of the token in the source.
    pub pos: usize,
    /// Byte length of the original span, quotes and escapes included.
    pub len: usize,
    /// Value of a `Num` token.
    pub val: i64,
    /// Literal type of a `Num` token (int unless the value or a suffix
    /// forces long).
    pub ty: Option<TypeId>,
    /// Decoded payload of a `Str` token, including the trailing NUL.
    pub contents: Vec<u8>,
}

impl Token {
    fn new(kind: TokenKind, pos: usize, len: usize) -> Self {
        Token {
            kind,
            pos,
            len,
            val: 0,
            ty: None,
            contents: Vec::new(),
        }
    }

    /// The original text of the token.
    pub fn text<'a>(&self, src: &'a SourceFile) -> &'a [u8] {
        &src.src[self.pos..self.pos + self.len]
    }
}

/// Keywords, tried before identifiers so that `returnx` stays an identifier
/// while `return` does not.
const KEYWORDS: &[&str] = &[
    "return", "if", "else", "while", "for", "int", "char", "sizeof", "struct",
    "typedef", "short", "long", "void", "_Bool", "enum", "static", "break",
    "continue", "goto", "switch", "case", "default", "extern", "_Alignof",
    "do", "signed",
];

/// Multi-byte operators, longest first within each length class. Table order
/// is match order.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "...", "==", "!=", "<=", ">=", "->", "++", "--", "<<", ">>",
    "+=", "-=", "*=", "/=", "&&", "||", "&=", "|=", "^=",
];

const MAX_STRING_LEN: usize = 1024;

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_cont(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn unescape(c: u8) -> u8 {
    match c {
        b'a' => 0x07,
        b'b' => 0x08,
        b't' => b'\t',
        b'n' => b'\n',
        b'v' => 0x0b,
        b'f' => 0x0c,
        b'r' => b'\r',
        b'e' => 0x1b,
        b'0' => 0,
        _ => c,
    }
}

/// Tokenize the whole source. The returned stream always ends with a single
/// `Eof` token.
pub fn tokenize(src: &SourceFile) -> Result<Vec<Token>> {
    Lexer { src, pos: 0 }.run()
}

struct Lexer<'a> {
    src: &'a SourceFile,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek_byte(0) {
            if c.is_ascii_whitespace() {
                self.pos += 1;
                continue;
            }

            if self.starts_with("//") {
                self.pos += 2;
                while !matches!(self.peek_byte(0), None | Some(b'\n')) {
                    self.pos += 1;
                }
                continue;
            }

            if self.starts_with("/*") {
                self.skip_block_comment()?;
                continue;
            }

            if c == b'"' {
                tokens.push(self.read_string_literal()?);
                continue;
            }

            if c == b'\'' {
                tokens.push(self.read_char_literal()?);
                continue;
            }

            if let Some(len) = self.match_reserved() {
                tokens.push(Token::new(TokenKind::Reserved, self.pos, len));
                self.pos += len;
                continue;
            }

            if is_ident_start(c) {
                let start = self.pos;
                self.pos += 1;
                while self.peek_byte(0).is_some_and(is_ident_cont) {
                    self.pos += 1;
                }
                tokens.push(Token::new(
                    TokenKind::Ident,
                    start,
                    self.pos - start,
                ));
                continue;
            }

            if c.is_ascii_digit() {
                tokens.push(self.read_int_literal()?);
                continue;
            }

            if c.is_ascii_punctuation() {
                tokens.push(Token::new(TokenKind::Reserved, self.pos, 1));
                self.pos += 1;
                continue;
            }

            return Err(self.src.error_at(self.pos, "invalid token"));
        }

        tokens.push(Token::new(TokenKind::Eof, self.pos, 0));
        Ok(tokens)
    }

    fn peek_byte(&self, ahead: usize) -> Option<u8> {
        self.src.src.get(self.pos + ahead).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src.src[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        let start = self.pos;
        self.pos += 2;
        loop {
            if self.pos >= self.src.src.len() {
                return Err(self.src.error_at(start, "unclosed block comment"));
            }
            if self.starts_with("*/") {
                self.pos += 2;
                return Ok(());
            }
            self.pos += 1;
        }
    }

    /// Longest keyword (only when not followed by an identifier byte), then
    /// multi-byte operator.
    fn match_reserved(&self) -> Option<usize> {
        for kw in KEYWORDS {
            if self.starts_with(kw)
                && !self
                    .peek_byte(kw.len())
                    .is_some_and(is_ident_cont)
            {
                return Some(kw.len());
            }
        }
        OPERATORS
            .iter()
            .find(|op| self.starts_with(op))
            .map(|op| op.len())
    }

    fn read_string_literal(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut p = start + 1;
        let mut buf = Vec::new();

        loop {
            if buf.len() == MAX_STRING_LEN {
                return Err(self.src.error_at(start, "string literal too large"));
            }
            let c = match self.src.src.get(p) {
                None | Some(&0) => {
                    return Err(
                        self.src.error_at(start, "unclosed string literal")
                    )
                }
                Some(&c) => c,
            };
            if c == b'"' {
                break;
            }
            if c == b'\\' {
                p += 1;
                let esc = match self.src.src.get(p) {
                    None => {
                        return Err(
                            self.src.error_at(start, "unclosed string literal")
                        )
                    }
                    Some(&c) => c,
                };
                buf.push(unescape(esc));
            } else {
                buf.push(c);
            }
            p += 1;
        }

        let mut tok = Token::new(TokenKind::Str, start, p - start + 1);
        buf.push(0);
        tok.contents = buf;
        self.pos = start + tok.len;
        Ok(tok)
    }

    fn read_char_literal(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut p = start + 1;

        let c = match self.src.src.get(p) {
            None | Some(&0) => {
                return Err(self.src.error_at(start, "unclosed char literal"))
            }
            Some(&b'\\') => {
                p += 1;
                match self.src.src.get(p) {
                    None => {
                        return Err(
                            self.src.error_at(start, "unclosed char literal")
                        )
                    }
                    Some(&c) => unescape(c),
                }
            }
            Some(&c) => c,
        };
        p += 1;

        if self.src.src.get(p) != Some(&b'\'') {
            return Err(self.src.error_at(start, "char literal too long"));
        }
        p += 1;

        let mut tok = Token::new(TokenKind::Num, start, p - start);
        tok.val = c as i8 as i64;
        tok.ty = Some(Types::INT);
        self.pos = start + tok.len;
        Ok(tok)
    }

    fn read_int_literal(&mut self) -> Result<Token> {
        let bytes = &self.src.src;
        let start = self.pos;
        let mut p = start;

        let next_is_alnum = |at: usize| bytes.get(at).copied().is_some_and(is_ident_cont);
        let base = if bytes[p] == b'0'
            && bytes.get(p + 1).map(|c| c | 0x20) == Some(b'x')
            && next_is_alnum(p + 2)
        {
            p += 2;
            16u32
        } else if bytes[p] == b'0'
            && bytes.get(p + 1).map(|c| c | 0x20) == Some(b'b')
            && next_is_alnum(p + 2)
        {
            p += 2;
            2
        } else if bytes[p] == b'0' {
            8
        } else {
            10
        };

        let digits_start = p;
        while bytes
            .get(p)
            .copied()
            .is_some_and(|c| (c as char).is_digit(base))
        {
            p += 1;
        }
        let digits = &bytes[digits_start..p];
        let val = if digits.is_empty() {
            0
        } else {
            // Saturate on overflow, like strtol.
            i128::from_str_radix(std::str::from_utf8(digits).unwrap_or("0"), base)
                .unwrap_or(i128::MAX)
                .clamp(i64::MIN as i128, i64::MAX as i128) as i64
        };

        let mut ty = Types::INT;
        if bytes[p..].starts_with(b"LL") || bytes[p..].starts_with(b"ll") {
            p += 2;
            ty = Types::LONG;
        } else if matches!(bytes.get(p).copied(), Some(b'L') | Some(b'l')) {
            p += 1;
            ty = Types::LONG;
        } else if val != val as i32 as i64 {
            ty = Types::LONG;
        }

        if bytes.get(p).copied().is_some_and(is_ident_cont) {
            return Err(self.src.error_at(p, "invalid digit"));
        }

        let mut tok = Token::new(TokenKind::Num, start, p - start);
        tok.val = val;
        tok.ty = Some(ty);
        self.pos = start + tok.len;
        Ok(tok)
    }
}
