/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Splits expression source into tokens. Stops at the first error.

use super::conversions::{hex_value, scan_decimal, scan_hex};
use super::tokens::{self, Function, OpKind, Operator, Token};
use crate::patterns;
use crate::variable::{Segment, VarName};

const E_INVALID_HEX: &str = "Invalid 2-char hex escape found";
const E_INVALID_UNICODE: &str = "Invalid unicode escape found";

pub(crate) struct Lexer<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    errors: Vec<String>,
    max_tokens: usize,
}

impl<'s> Lexer<'s> {
    pub(crate) fn new(src: &'s str, max_tokens: usize) -> Self {
        Self {
            src,
            tokens: Vec::new(),
            errors: Vec::new(),
            max_tokens,
        }
    }

    pub(crate) fn finish(self) -> (Vec<Token>, Vec<String>) {
        (self.tokens, self.errors)
    }

    pub(crate) fn tokenize(&mut self) {
        let src = self.src;
        let bytes = src.as_bytes();
        let len = src.len();
        let mut i = 0;
        while i < len && self.errors.is_empty() {
            let c0 = char_at(src, i);
            let c1 = bytes.get(i + 1).copied().unwrap_or(0);
            let c2 = bytes.get(i + 2).copied().unwrap_or(0);
            let next = match c0 {
                '0'..='9' => {
                    let result = if c0 == '0' && (c1 == b'x' || c1 == b'X') {
                        self.hex(i + 2)
                    } else {
                        self.decimal(i)
                    };
                    match result {
                        Some(end) => end,
                        None => break,
                    }
                }
                '"' | '\'' => match self.string(i + 1, c0) {
                    Some(end) => end,
                    None => break,
                },
                '*' if c1 == b'*' => self.op(&tokens::POW, i + 2),
                '*' => self.op(&tokens::MUL, i + 1),
                '/' => self.op(&tokens::DIV, i + 1),
                '%' => self.op(&tokens::MOD, i + 1),
                '+' => self.op(&tokens::ADD, i + 1),
                '-' => self.op(&tokens::SUB, i + 1),
                '=' if c1 == b'=' && c2 == b'=' => self.op(&tokens::SEQ, i + 3),
                '=' if c1 == b'=' => self.op(&tokens::EQ, i + 2),
                '=' => self.op(&tokens::ASN, i + 1),
                '!' if c1 == b'=' && c2 == b'=' => self.op(&tokens::SNEQ, i + 3),
                '!' if c1 == b'=' => self.op(&tokens::NEQ, i + 2),
                '!' => self.op(&tokens::LNOT, i + 1),
                '<' if c1 == b'<' => self.op(&tokens::SHL, i + 2),
                '<' if c1 == b'=' => self.op(&tokens::LTEQ, i + 2),
                '<' => self.op(&tokens::LT, i + 1),
                '>' if c1 == b'>' => self.op(&tokens::SHR, i + 2),
                '>' if c1 == b'=' => self.op(&tokens::GTEQ, i + 2),
                '>' => self.op(&tokens::GT, i + 1),
                '~' => self.op(&tokens::BNOT, i + 1),
                '&' if c1 == b'&' => self.op(&tokens::LAND, i + 2),
                '&' => self.op(&tokens::BAND, i + 1),
                '|' if c1 == b'|' => self.op(&tokens::LOR, i + 2),
                '|' => self.op(&tokens::BOR, i + 1),
                '^' => self.op(&tokens::BXOR, i + 1),
                ',' => self.op(&tokens::COMMA, i + 1),
                ';' => self.op(&tokens::SEMI, i + 1),
                '(' => self.op(&tokens::LPRN, i + 1),
                ')' => self.op(&tokens::RPRN, i + 1),
                ' ' | '\n' | '\t' | '\r' | '\u{a0}' => i + c0.len_utf8(),
                _ => match self.name(i) {
                    Some(end) => end,
                    None => {
                        self.errors.push(format!(
                            "Unexpected {} at {}: {}",
                            char_name(c0),
                            i,
                            c0.escape_default()
                        ));
                        break;
                    }
                },
            };
            i = next;
        }
    }

    fn op(&mut self, op: &'static Operator, next: usize) -> usize {
        self.push(Token::Operator(op));
        next
    }

    /// Variable references, constants and function names.
    fn name(&mut self, i: usize) -> Option<usize> {
        let end = patterns::VARIABLE
            .match_at(self.src, i, self.src.len())
            .filter(|end| *end > i)?;
        let name = VarName::parse(&self.src[i..end]);
        if let Some([Segment::Key(key)]) = name.segments()
            && let Some(constant) = Token::constant(key)
        {
            self.push(constant);
            return Some(end);
        }
        self.push(Token::Var(name));
        Some(end)
    }

    fn push(&mut self, token: Token) {
        if !self.errors.is_empty() {
            return;
        }
        let token = match token {
            Token::Operator(op) if matches!(op.kind, OpKind::Add | OpKind::Sub) => {
                let unary = match self.tokens.last() {
                    None => true,
                    Some(Token::Operator(top)) => top.kind != OpKind::RightParen,
                    Some(_) => false,
                };
                match (unary, op.kind) {
                    (true, OpKind::Sub) => Token::Operator(&tokens::MINUS),
                    (true, _) => Token::Operator(&tokens::PLUS),
                    _ => token,
                }
            }
            Token::Operator(op) if op.kind == OpKind::LeftParen => {
                if let Some(Token::Var(name)) = self.tokens.last()
                    && let Some([segment]) = name.segments()
                {
                    let callee = segment.to_string();
                    match Function::lookup(&callee) {
                        Some(func) => {
                            if let Some(top) = self.tokens.last_mut() {
                                *top = Token::Call(func);
                            }
                        }
                        None => {
                            self.errors.push(format!("Invalid function: {}", callee));
                            return;
                        }
                    }
                }
                token
            }
            _ => token,
        };
        self.tokens.push(token);
        if self.max_tokens > 0 && self.tokens.len() > self.max_tokens {
            self.errors.push(format!(
                "Expression exceeds the maximum number of allowed tokens: {}",
                self.max_tokens
            ));
        }
    }

    fn decimal(&mut self, i: usize) -> Option<usize> {
        match scan_decimal(self.src.as_bytes(), i, self.src.len()) {
            Ok(j) => {
                let value = self.src[i..j].parse::<f64>().unwrap_or(f64::NAN);
                self.push(Token::Number(value));
                Some(j)
            }
            Err(e) => {
                self.errors.push(e.message().to_string());
                None
            }
        }
    }

    fn hex(&mut self, i: usize) -> Option<usize> {
        let j = scan_hex(self.src.as_bytes(), i, self.src.len());
        if i == j {
            self.errors
                .push("Expected digits after start of hex number".to_string());
            return None;
        }
        self.push(Token::Number(hex_value(&self.src[i..j])));
        Some(j)
    }

    /// Decode a quoted string whose body starts at `i`.
    fn string(&mut self, mut i: usize, delim: char) -> Option<usize> {
        let src = self.src;
        let bytes = src.as_bytes();
        let len = src.len();
        let mut s = String::new();
        while i < len {
            let c = char_at(src, i);
            let j = i + c.len_utf8();
            if c == '\\' && j < len {
                let e = char_at(src, j);
                match e {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'f' => s.push('\u{0c}'),
                    'r' => s.push('\r'),
                    'x' => {
                        i += 2;
                        let lim = i + 2;
                        if lim >= len || scan_hex(bytes, i, lim) != lim {
                            self.errors.push(E_INVALID_HEX.to_string());
                            return None;
                        }
                        let code = u32::from_str_radix(&src[i..lim], 16).unwrap_or(0);
                        s.push(escaped_char(code));
                        i = lim;
                        continue;
                    }
                    'u' | 'U' => {
                        i += 2;
                        let lim = i + if e == 'u' { 4 } else { 8 };
                        if scan_hex(bytes, i, lim.min(len)) != lim {
                            self.errors.push(E_INVALID_UNICODE.to_string());
                            return None;
                        }
                        let code = u32::from_str_radix(&src[i..lim], 16).unwrap_or(u32::MAX);
                        s.push(escaped_char(code));
                        i = lim;
                        continue;
                    }
                    other => s.push(other),
                }
                i = j + e.len_utf8();
                continue;
            }
            if c == delim {
                self.push(Token::Str(s));
                return Some(j);
            }
            if c == '\n' || c == '\r' {
                self.errors.push(format!(
                    "Illegal bare {} character in string literal",
                    char_name(c)
                ));
                return None;
            }
            s.push(c);
            i = j;
        }
        self.errors.push("Unterminated string".to_string());
        None
    }
}

fn char_at(src: &str, i: usize) -> char {
    src[i..].chars().next().unwrap_or('\0')
}

/// Control characters and invalid code points decode to a space.
fn escaped_char(code: u32) -> char {
    if code <= 0x08 || (0x0e..0x20).contains(&code) {
        return ' ';
    }
    char::from_u32(code).unwrap_or(' ')
}

fn char_name(c: char) -> &'static str {
    match c {
        '\u{08}' => "backspace",
        '\u{0c}' => "form feed",
        '\n' => "line feed",
        '\r' => "carriage return",
        '\t' => "tab",
        c if (c as u32) <= 0x1f => "control character",
        _ => "character",
    }
}
