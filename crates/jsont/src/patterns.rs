/*
 * patterns.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Token patterns of the template grammar, built from recognizers.

use once_cell::sync::Lazy;

use crate::chars::{LOWERCASE, UPPERCASE};
use crate::recognizers::{
    BoxedRecognizer, char_class, characters, choice, digits, literal, not_characters,
    one_or_more, sequence, worddash, zero_or_more, zero_or_one,
};

pub const META_LEFT: u8 = b'{';
pub const META_RIGHT: u8 = b'}';
pub const NEWLINE: u8 = b'\n';
pub const POUND: u8 = b'#';

/// Template whitespace is ASCII only.
const SPACE_CHARS: &str = " \t\n\u{b}\u{c}\r";

/// `[a-zA-Z][a-zA-Z0-9_-]*`
fn word() -> BoxedRecognizer {
    sequence(vec![
        char_class(LOWERCASE | UPPERCASE),
        zero_or_more(worddash()),
    ])
}

fn word_or_digits() -> BoxedRecognizer {
    choice(vec![word(), digits()])
}

/// `(WORD|\d+)(\.(WORD|\d+))*`
fn dotword() -> BoxedRecognizer {
    sequence(vec![
        word_or_digits(),
        zero_or_more(sequence(vec![literal("."), word_or_digits()])),
    ])
}

fn spaces() -> BoxedRecognizer {
    zero_or_more(characters(SPACE_CHARS))
}

pub static ARGUMENTS: Lazy<BoxedRecognizer> = Lazy::new(|| one_or_more(not_characters("|}")));

pub static BOOLEAN_OP: Lazy<BoxedRecognizer> =
    Lazy::new(|| choice(vec![literal("&&"), literal("||")]));

pub static EQUAL_SIGN: Lazy<BoxedRecognizer> = Lazy::new(|| literal("="));

pub static FORMATTER: Lazy<BoxedRecognizer> = Lazy::new(word);

/// Instructions and predicates in their dot-prefixed form.
pub static KEYWORD: Lazy<BoxedRecognizer> = Lazy::new(|| {
    sequence(vec![
        literal("."),
        word(),
        zero_or_one(literal("?")),
    ])
});

pub static LOCAL_VARIABLE: Lazy<BoxedRecognizer> =
    Lazy::new(|| sequence(vec![literal("@"), word()]));

pub static PATH: Lazy<BoxedRecognizer> =
    Lazy::new(|| one_or_more(choice(vec![characters("./"), worddash()])));

pub static PREDICATE: Lazy<BoxedRecognizer> =
    Lazy::new(|| sequence(vec![word(), literal("?")]));

pub static PREDICATE_ARGUMENTS: Lazy<BoxedRecognizer> =
    Lazy::new(|| one_or_more(not_characters("}")));

pub static VARIABLE: Lazy<BoxedRecognizer> = Lazy::new(|| {
    choice(vec![
        sequence(vec![zero_or_more(literal("@")), dotword()]),
        literal("@"),
    ])
});

pub static VARIABLES_DELIMITER: Lazy<BoxedRecognizer> =
    Lazy::new(|| sequence(vec![spaces(), literal(","), spaces()]));

pub static WHITESPACE: Lazy<BoxedRecognizer> = Lazy::new(|| one_or_more(characters(SPACE_CHARS)));

pub static WORD: Lazy<BoxedRecognizer> = Lazy::new(word);

pub static WORD_SECTION: Lazy<BoxedRecognizer> = Lazy::new(|| literal("section"));

pub static WORD_WITH: Lazy<BoxedRecognizer> = Lazy::new(|| literal("with"));
