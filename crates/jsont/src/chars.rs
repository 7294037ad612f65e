/*
 * chars.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! ASCII character classification.
//!
//! Each ASCII code point maps to a bitmask of the classes it belongs to.
//! Anything at or above U+00A0 classifies as [`NONASCII`]; the C1 control
//! range in between belongs to no class.

pub const NONE: u16 = 0;
pub const DIGIT: u16 = 1 << 0;
pub const LOWERCASE: u16 = 1 << 1;
pub const UPPERCASE: u16 = 1 << 2;
pub const NONASCII: u16 = 1 << 3;
pub const NONPRINTABLE: u16 = 1 << 4;
pub const HEXDIGIT: u16 = 1 << 5;
pub const NUMBER_SIGN: u16 = 1 << 6;
pub const URI_RESERVED: u16 = 1 << 7;
pub const URI_MARK: u16 = 1 << 8;
pub const ESCAPE_SYMS: u16 = 1 << 9;
pub const DASH: u16 = 1 << 10;
pub const UNDERSCORE: u16 = 1 << 11;

const LIMIT: usize = 0x80;

static CLASSES: [u16; LIMIT] = build_table();

const fn class_of(c: u8) -> u16 {
    match c {
        0x00..=0x08 | 0x0E..=0x1F => NONPRINTABLE,
        b'0'..=b'9' => DIGIT | HEXDIGIT,
        b'a'..=b'f' => LOWERCASE | HEXDIGIT,
        b'g'..=b'z' => LOWERCASE,
        b'A'..=b'F' => UPPERCASE | HEXDIGIT,
        b'G'..=b'Z' => UPPERCASE,
        b'!' | b'\'' | b'(' | b')' | b'~' => URI_MARK,
        b'#' => NUMBER_SIGN,
        b'$' | b'&' | b',' | b':' | b';' | b'=' | b'?' => URI_RESERVED,
        b'*' | b'.' => ESCAPE_SYMS | URI_MARK,
        b'+' | b'/' | b'@' => ESCAPE_SYMS | URI_RESERVED,
        b'-' => DASH | ESCAPE_SYMS | URI_MARK,
        b'_' => UNDERSCORE | ESCAPE_SYMS | URI_MARK,
        _ => NONE,
    }
}

const fn build_table() -> [u16; LIMIT] {
    let mut table = [NONE; LIMIT];
    let mut i = 0;
    while i < LIMIT {
        table[i] = class_of(i as u8);
        i += 1;
    }
    table
}

/// Returns true if `ch` belongs to any of the classes in `mask`.
pub fn is_member(ch: char, mask: u16) -> bool {
    let code = ch as usize;
    code < LIMIT && CLASSES[code] & mask != 0
}

/// Returns the full class bitmask for a character.
pub fn classify(ch: char) -> u16 {
    let code = ch as usize;
    if code < LIMIT {
        CLASSES[code]
    } else if code >= 0xA0 {
        NONASCII
    } else {
        NONE
    }
}

/// All ASCII characters belonging to any class in `mask`, in ascending order.
pub fn members_of(mask: u16) -> String {
    (0..LIMIT as u8)
        .filter(|c| CLASSES[*c as usize] & mask != 0)
        .map(char::from)
        .collect()
}

/// JavaScript whitespace, matching the V8 ranges.
pub fn is_whitespace(ch: char) -> bool {
    matches!(
        ch,
        ' ' | '\t'..='\r'
            | '\u{a0}'
            | '\u{1680}'
            | '\u{180e}'
            | '\u{2000}'..='\u{200a}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202f}'
            | '\u{205f}'
            | '\u{3000}'
            | '\u{feff}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_of() {
        assert_eq!(members_of(DIGIT), "0123456789");
        assert_eq!(members_of(HEXDIGIT), "0123456789ABCDEFabcdef");
        assert_eq!(members_of(URI_MARK), "!'()*-._~");
        assert_eq!(members_of(URI_RESERVED), "$&+,/:;=?@");
        assert_eq!(members_of(DASH | UNDERSCORE), "-_");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify('a'), LOWERCASE | HEXDIGIT);
        assert_eq!(classify('#'), NUMBER_SIGN);
        assert_eq!(classify('\u{2603}'), NONASCII);
        assert_eq!(classify('\u{85}'), NONE);
        assert!(is_member('\u{1}', NONPRINTABLE));
        assert!(!is_member('\u{e9}', LOWERCASE));
    }

    #[test]
    fn test_whitespace() {
        for ch in [' ', '\t', '\n', '\r', '\u{a0}', '\u{3000}'] {
            assert!(is_whitespace(ch), "{:?}", ch);
        }
        assert!(!is_whitespace('x'));
    }
}
