/*
 * escape.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Text escaping and encoding helpers used by the core formatters.

use once_cell::sync::Lazy;
use regex::Regex;

static SLUG_KILLCHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s-]+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static ONE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s").unwrap());
static SCRIPT_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(script)").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*?>").unwrap());

static OPEN_SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("(^|[-\u{2014}\\s(\\[\"])'").unwrap());
static OPEN_DOUBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("(^|[-\u{2014}/\\[(\u{2018}\\s])\"").unwrap());

/// Escape `&`, `<` and `>`.
pub fn escape_html(text: &str, buf: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            _ => buf.push(ch),
        }
    }
}

/// Escape for use inside a quoted attribute. Template delimiters are escaped
/// too so the output can't be re-parsed as template code.
pub fn escape_html_attribute(text: &str, buf: &mut String) {
    for ch in text.chars() {
        match ch {
            '{' => buf.push_str("&#123;"),
            '}' => buf.push_str("&#125;"),
            '|' => buf.push_str("&#124;"),
            '>' => buf.push_str("&gt;"),
            '<' => buf.push_str("&lt;"),
            '"' => buf.push_str("&quot;"),
            '&' => buf.push_str("&amp;"),
            _ => buf.push(ch),
        }
    }
}

/// Break up closing script tags so JSON can be embedded in a `<script>`.
pub fn escape_script_tags(text: &str) -> String {
    SCRIPT_CLOSE.replace_all(text, r"<\/$1").into_owned()
}

/// Replace each whitespace character with `&nbsp;`.
pub fn encode_space(text: &str) -> String {
    ONE_SPACE.replace_all(text, "&nbsp;").into_owned()
}

pub fn strip_tags(text: &str) -> String {
    TAG.replace_all(text, "").into_owned()
}

pub fn slugify(text: &str) -> String {
    let text = SLUG_KILLCHARS.replace_all(text, "");
    WHITESPACE.replace_all(&text, "-").to_lowercase()
}

/// Curly quotes and em-dashes.
pub fn smartypants(text: &str) -> String {
    let text = OPEN_SINGLE.replace_all(text, "${1}\u{2018}");
    let text = text.replace('\'', "\u{2019}");
    let text = OPEN_DOUBLE.replace_all(&text, "${1}\u{201c}");
    let text = text.replace('"', "\u{201d}");
    text.replace("--", "\u{2014}")
}

/// Cut `text` to at most `max_len` characters, backing up to just after the
/// last whitespace when there is one, and append `ellipses`.
pub fn truncate(text: &str, max_len: usize, ellipses: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text.to_string();
    }
    let end = chars[..max_len]
        .iter()
        .rposition(|c| c.is_whitespace())
        .map(|i| i + 1)
        .unwrap_or(max_len);
    let mut out: String = chars[..end].iter().collect();
    out.push_str(ellipses);
    out
}

/// Same character set as JavaScript's `encodeURI`.
pub fn encode_uri(text: &str) -> String {
    percent_encode(text, |c| is_uri_unreserved(c) || ";/?:@&=+$,#".contains(c))
}

/// Same character set as JavaScript's `encodeURIComponent`.
pub fn encode_uri_component(text: &str) -> String {
    percent_encode(text, is_uri_unreserved)
}

/// Form encoding: spaces become `+`.
pub fn url_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            ' ' => out.push('+'),
            c if c.is_ascii_alphanumeric() || ".-*_".contains(c) => out.push(c),
            c => push_escaped(c, &mut out),
        }
    }
    out
}

fn is_uri_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()".contains(c)
}

fn percent_encode(text: &str, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if keep(ch) {
            out.push(ch);
        } else {
            push_escaped(ch, &mut out);
        }
    }
    out
}

fn push_escaped(ch: char, out: &mut String) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut bytes = [0u8; 4];
    for b in ch.encode_utf8(&mut bytes).bytes() {
        out.push('%');
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0xf) as usize] as char);
    }
}
