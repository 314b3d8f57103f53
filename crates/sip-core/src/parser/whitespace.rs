use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    sequence::{delimited, tuple},
    IResult,
};

use crate::types::method::is_token_char;

// Type alias for parser result
pub type ParseResult<'a, O> = IResult<&'a str, O>;

fn is_wsp(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Parses optional whitespace (0 or more SP or HTAB)
pub fn owsp(input: &str) -> ParseResult<'_, &str> {
    take_while(is_wsp)(input)
}

/// Parses mandatory whitespace (1 or more SP or HTAB)
pub fn wsp1(input: &str) -> ParseResult<'_, &str> {
    take_while1(is_wsp)(input)
}

/// Parses a token (RFC 3261 Section 25.1)
pub fn token(input: &str) -> ParseResult<'_, &str> {
    take_while1(is_token_char)(input)
}

/// Parses a separator character with optional whitespace around it
pub fn separator(sep: char) -> impl FnMut(&str) -> ParseResult<'_, char> {
    move |input| delimited(owsp, char(sep), owsp)(input)
}

/// Parses `HCOLON`: optional whitespace, a colon, optional whitespace
pub fn hcolon(input: &str) -> ParseResult<'_, (&str, char, &str)> {
    tuple((owsp, char(':'), owsp))(input)
}

/// Joins continuation lines (starting with SP or HTAB) onto the line before
/// them with a single space. Accepts both CRLF and bare LF line endings.
pub fn unfold_lines(head: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in head.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        match lines.last_mut() {
            Some(previous) if line.starts_with(is_wsp) => {
                let continuation = line.trim_matches(is_wsp);
                let trimmed_len = previous.trim_end_matches(is_wsp).len();
                previous.truncate(trimmed_len);
                if !continuation.is_empty() {
                    previous.push(' ');
                    previous.push_str(continuation);
                }
            }
            _ => lines.push(line.to_string()),
        }
    }
    lines
}

/// Splits a header value on commas that are outside quoted strings and
/// angle brackets. Empty elements are dropped.
pub fn split_commas(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut angle_depth = 0usize;
    let mut start = 0;
    for (index, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => angle_depth += 1,
            '>' if !in_quotes => angle_depth = angle_depth.saturating_sub(1),
            ',' if !in_quotes && angle_depth == 0 => {
                parts.push(value[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}
