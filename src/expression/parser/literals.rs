//! Literal value parsing
//!
//! Strings, numbers, booleans and null. Numbers are unsigned here; a leading `-` is the unary
//! negation operator.

use nom::{
    Parser,
    branch::alt,
    character::complete::{char, digit0, digit1, one_of},
    combinator::{opt, recognize, value},
    error::{ErrorKind, ParseError},
};

use super::{PResult, SyntaxError, keyword};
use crate::types::Value;

/// Parse literals
pub(super) fn parse_literal(input: &str) -> PResult<'_, Value> {
    alt((
        parse_string_literal,
        parse_number_literal,
        value(Value::Bool(true), alt((keyword("True"), keyword("true")))),
        value(Value::Bool(false), alt((keyword("False"), keyword("false")))),
        value(Value::Null, alt((keyword("None"), keyword("null")))),
    ))
    .parse(input)
}

/// Single- or double-quoted string. `\n` and `\t` are unescaped, any other escaped character
/// stands for itself.
fn parse_string_literal(input: &str) -> PResult<'_, Value> {
    let quote = match input.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return Err(nom::Err::Error(SyntaxError::from_error_kind(input, ErrorKind::Char))),
    };
    let body = &input[quote.len_utf8()..];
    let mut text = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, other)) => text.push(other),
                None => break,
            },
            c if c == quote => return Ok((&body[i + c.len_utf8()..], Value::Utf8(text))),
            c => text.push(c),
        }
    }
    Err(nom::Err::Failure(SyntaxError::new(input, "unterminated string literal")))
}

/// Integers (`42`) and floats (`2.5`, `.5`, `1.`, `1e-3`).
fn parse_number_literal(input: &str) -> PResult<'_, Value> {
    let number: PResult<'_, &str> = recognize((
        alt((
            recognize((digit1, opt((char('.'), digit0)))),
            recognize((char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input);
    let (rest, text) = number?;

    let parsed = if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().ok().map(Value::Float64)
    } else {
        text.parse::<i64>().ok().map(Value::Int64)
    };
    match parsed {
        Some(v) => Ok((rest, v)),
        None => Err(nom::Err::Failure(SyntaxError::new(input, "number literal out of range"))),
    }
}
