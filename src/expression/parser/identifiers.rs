//! Column reference parsing
//!
//! A column can be written bare (`speed`), backtick-quoted (`` `Speed Limit` ``), bracketed
//! (`[Speed Limit]`) or `!`-marked (`!speed!`, `![Speed Limit]!`).

use nom::{
    Parser,
    branch::alt,
    bytes::complete::{take_till1, take_while, take_while1},
    character::complete::char,
    combinator::{map, recognize, verify},
    sequence::terminated,
};

use super::{KEYWORDS, PResult, SyntaxError};

/// Parse any spelling of a column reference into the bare column name.
pub(super) fn parse_column(input: &str) -> PResult<'_, String> {
    alt((
        map(enclosed('!', '!', "unterminated column reference"), clean_marked),
        map(enclosed('`', '`', "unterminated quoted name"), str::to_string),
        map(enclosed('[', ']', "unterminated bracketed name"), |name: &str| {
            name.trim().to_string()
        }),
        map(parse_identifier, str::to_string),
    ))
    .parse(input)
}

/// Parse identifiers
fn parse_identifier(input: &str) -> PResult<'_, &str> {
    verify(
        recognize((
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        |name: &str| !KEYWORDS.contains(&name),
    )
    .parse(input)
}

/// Non-empty text between `open` and `close`. Once `open` is seen the close is mandatory, and a
/// missing one is reported at the opening delimiter.
fn enclosed<'a>(
    open: char,
    close: char,
    expected: &'static str,
) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| {
        let (body, _) = char::<_, SyntaxError<'a>>(open).parse(input)?;
        terminated(take_till1(|c: char| c == close), char(close))
            .parse(body)
            .map_err(|_: nom::Err<SyntaxError<'a>>| {
                nom::Err::Failure(SyntaxError::new(input, expected))
            })
    }
}

fn clean_marked(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '[' | ']'))
        .collect::<String>()
        .trim()
        .to_string()
}
