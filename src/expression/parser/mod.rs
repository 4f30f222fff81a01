//! Parser implementation for the restricted expression language
//!
//! Converts expression strings into [`Node`] trees using nom parser combinators.
//!
//! Precedence, lowest first: `or`/`|`, `and`/`&`, `not`/`~`, comparisons (not chained),
//! `+ -`, `* / // %`, unary `- +`, `**` (right associative), primary.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, multispace0, satisfy},
    combinator::{cut, map, not},
    error::{ContextError, ErrorKind, FromExternalError, ParseError, context},
    sequence::{preceded, terminated},
};

use super::ast::Node;
use crate::error::{CalcResult, FieldCalcError};

mod identifiers;
mod literals;
mod operators;

use identifiers::parse_column;
use literals::parse_literal;
use operators::parse_or_expr;

/// Words that can never name a bare column.
const KEYWORDS: &[&str] = &["and", "or", "not", "True", "False", "true", "false", "None", "null"];

pub(super) type PResult<'a, T> = IResult<&'a str, T, SyntaxError<'a>>;

/// Parse error carrying the unparsed remainder and, when known, what was expected there.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct SyntaxError<'a> {
    input: &'a str,
    expected: Option<&'static str>,
}

impl<'a> SyntaxError<'a> {
    pub(super) fn new(input: &'a str, expected: &'static str) -> Self {
        Self {
            input,
            expected: Some(expected),
        }
    }

    fn into_calc_error(self, source: &str) -> FieldCalcError {
        let message = match self.expected {
            Some(expected) => expected.to_string(),
            None if self.input.trim().is_empty() => "unexpected end of expression".to_string(),
            None => "unexpected input".to_string(),
        };
        FieldCalcError::Syntax {
            offset: source.len() - self.input.len(),
            message,
        }
    }
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self {
            input,
            expected: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a> ContextError<&'a str> for SyntaxError<'a> {
    // The innermost context is the most specific one.
    fn add_context(_input: &'a str, ctx: &'static str, other: Self) -> Self {
        Self {
            expected: other.expected.or(Some(ctx)),
            ..other
        }
    }
}

impl<'a, E> FromExternalError<&'a str, E> for SyntaxError<'a> {
    fn from_external_error(input: &'a str, kind: ErrorKind, _e: E) -> Self {
        Self::from_error_kind(input, kind)
    }
}

/// Parse a complete expression.
pub(crate) fn parse(source: &str) -> CalcResult<Node> {
    if source.trim().is_empty() {
        return Err(FieldCalcError::Syntax {
            offset: source.len(),
            message: "empty expression".to_string(),
        });
    }

    match parse_or_expr(source) {
        Ok((rest, node)) => {
            let rest = rest.trim_start();
            if rest.is_empty() {
                Ok(node)
            } else {
                Err(SyntaxError::new(rest, "unexpected trailing input").into_calc_error(source))
            }
        }
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(e.into_calc_error(source)),
        Err(nom::Err::Incomplete(_)) => Err(FieldCalcError::Syntax {
            offset: source.len(),
            message: "unexpected end of expression".to_string(),
        }),
    }
}

/// Optional whitespace.
pub(super) fn ws(input: &str) -> PResult<'_, &str> {
    multispace0(input)
}

/// A word that is not immediately followed by more identifier characters.
pub(super) fn keyword<'a>(
    word: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = SyntaxError<'a>> {
    terminated(tag(word), not(satisfy(|c: char| c.is_alphanumeric() || c == '_')))
}

/// Parse primary expressions: literals, column references and parenthesised expressions.
pub(super) fn parse_primary_expr(input: &str) -> PResult<'_, Node> {
    preceded(
        ws,
        context(
            "expected a value, a column or '('",
            alt((
                parse_paren_expr,
                map(parse_literal, Node::Literal),
                map(parse_column, Node::Column),
            )),
        ),
    )
    .parse(input)
}

fn parse_paren_expr(input: &str) -> PResult<'_, Node> {
    preceded(
        char('('),
        cut(terminated(
            parse_or_expr,
            preceded(ws, context("expected ')'", char(')'))),
        )),
    )
    .parse(input)
}
