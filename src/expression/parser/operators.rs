//! Operator expression parsing
//!
//! One parser per precedence level, each folding its operands left to right except `**`,
//! which binds to the right.

use nom::{
    Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{cut, map, not, opt, value},
    error::{ErrorKind, ParseError, context},
    multi::many0,
    sequence::{pair, preceded},
};

use super::{PResult, SyntaxError, keyword, parse_primary_expr, ws};
use crate::expression::ast::{BinaryOp, Node, UnaryOp};

fn fold(first: Node, rest: Vec<(BinaryOp, Node)>) -> Node {
    rest.into_iter()
        .fold(first, |left, (op, right)| Node::binary(op, left, right))
}

/// Parse logical OR expressions
pub(super) fn parse_or_expr(input: &str) -> PResult<'_, Node> {
    map(
        (
            parse_and_expr,
            many0(pair(
                preceded(ws, value(BinaryOp::Or, alt((keyword("or"), tag("||"), tag("|"))))),
                cut(parse_and_expr),
            )),
        ),
        |(first, rest)| fold(first, rest),
    )
    .parse(input)
}

/// Parse logical AND expressions
fn parse_and_expr(input: &str) -> PResult<'_, Node> {
    map(
        (
            parse_not_expr,
            many0(pair(
                preceded(ws, value(BinaryOp::And, alt((keyword("and"), tag("&&"), tag("&"))))),
                cut(parse_not_expr),
            )),
        ),
        |(first, rest)| fold(first, rest),
    )
    .parse(input)
}

fn parse_not_expr(input: &str) -> PResult<'_, Node> {
    alt((
        map(
            preceded((ws, alt((keyword("not"), tag("~")))), cut(parse_not_expr)),
            |operand| Node::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
        ),
        parse_comparison_expr,
    ))
    .parse(input)
}

/// Parse comparison expressions. Comparisons do not chain: `1 < a < 3` is rejected.
fn parse_comparison_expr(input: &str) -> PResult<'_, Node> {
    let (input, left) = parse_additive_expr(input)?;
    let (input, tail) = opt(pair(preceded(ws, comparison_op), cut(parse_additive_expr))).parse(input)?;
    let Some((op, right)) = tail else {
        return Ok((input, left));
    };
    let (input, _) = cut(context(
        "chained comparisons are not supported; combine with 'and'",
        not(preceded(ws, comparison_op)),
    ))
    .parse(input)?;
    Ok((input, Node::binary(op, left, right)))
}

fn comparison_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::NotEq, tag("!=")),
        value(BinaryOp::LtEq, tag("<=")),
        value(BinaryOp::GtEq, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
        single_equals,
    ))
    .parse(input)
}

/// A lone `=` is always a mistake for `==`.
fn single_equals(input: &str) -> PResult<'_, BinaryOp> {
    if !input.starts_with('=') {
        return Err(nom::Err::Error(SyntaxError::from_error_kind(input, ErrorKind::Char)));
    }
    Err(nom::Err::Failure(SyntaxError::new(
        input,
        "single '=' is not an operator; use '=='",
    )))
}

/// Parse additive expressions (+, -)
fn parse_additive_expr(input: &str) -> PResult<'_, Node> {
    map(
        (
            parse_multiplicative_expr,
            many0(pair(
                preceded(
                    ws,
                    alt((value(BinaryOp::Add, char('+')), value(BinaryOp::Sub, char('-')))),
                ),
                cut(parse_multiplicative_expr),
            )),
        ),
        |(first, rest)| fold(first, rest),
    )
    .parse(input)
}

/// Parse multiplicative expressions (*, /, //, %)
fn parse_multiplicative_expr(input: &str) -> PResult<'_, Node> {
    map(
        (
            parse_unary_expr,
            many0(pair(
                preceded(
                    ws,
                    alt((
                        value(BinaryOp::FloorDiv, tag("//")),
                        value(BinaryOp::Mul, char('*')),
                        value(BinaryOp::Div, char('/')),
                        value(BinaryOp::Mod, char('%')),
                    )),
                ),
                cut(parse_unary_expr),
            )),
        ),
        |(first, rest)| fold(first, rest),
    )
    .parse(input)
}

/// Parse unary sign expressions. `-2 ** 2` is `-(2 ** 2)`.
fn parse_unary_expr(input: &str) -> PResult<'_, Node> {
    alt((
        map(preceded((ws, char('-')), cut(parse_unary_expr)), |operand| Node::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }),
        preceded((ws, char('+')), cut(parse_unary_expr)),
        parse_power_expr,
    ))
    .parse(input)
}

fn parse_power_expr(input: &str) -> PResult<'_, Node> {
    map(
        (
            parse_primary_expr,
            // The exponent may carry its own sign: 2 ** -1.
            opt(preceded((ws, tag("**")), cut(parse_unary_expr))),
        ),
        |(base, exponent)| match exponent {
            Some(exponent) => Node::binary(BinaryOp::Pow, base, exponent),
            None => base,
        },
    )
    .parse(input)
}
