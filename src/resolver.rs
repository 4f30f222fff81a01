//! Column references embedded in directive arguments and expressions.
//!
//! A reference is a column name wrapped in the `!` marker on both sides (`!Speed!`). Square
//! brackets carry no meaning of their own beyond grouping compound names (`![Speed Limit]!`)
//! and are dropped when a reference is turned into a plain identifier.

use std::ops::Range;

use crate::error::{CalcResult, FieldCalcError};
use crate::types::{DataSet, DataType, Value};

/// Reference marker placed on both sides of a column name.
pub const MARKER: char = '!';

/// A `!name!` token found inside an expression string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Column name with markers and brackets removed.
    pub name: String,
    /// Byte range of the whole token (markers included) in the source text.
    pub span: Range<usize>,
}

/// A directive argument after reference resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedArg<'a> {
    /// Passed through unchanged.
    Literal(serde_json::Value),
    /// A whole-argument `!name!` reference, resolved to the column's values.
    Column { name: String, values: &'a [Value] },
}

/// If `arg` is a whole-string reference (`"!name!"`), returns the referenced column name.
pub fn parse_reference(arg: &str) -> Option<String> {
    let inner = arg.strip_prefix(MARKER)?.strip_suffix(MARKER)?;
    if inner.is_empty() || inner.contains(MARKER) {
        return None;
    }
    Some(strip_brackets(inner))
}

/// Finds every `!name!` token in `text`.
///
/// Quoted string literals are skipped, and a `!` directly followed by `=` is read as the
/// inequality operator rather than a marker.
pub fn find_references(text: &str) -> Vec<ColumnRef> {
    let mut refs = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i = skip_quoted(bytes, i, quote);
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => i += 2,
            b'!' => match text[i + 1..].find(MARKER) {
                Some(len) if len > 0 => {
                    let end = i + 1 + len;
                    refs.push(ColumnRef {
                        name: strip_brackets(&text[i + 1..end]),
                        span: i..end + 1,
                    });
                    i = end + 1;
                }
                _ => i += 1,
            },
            _ => i += 1,
        }
    }
    refs
}

/// Rewrites `text` into a plain identifier expression: reference markers and bracket
/// characters are removed. Names that are not plain identifiers are wrapped in backticks so the
/// expression parser still reads each one as a single column name.
pub fn clean_expression(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for reference in find_references(text) {
        out.push_str(&strip_bracket_chars(&text[last..reference.span.start]));
        out.push_str(&identifier_for(&reference.name));
        last = reference.span.end;
    }
    out.push_str(&strip_bracket_chars(&text[last..]));
    out
}

/// Looks up a column by name.
pub fn resolve_column<'a>(dataset: &'a DataSet, name: &str) -> CalcResult<&'a [Value]> {
    dataset.column(name).ok_or_else(|| FieldCalcError::Reference {
        column: name.to_string(),
    })
}

/// Fails with a reference error if the column is absent, or a type error if it cannot take part
/// in arithmetic (see [`DataType::is_arithmetic`]).
pub fn require_numeric(dataset: &DataSet, name: &str) -> CalcResult<DataType> {
    let field = dataset.field(name).ok_or_else(|| FieldCalcError::Reference {
        column: name.to_string(),
    })?;
    if !field.data_type.is_arithmetic() {
        return Err(FieldCalcError::Type {
            column: name.to_string(),
            found: field.data_type,
        });
    }
    Ok(field.data_type)
}

/// Resolves one directive argument: a whole-string reference becomes the column's data,
/// everything else is passed through as a literal.
pub fn resolve_argument<'a>(
    dataset: &'a DataSet,
    arg: &serde_json::Value,
) -> CalcResult<ResolvedArg<'a>> {
    if let Some(name) = arg.as_str().and_then(parse_reference) {
        let values = resolve_column(dataset, &name)?;
        return Ok(ResolvedArg::Column { name, values });
    }
    Ok(ResolvedArg::Literal(arg.clone()))
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn strip_brackets(name: &str) -> String {
    strip_bracket_chars(name).trim().to_string()
}

fn strip_bracket_chars(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '[' | ']')).collect()
}

fn identifier_for(name: &str) -> String {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("`{name}`")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Schema};

    fn dataset() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("speed", DataType::Int64),
            Field::new("label", DataType::Utf8),
        ]);
        DataSet::new(
            schema,
            vec![
                vec![Value::Int64(30), Value::Utf8("a".into())],
                vec![Value::Int64(50), Value::Utf8("b".into())],
            ],
        )
    }

    #[test]
    fn parse_reference_requires_markers_on_both_sides() {
        assert_eq!(parse_reference("!speed!"), Some("speed".to_string()));
        assert_eq!(parse_reference("![Speed Limit]!"), Some("Speed Limit".to_string()));
        assert_eq!(parse_reference("speed"), None);
        assert_eq!(parse_reference("!speed"), None);
        assert_eq!(parse_reference("!!"), None);
        assert_eq!(parse_reference("!a! + !b!"), None);
    }

    #[test]
    fn find_references_skips_inequality_and_strings() {
        let refs = find_references("!A! != 3 and label == 'x!y!' or ![B C]! > 1");
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B C"]);
        assert_eq!(refs[0].span, 0..3);
    }

    #[test]
    fn clean_expression_strips_markers_and_brackets() {
        assert_eq!(clean_expression("!A! * 2"), "A * 2");
        assert_eq!(clean_expression("![A]! / [B]"), "A / B");
        assert_eq!(clean_expression("![Speed Limit]! + 1"), "`Speed Limit` + 1");
        assert_eq!(clean_expression("!A! != !B!"), "A != B");
    }

    #[test]
    fn resolve_argument_substitutes_columns() {
        let ds = dataset();
        let arg = resolve_argument(&ds, &serde_json::json!("!speed!")).unwrap();
        match arg {
            ResolvedArg::Column { name, values } => {
                assert_eq!(name, "speed");
                assert_eq!(values, &[Value::Int64(30), Value::Int64(50)]);
            }
            other => panic!("expected column, got {other:?}"),
        }

        let literal = resolve_argument(&ds, &serde_json::json!(0.5)).unwrap();
        assert_eq!(literal, ResolvedArg::Literal(serde_json::json!(0.5)));

        let err = resolve_argument(&ds, &serde_json::json!("!missing!")).unwrap_err();
        assert!(matches!(err, FieldCalcError::Reference { column } if column == "missing"));
    }

    #[test]
    fn require_numeric_reports_type() {
        let ds = dataset();
        assert_eq!(require_numeric(&ds, "speed").unwrap(), DataType::Int64);
        assert!(matches!(
            require_numeric(&ds, "label"),
            Err(FieldCalcError::Type { found: DataType::Utf8, .. })
        ));
        assert!(matches!(
            require_numeric(&ds, "nope"),
            Err(FieldCalcError::Reference { .. })
        ));
    }
}
