//! Column-at-a-time evaluation of the syntax tree.
//!
//! Each node produces a whole column (or a scalar that is broadcast lazily), so the tree is
//! walked once per expression rather than once per row. Elementwise kernels switch to the
//! rayon pool for large columns.

use std::borrow::Cow;
use std::cmp::Ordering;

use rayon::prelude::*;

use super::EvalOptions;
use super::ast::{BinaryOp, Node, UnaryOp};
use crate::error::{CalcResult, FieldCalcError};
use crate::resolver::resolve_column;
use crate::types::{DataSet, Value};

/// Intermediate result of a node.
pub(crate) enum Datum<'a> {
    Scalar(Value),
    Array(Cow<'a, [Value]>),
}

impl Datum<'_> {
    fn get(&self, row: usize) -> &Value {
        match self {
            Datum::Scalar(v) => v,
            Datum::Array(values) => &values[row],
        }
    }

    pub(crate) fn into_values(self, row_count: usize) -> Vec<Value> {
        match self {
            Datum::Scalar(v) => vec![v; row_count],
            Datum::Array(values) => values.into_owned(),
        }
    }
}

pub(crate) struct Evaluator<'a> {
    dataset: &'a DataSet,
    source: &'a str,
    options: &'a EvalOptions,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(dataset: &'a DataSet, source: &'a str, options: &'a EvalOptions) -> Self {
        Self {
            dataset,
            source,
            options,
        }
    }

    pub(crate) fn eval(&self, node: &Node) -> CalcResult<Datum<'a>> {
        match node {
            Node::Literal(v) => Ok(Datum::Scalar(v.clone())),
            Node::Column(name) => Ok(Datum::Array(Cow::Borrowed(resolve_column(
                self.dataset,
                name,
            )?))),
            Node::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                match operand {
                    Datum::Scalar(v) => Ok(Datum::Scalar(unary(*op, &v)?)),
                    Datum::Array(values) => {
                        let out = self.map_rows(values.len(), |i| unary(*op, &values[i]))?;
                        Ok(Datum::Array(Cow::Owned(out)))
                    }
                }
            }
            Node::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let rows = match (&left, &right) {
                    (Datum::Scalar(l), Datum::Scalar(r)) => {
                        return Ok(Datum::Scalar(binary(*op, l, r, self.source)?));
                    }
                    (Datum::Array(values), _) | (_, Datum::Array(values)) => values.len(),
                };
                let out = self.map_rows(rows, |i| {
                    binary(*op, left.get(i), right.get(i), self.source)
                })?;
                Ok(Datum::Array(Cow::Owned(out)))
            }
        }
    }

    fn map_rows<F>(&self, rows: usize, kernel: F) -> CalcResult<Vec<Value>>
    where
        F: Fn(usize) -> CalcResult<Value> + Send + Sync,
    {
        if rows >= self.options.parallel_min_rows {
            let cells: Vec<CalcResult<Value>> = (0..rows).into_par_iter().map(kernel).collect();
            // The lowest failing row is reported, whichever thread hit it first.
            cells.into_iter().collect()
        } else {
            (0..rows).map(kernel).collect()
        }
    }
}

fn unary(op: UnaryOp, value: &Value) -> CalcResult<Value> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Neg, Value::Int64(v)) => v.checked_neg().map(Value::Int64).ok_or_else(|| {
            FieldCalcError::Arithmetic {
                message: format!("integer overflow negating {v}"),
            }
        }),
        (UnaryOp::Neg, Value::Float64(v)) => Ok(Value::Float64(-v)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int64(-i64::from(*b))),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, other) => Err(FieldCalcError::UnaryOperand {
            op: op.symbol(),
            operand: other.kind_name(),
        }),
    }
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value, source: &str) -> CalcResult<Value> {
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let l = truthy(op, left, right)?;
            let r = truthy(op, right, left)?;
            Ok(Value::Bool(if op == BinaryOp::And { l && r } else { l || r }))
        }
        BinaryOp::Eq | BinaryOp::NotEq => {
            let equal = match (left, right) {
                (Value::Null, _) | (_, Value::Null) => false,
                _ => match compare(left, right) {
                    Some(ord) => ord == Ordering::Equal,
                    None => left == right,
                },
            };
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Bool(false));
            }
            if !orderable(left, right) {
                return Err(operand_error(op, left, right));
            }
            let result = match compare(left, right) {
                None => false,
                Some(ord) => match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::LtEq => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
            };
            Ok(Value::Bool(result))
        }
        _ => arithmetic(op, left, right, source),
    }
}

fn truthy(op: BinaryOp, value: &Value, other: &Value) -> CalcResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        _ => Err(operand_error(op, value, other)),
    }
}

fn orderable(left: &Value, right: &Value) -> bool {
    matches!(
        (left, right),
        (Value::Int64(_) | Value::Float64(_), Value::Int64(_) | Value::Float64(_))
            | (Value::Utf8(_), Value::Utf8(_))
            | (Value::Bool(_), Value::Bool(_))
    )
}

/// Ordering for comparable pairs; `None` for incomparable kinds or NaN.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
        (Value::Utf8(a), Value::Utf8(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

/// Booleans take part in arithmetic as `0`/`1`.
fn as_arithmetic(value: &Value) -> Cow<'_, Value> {
    match value {
        Value::Bool(b) => Cow::Owned(Value::Int64(i64::from(*b))),
        other => Cow::Borrowed(other),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value, source: &str) -> CalcResult<Value> {
    let promotes = matches!(
        (left, right),
        (Value::Bool(_), Value::Bool(_) | Value::Int64(_) | Value::Float64(_))
            | (Value::Int64(_) | Value::Float64(_), Value::Bool(_))
    );
    if promotes {
        return arithmetic(op, &as_arithmetic(left), &as_arithmetic(right), source);
    }
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int64(a), Value::Int64(b)) => int_arithmetic(op, *a, *b, source),
        (Value::Int64(_) | Value::Float64(_), Value::Int64(_) | Value::Float64(_)) => {
            let (a, b) = (left.as_f64().unwrap_or(f64::NAN), right.as_f64().unwrap_or(f64::NAN));
            float_arithmetic(op, a, b, source)
        }
        (Value::Utf8(a), Value::Utf8(b)) if op == BinaryOp::Add => Ok(Value::Utf8(format!("{a}{b}"))),
        _ => Err(operand_error(op, left, right)),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64, source: &str) -> CalcResult<Value> {
    if b == 0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) {
        return Err(division_by_zero(source));
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => return Ok(Value::Float64(a as f64 / b as f64)),
        BinaryOp::FloorDiv => a.checked_div(b).map(|q| {
            if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
        }),
        BinaryOp::Mod => a
            .checked_rem(b)
            .map(|m| if m != 0 && ((m < 0) != (b < 0)) { m + b } else { m }),
        BinaryOp::Pow => match u32::try_from(b) {
            Ok(exp) => a.checked_pow(exp),
            Err(_) if a == 0 => return Err(division_by_zero(source)),
            Err(_) => return Ok(Value::Float64((a as f64).powf(b as f64))),
        },
        _ => unreachable!("non-arithmetic operators are handled by binary()"),
    };
    result.map(Value::Int64).ok_or_else(|| FieldCalcError::Arithmetic {
        message: format!("integer overflow evaluating {a} {} {b}", op.symbol()),
    })
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64, source: &str) -> CalcResult<Value> {
    if b == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) {
        return Err(division_by_zero(source));
    }
    // Zero to a negative power divides by zero.
    if op == BinaryOp::Pow && a == 0.0 && b < 0.0 {
        return Err(division_by_zero(source));
    }
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
        _ => unreachable!("non-arithmetic operators are handled by binary()"),
    };
    Ok(Value::Float64(result))
}

fn division_by_zero(source: &str) -> FieldCalcError {
    FieldCalcError::DivisionByZero {
        expression: source.to_string(),
    }
}

fn operand_error(op: BinaryOp, left: &Value, right: &Value) -> FieldCalcError {
    FieldCalcError::OperandType {
        op: op.symbol(),
        left: left.kind_name(),
        right: right.kind_name(),
    }
}
