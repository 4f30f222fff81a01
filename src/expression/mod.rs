//! Restricted expression language shared by the logic and vector strategies.
//!
//! Expressions are parsed into a small typed syntax tree before anything is evaluated. The tree
//! can only hold literals, column references and arithmetic, comparison or boolean operators,
//! so a directive can never reach anything beyond the dataset it runs against.
//!
//! ## Syntax
//!
//! - literals: `1`, `2.5`, `1e-3`, `'text'`, `"text"`, `True`/`False`, `None`
//! - column references: bare identifiers (`speed`), `` `quoted names` ``, `[bracketed names]`
//!   and `!marked names!`
//! - arithmetic: `+ - * / // % **`
//! - comparison: `== != < <= > >=`
//! - boolean: `and`/`&`, `or`/`|`, `not`/`~`
//!
//! ```rust
//! use field_calculator::expression::{EvalOptions, Expression};
//! use field_calculator::types::{DataSet, DataType, Field, Schema, Value};
//!
//! let ds = DataSet::new(
//!     Schema::new(vec![Field::new("a", DataType::Int64)]),
//!     vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
//! );
//! let expr = Expression::parse("a * 2 + 1").unwrap();
//! let out = expr.evaluate(&ds, &EvalOptions::default()).unwrap();
//! assert_eq!(out, vec![Value::Int64(3), Value::Int64(5)]);
//! ```

pub mod ast;
mod eval;
mod parser;

use std::collections::BTreeSet;

use crate::error::{CalcResult, FieldCalcError};
use crate::types::{DataSet, Value};

pub use ast::{BinaryOp, Node, UnaryOp};

/// Tuning for expression evaluation.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Columns with at least this many rows are evaluated on the rayon pool.
    pub parallel_min_rows: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            parallel_min_rows: 4_096,
        }
    }
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parse `source` into a syntax tree.
    pub fn parse(source: &str) -> CalcResult<Self> {
        let root = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The text the expression was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Root of the syntax tree.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Names of every column the expression references.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.root.columns()
    }

    /// Evaluate against every row of `dataset`, producing one value per row.
    pub fn evaluate(&self, dataset: &DataSet, options: &EvalOptions) -> CalcResult<Vec<Value>> {
        let datum = eval::Evaluator::new(dataset, &self.source, options).eval(&self.root)?;
        Ok(datum.into_values(dataset.row_count()))
    }

    /// Evaluate as a row mask. `Null` rows count as unmatched; any other non-boolean value is an
    /// error.
    pub fn evaluate_mask(&self, dataset: &DataSet, options: &EvalOptions) -> CalcResult<Vec<bool>> {
        self.evaluate(dataset, options)?
            .into_iter()
            .map(|v| match v {
                Value::Bool(b) => Ok(b),
                Value::Null => Ok(false),
                other => Err(FieldCalcError::NotBoolean {
                    found: other.kind_name(),
                }),
            })
            .collect()
    }
}
