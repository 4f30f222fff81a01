//! Directives and the three calculation strategies.
//!
//! A [`Directive`] is the validated, typed form of a JSON payload such as
//!
//! ```json
//! {"strategy": "vector", "expression": "!A! * 2"}
//! ```
//!
//! Each variant implements [`Calculation`], the single capability the dispatcher relies on:
//! compute a full column for the target field and write it into the dataset, or fail without
//! touching the dataset.
//!
//! - [`SpatialDirective`]: an ordered chain of geometry operations
//! - [`LogicDirective`]: first-match-wins conditional assignment
//! - [`VectorDirective`]: one vectorized numeric expression

pub mod logic;
pub mod registry;
pub mod spatial;
pub mod vector;

mod builtins;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{CalcResult, FieldCalcError};
use crate::expression::EvalOptions;
use crate::types::{DataSet, DataType, Field, Value, normalize_values};

pub use logic::{LogicDirective, Rule};
pub use registry::{
    ChainKind, ChainValue, Handler, MemberKind, OperationArgs, OperationRegistry, OperationSpec,
};
pub use spatial::{Operation, SpatialDirective};
pub use vector::VectorDirective;

/// The three strategy families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Geometry operation chains.
    Spatial,
    /// First-match rules (`conditional`).
    Logic,
    /// Numeric column expressions.
    Vector,
}

impl StrategyKind {
    /// Parse a directive's `strategy` tag (case-insensitive). `logic` is accepted as an alias of
    /// `conditional`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "spatial" => Some(Self::Spatial),
            "conditional" | "logic" => Some(Self::Logic),
            "vector" => Some(Self::Vector),
            _ => None,
        }
    }

    /// Canonical tag used when serializing.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Spatial => "spatial",
            Self::Logic => "conditional",
            Self::Vector => "vector",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Shared state a strategy may need while executing.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// Operations available to spatial chains.
    pub registry: &'a OperationRegistry,
    /// Expression evaluation tuning.
    pub eval: &'a EvalOptions,
}

/// What a successful calculation wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Data type of the written target column.
    pub data_type: DataType,
    /// Whether the target column became the dataset's active geometry column.
    pub geometry_repointed: bool,
}

/// A strategy that can compute one column.
pub trait Calculation {
    /// Strategy family of this calculation.
    fn kind(&self) -> StrategyKind;

    /// Compute the target column and write it into `dataset`.
    ///
    /// Implementations must not modify `dataset` unless every row was computed successfully.
    fn execute(
        &self,
        dataset: &mut DataSet,
        target_field: &str,
        ctx: &ExecutionContext<'_>,
    ) -> CalcResult<Outcome>;
}

/// A validated field calculation directive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy")]
pub enum Directive {
    #[serde(rename = "spatial")]
    Spatial(SpatialDirective),
    #[serde(rename = "conditional")]
    Logic(LogicDirective),
    #[serde(rename = "vector")]
    Vector(VectorDirective),
}

impl Directive {
    /// Validate and convert a JSON payload.
    ///
    /// - a missing or non-string `strategy` key, or a body of the wrong shape, is a
    ///   [`FieldCalcError::MalformedDirective`]
    /// - an unrecognised `strategy` tag is a [`FieldCalcError::UnknownStrategy`]
    pub fn from_json(payload: &serde_json::Value) -> CalcResult<Self> {
        let object = payload.as_object().ok_or_else(|| FieldCalcError::MalformedDirective {
            message: "directive must be a JSON object".to_string(),
        })?;
        let tag = object
            .get("strategy")
            .ok_or_else(|| FieldCalcError::MalformedDirective {
                message: "missing 'strategy' key".to_string(),
            })?
            .as_str()
            .ok_or_else(|| FieldCalcError::MalformedDirective {
                message: "'strategy' must be a string".to_string(),
            })?;
        let kind = StrategyKind::from_tag(tag).ok_or_else(|| FieldCalcError::UnknownStrategy {
            name: tag.to_string(),
        })?;

        let mut body = object.clone();
        body.remove("strategy");
        let body = serde_json::Value::Object(body);
        let directive = match kind {
            StrategyKind::Spatial => Directive::Spatial(from_body(kind, body)?),
            StrategyKind::Logic => Directive::Logic(from_body(kind, body)?),
            StrategyKind::Vector => Directive::Vector(from_body(kind, body)?),
        };
        directive.validate()?;
        Ok(directive)
    }

    /// Strategy family of the directive.
    pub fn kind(&self) -> StrategyKind {
        self.calculation().kind()
    }

    /// The strategy implementation for this directive.
    pub fn calculation(&self) -> &dyn Calculation {
        match self {
            Directive::Spatial(d) => d,
            Directive::Logic(d) => d,
            Directive::Vector(d) => d,
        }
    }

    /// Structural checks that do not need a dataset.
    pub fn validate(&self) -> CalcResult<()> {
        match self {
            Directive::Spatial(d) => d.validate(),
            Directive::Logic(d) => d.validate(),
            Directive::Vector(d) => d.validate(),
        }
    }
}

impl FromStr for Directive {
    type Err = FieldCalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload: serde_json::Value =
            serde_json::from_str(s).map_err(|e| FieldCalcError::MalformedDirective {
                message: format!("invalid JSON: {e}"),
            })?;
        Self::from_json(&payload)
    }
}

impl TryFrom<serde_json::Value> for Directive {
    type Error = FieldCalcError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

fn from_body<T: serde::de::DeserializeOwned>(
    kind: StrategyKind,
    body: serde_json::Value,
) -> CalcResult<T> {
    serde_json::from_value(body).map_err(|e| FieldCalcError::MalformedDirective {
        message: format!("invalid {kind} directive: {e}"),
    })
}

/// Infer the column type for `values` and write them as `target_field`.
pub(crate) fn write_column(
    dataset: &mut DataSet,
    target_field: &str,
    values: Vec<Value>,
) -> CalcResult<DataType> {
    let (data_type, values) = normalize_values(values);
    dataset.set_column(Field::new(target_field, data_type), values)?;
    Ok(data_type)
}
