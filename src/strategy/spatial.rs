//! Chained geometry operations starting from the dataset's active geometry column.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{Calculation, ExecutionContext, Outcome, StrategyKind};
use crate::error::{CalcResult, FieldCalcError};
use crate::resolver::resolve_argument;
use crate::strategy::registry::ChainValue;
use crate::types::{DataSet, DataType, Field};

/// One step of a spatial chain, e.g. `{"method": "buffer", "args": [0.5]}`.
///
/// Arguments given as `"!name!"` are replaced by the referenced column before the step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<serde_json::Value>,
    #[serde(default, alias = "params", skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

impl Operation {
    /// A step without arguments.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

/// A chain of operations applied to the active geometry column, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialDirective {
    /// Steps of the chain; each consumes the previous step's result.
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl SpatialDirective {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub(crate) fn validate(&self) -> CalcResult<()> {
        if let Some(idx) = self.operations.iter().position(|op| op.method.trim().is_empty()) {
            return Err(FieldCalcError::MalformedDirective {
                message: format!("spatial operation #{} has an empty 'method'", idx + 1),
            });
        }
        Ok(())
    }
}

impl Calculation for SpatialDirective {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Spatial
    }

    fn execute(
        &self,
        dataset: &mut DataSet,
        target_field: &str,
        ctx: &ExecutionContext<'_>,
    ) -> CalcResult<Outcome> {
        self.validate()?;

        let geometry_column = dataset
            .geometry_column()
            .ok_or(FieldCalcError::MissingGeometry)?
            .to_string();
        let values = dataset
            .column(&geometry_column)
            .ok_or_else(|| FieldCalcError::Reference {
                column: geometry_column.clone(),
            })?;
        let mut current = ChainValue::from_geometry_column(&geometry_column, values)?;

        for op in &self.operations {
            let positional = op
                .args
                .iter()
                .map(|arg| resolve_argument(dataset, arg))
                .collect::<CalcResult<Vec<_>>>()?;
            let named = op
                .kwargs
                .iter()
                .map(|(key, arg)| Ok((key.clone(), resolve_argument(dataset, arg)?)))
                .collect::<CalcResult<BTreeMap<_, _>>>()?;
            debug!(
                "spatial step '{}' on {} value(s) ({} positional, {} named argument(s))",
                op.method,
                current.kind().describe(),
                positional.len(),
                named.len()
            );
            current = ctx.registry.apply(&current, &op.method, positional, named)?;
        }

        let (data_type, values) = current.into_column();
        dataset.set_column(Field::new(target_field, data_type), values)?;

        let geometry_repointed = data_type == DataType::Geometry;
        if geometry_repointed {
            dataset.set_geometry_column(target_field)?;
            debug!("active geometry column is now '{target_field}'");
        }
        Ok(Outcome {
            data_type,
            geometry_repointed,
        })
    }
}
