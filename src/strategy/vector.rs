//! Vectorized numeric expressions such as `!A! * 2` or `(!len! / !time!) ** 2`.

use log::debug;
use serde::{Deserialize, Serialize};

use super::{Calculation, ExecutionContext, Outcome, StrategyKind, write_column};
use crate::error::{CalcResult, FieldCalcError};
use crate::expression::Expression;
use crate::resolver::{clean_expression, find_references, require_numeric};
use crate::types::DataSet;

/// One numeric expression computed over whole columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDirective {
    /// Expression text; columns are referenced as `!name!` or by bare name.
    pub expression: String,
}

impl VectorDirective {
    /// Directive for `expression`.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    pub(crate) fn validate(&self) -> CalcResult<()> {
        if self.expression.trim().is_empty() {
            return Err(FieldCalcError::MalformedDirective {
                message: "vector strategy requires a non-empty 'expression'".to_string(),
            });
        }
        Ok(())
    }

    fn wrap(&self, error: FieldCalcError) -> FieldCalcError {
        match error {
            FieldCalcError::DivisionByZero { .. } => FieldCalcError::DivisionByZero {
                expression: self.expression.clone(),
            },
            other => FieldCalcError::Evaluation {
                expression: self.expression.clone(),
                source: Box::new(other),
            },
        }
    }
}

impl Calculation for VectorDirective {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vector
    }

    fn execute(
        &self,
        dataset: &mut DataSet,
        target_field: &str,
        ctx: &ExecutionContext<'_>,
    ) -> CalcResult<Outcome> {
        self.validate()?;

        // Every referenced column must exist and be numeric before anything is evaluated.
        for reference in find_references(&self.expression) {
            require_numeric(dataset, &reference.name)?;
        }

        let cleaned = clean_expression(&self.expression);
        debug!("vector expression '{}' cleaned to '{}'", self.expression, cleaned);
        let expr = Expression::parse(&cleaned).map_err(|e| self.wrap(e))?;
        for name in expr.columns() {
            require_numeric(dataset, name)?;
        }

        let values = expr
            .evaluate(dataset, ctx.eval)
            .map_err(|e| self.wrap(e))?;
        let data_type = write_column(dataset, target_field, values)?;
        Ok(Outcome {
            data_type,
            geometry_repointed: false,
        })
    }
}
