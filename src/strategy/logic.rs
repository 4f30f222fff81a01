//! Conditional (rule-based) assignment.
//!
//! Every rule's condition is evaluated over the whole dataset into a row mask; each row then
//! takes the value of the first rule, in declaration order, whose mask is true for it. Rows
//! matching no rule receive the `else` value, or `Null` when none was given.

use log::debug;
use serde::{Deserialize, Serialize};

use super::{Calculation, ExecutionContext, Outcome, StrategyKind, write_column};
use crate::error::{CalcResult, FieldCalcError};
use crate::expression::Expression;
use crate::types::{DataSet, Value};

/// One `{"if": <condition>, "then": <value>}` rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Boolean expression over dataset columns.
    #[serde(rename = "if")]
    pub condition: String,
    /// Scalar JSON value assigned to matching rows.
    #[serde(rename = "then", default)]
    pub value: serde_json::Value,
}

impl Rule {
    pub fn new(condition: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            condition: condition.into(),
            value: value.into(),
        }
    }
}

/// Ordered rules; each row takes the value of the first rule it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicDirective {
    /// Rules in priority order.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Value for rows no rule matches (`else` in payloads); null when absent.
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl LogicDirective {
    pub fn new(rules: Vec<Rule>, default: Option<serde_json::Value>) -> Self {
        Self { rules, default }
    }

    pub(crate) fn validate(&self) -> CalcResult<()> {
        if self.rules.is_empty() {
            return Err(FieldCalcError::MalformedDirective {
                message: "logic strategy requires a non-empty 'rules' list".to_string(),
            });
        }
        for rule in &self.rules {
            scalar_from_json(&rule.value)?;
        }
        if let Some(default) = &self.default {
            scalar_from_json(default)?;
        }
        Ok(())
    }
}

impl Calculation for LogicDirective {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Logic
    }

    fn execute(
        &self,
        dataset: &mut DataSet,
        target_field: &str,
        ctx: &ExecutionContext<'_>,
    ) -> CalcResult<Outcome> {
        self.validate()?;

        let mut masks = Vec::with_capacity(self.rules.len());
        let mut choices = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let mask = Expression::parse(&rule.condition)
                .and_then(|expr| expr.evaluate_mask(dataset, ctx.eval))
                .map_err(|e| FieldCalcError::RuleEngine {
                    condition: rule.condition.clone(),
                    source: Box::new(e),
                })?;
            debug!(
                "rule '{}' matched {} of {} row(s)",
                rule.condition,
                mask.iter().filter(|m| **m).count(),
                mask.len()
            );
            masks.push(mask);
            choices.push(scalar_from_json(&rule.value)?);
        }
        let fallback = match &self.default {
            Some(v) => scalar_from_json(v)?,
            None => Value::Null,
        };

        let values = (0..dataset.row_count())
            .map(|row| {
                masks
                    .iter()
                    .position(|mask| mask[row])
                    .map(|idx| choices[idx].clone())
                    .unwrap_or_else(|| fallback.clone())
            })
            .collect();

        let data_type = write_column(dataset, target_field, values)?;
        Ok(Outcome {
            data_type,
            geometry_repointed: false,
        })
    }
}

/// Convert a rule result literal into a cell value.
fn scalar_from_json(value: &serde_json::Value) -> CalcResult<Value> {
    match value {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int64(i)),
            None => n.as_f64().map(Value::Float64).ok_or_else(|| {
                FieldCalcError::MalformedDirective {
                    message: format!("rule value {n} is out of range"),
                }
            }),
        },
        serde_json::Value::String(s) => Ok(Value::Utf8(s.clone())),
        other => Err(FieldCalcError::MalformedDirective {
            message: format!("rule values must be scalars, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LogicDirective, Rule};
    use crate::error::FieldCalcError;
    use crate::expression::EvalOptions;
    use crate::strategy::{Calculation, ExecutionContext, OperationRegistry};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn run(directive: &LogicDirective, ds: &mut DataSet) -> Result<(), FieldCalcError> {
        let registry = OperationRegistry::empty();
        let eval = EvalOptions::default();
        let ctx = ExecutionContext {
            registry: &registry,
            eval: &eval,
        };
        directive.execute(ds, "out", &ctx).map(|_| ())
    }

    fn dataset() -> DataSet {
        DataSet::new(
            Schema::new(vec![Field::new("n", DataType::Int64)]),
            (1..=4).map(|i| vec![Value::Int64(i)]).collect(),
        )
    }

    #[test]
    fn mixed_numeric_results_widen_to_float() {
        let mut ds = dataset();
        let directive = LogicDirective::new(
            vec![Rule::new("n < 2", 1), Rule::new("n < 3", 2.5)],
            Some(json!(0)),
        );
        run(&directive, &mut ds).unwrap();
        assert_eq!(ds.field("out").unwrap().data_type, DataType::Float64);
        assert_eq!(
            ds.column("out").unwrap(),
            &[
                Value::Float64(1.0),
                Value::Float64(2.5),
                Value::Float64(0.0),
                Value::Float64(0.0)
            ]
        );
    }

    #[test]
    fn nested_rule_values_are_rejected() {
        let directive = LogicDirective::new(vec![Rule::new("n > 1", json!([1, 2]))], None);
        assert!(matches!(
            directive.validate(),
            Err(FieldCalcError::MalformedDirective { .. })
        ));
    }

    #[test]
    fn failed_condition_leaves_dataset_untouched() {
        let mut ds = dataset();
        let before = ds.clone();
        let directive = LogicDirective::new(
            vec![Rule::new("n > 1", "ok"), Rule::new("n / 0 > 1", "boom")],
            None,
        );
        let err = run(&directive, &mut ds).unwrap_err();
        assert!(matches!(err, FieldCalcError::RuleEngine { ref condition, .. } if condition == "n / 0 > 1"));
        assert!(matches!(err.root_cause(), FieldCalcError::DivisionByZero { .. }));
        assert_eq!(ds, before);
    }
}
