//! Dispatcher: runs a [`Directive`] against a dataset and reports the outcome.
//!
//! [`FieldCalculator`] owns everything a calculation needs besides the dataset itself: the spatial
//! operation registry, expression evaluation tuning, an optional dedicated rayon pool and an
//! optional observer.
//!
//! ```rust
//! use field_calculator::calculator::{CalculatorOptions, FieldCalculator};
//! use field_calculator::types::{DataSet, DataType, Field, Schema, Value};
//!
//! # fn main() -> Result<(), field_calculator::FieldCalcError> {
//! let mut ds = DataSet::new(
//!     Schema::new(vec![Field::new("A", DataType::Int64)]),
//!     vec![vec![Value::Int64(1)], vec![Value::Int64(2)], vec![Value::Int64(3)]],
//! );
//! let calc = FieldCalculator::new(CalculatorOptions::default())?;
//! let stats = calc.calculate_json(
//!     &mut ds,
//!     &serde_json::json!({"strategy": "vector", "expression": "!A! * 2"}),
//!     "doubled",
//! )?;
//! assert_eq!(stats.rows, 3);
//! assert_eq!(
//!     ds.column("doubled").unwrap(),
//!     &[Value::Int64(2), Value::Int64(4), Value::Int64(6)]
//! );
//! # Ok(())
//! # }
//! ```

mod observer;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{CalcResult, FieldCalcError};
use crate::expression::EvalOptions;
use crate::strategy::{Directive, ExecutionContext, OperationRegistry};
use crate::types::DataSet;

pub use observer::{
    CalculationContext, CalculationObserver, CalculationSeverity, CalculationStats, CompositeObserver,
    LogObserver, StdErrObserver,
};

/// Configuration for the [`FieldCalculator`].
#[derive(Clone)]
pub struct CalculatorOptions {
    /// Worker threads for a dedicated pool.
    ///
    /// If `None`, calculations run on rayon's global pool.
    pub num_threads: Option<usize>,
    /// Columns with at least this many rows are evaluated in parallel.
    pub parallel_min_rows: usize,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn CalculationObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: CalculationSeverity,
}

impl fmt::Debug for CalculatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatorOptions")
            .field("num_threads", &self.num_threads)
            .field("parallel_min_rows", &self.parallel_min_rows)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for CalculatorOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            parallel_min_rows: EvalOptions::default().parallel_min_rows,
            observer: None,
            alert_at_or_above: CalculationSeverity::Critical,
        }
    }
}

/// Runs directives against datasets.
pub struct FieldCalculator {
    pool: Option<ThreadPool>,
    eval: EvalOptions,
    registry: OperationRegistry,
    observer: Option<Arc<dyn CalculationObserver>>,
    alert_at_or_above: CalculationSeverity,
}

impl fmt::Debug for FieldCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCalculator")
            .field("pool_threads", &self.pool.as_ref().map(ThreadPool::current_num_threads))
            .field("eval", &self.eval)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for FieldCalculator {
    /// Global rayon pool, built-in operations, no observer.
    fn default() -> Self {
        Self {
            pool: None,
            eval: EvalOptions::default(),
            registry: OperationRegistry::default(),
            observer: None,
            alert_at_or_above: CalculationSeverity::Critical,
        }
    }
}

impl FieldCalculator {
    /// Create a calculator with the built-in spatial operations.
    ///
    /// Fails only if a dedicated thread pool was requested and could not be built.
    pub fn new(opts: CalculatorOptions) -> CalcResult<Self> {
        let pool = match opts.num_threads {
            Some(n) => Some(ThreadPoolBuilder::new().num_threads(n.max(1)).build()?),
            None => None,
        };
        Ok(Self {
            pool,
            eval: EvalOptions {
                parallel_min_rows: opts.parallel_min_rows.max(1),
            },
            registry: OperationRegistry::default(),
            observer: opts.observer,
            alert_at_or_above: opts.alert_at_or_above,
        })
    }

    /// Replace the spatial operation registry.
    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Attach an observer for calculation outcomes.
    pub fn with_observer(mut self, observer: Arc<dyn CalculationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Mutable access for registering additional operations.
    pub fn registry_mut(&mut self) -> &mut OperationRegistry {
        &mut self.registry
    }

    /// Compute `target_field` on `dataset` as described by `directive`.
    ///
    /// On success the target column is added (or replaced in place) and, for spatial chains that
    /// end in geometry, becomes the active geometry column. On failure `dataset` is unchanged.
    ///
    /// When an observer is configured, this reports:
    ///
    /// - `on_success` on success, with row count and result type
    /// - `on_failure` on failure, with a computed severity
    /// - `on_alert` on failure when the severity is >= the configured threshold
    pub fn calculate(
        &self,
        dataset: &mut DataSet,
        directive: &Directive,
        target_field: &str,
    ) -> CalcResult<CalculationStats> {
        let ctx = CalculationContext {
            strategy: Some(directive.kind()),
            target_field: target_field.to_string(),
        };
        let result = self.run(dataset, directive, target_field);
        self.report(&ctx, &result);
        result
    }

    /// Like [`FieldCalculator::calculate`], validating a raw JSON payload first.
    pub fn calculate_json(
        &self,
        dataset: &mut DataSet,
        payload: &serde_json::Value,
        target_field: &str,
    ) -> CalcResult<CalculationStats> {
        match Directive::from_json(payload) {
            Ok(directive) => self.calculate(dataset, &directive, target_field),
            Err(e) => {
                let ctx = CalculationContext {
                    strategy: None,
                    target_field: target_field.to_string(),
                };
                let result = Err(e);
                self.report(&ctx, &result);
                result
            }
        }
    }

    fn run(
        &self,
        dataset: &mut DataSet,
        directive: &Directive,
        target_field: &str,
    ) -> CalcResult<CalculationStats> {
        if target_field.trim().is_empty() {
            return Err(FieldCalcError::MalformedDirective {
                message: "target field name must not be empty".to_string(),
            });
        }
        directive.validate()?;
        debug!(
            "calculating '{}' with {} strategy over {} row(s)",
            target_field,
            directive.kind(),
            dataset.row_count()
        );

        let start = Instant::now();
        let exec = ExecutionContext {
            registry: &self.registry,
            eval: &self.eval,
        };
        let outcome = self.install(|| {
            directive
                .calculation()
                .execute(dataset, target_field, &exec)
        })?;
        Ok(CalculationStats {
            rows: dataset.row_count(),
            data_type: outcome.data_type,
            geometry_repointed: outcome.geometry_repointed,
            elapsed: start.elapsed(),
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn report(&self, ctx: &CalculationContext, result: &CalcResult<CalculationStats>) {
        let Some(obs) = self.observer.as_ref() else {
            return;
        };
        match result {
            Ok(stats) => obs.on_success(ctx, *stats),
            Err(e) => {
                let sev = CalculationSeverity::of(e);
                obs.on_failure(ctx, sev, e);
                if sev >= self.alert_at_or_above {
                    obs.on_alert(ctx, sev, e);
                }
            }
        }
    }
}

/// Compute one field with a default [`FieldCalculator`].
pub fn calculate_field(
    dataset: &mut DataSet,
    directive: &Directive,
    target_field: &str,
) -> CalcResult<CalculationStats> {
    FieldCalculator::default().calculate(dataset, directive, target_field)
}

/// Convenience helper for callers that want an owned request object.
///
/// Serialized as `{"target_field": "...", "directive": {"strategy": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRequest")]
pub struct CalculationRequest {
    pub directive: Directive,
    pub target_field: String,
}

#[derive(Deserialize)]
struct RawRequest {
    directive: serde_json::Value,
    target_field: String,
}

impl TryFrom<RawRequest> for CalculationRequest {
    type Error = FieldCalcError;

    fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            directive: Directive::from_json(&raw.directive)?,
            target_field: raw.target_field,
        })
    }
}

impl CalculationRequest {
    pub fn new(directive: Directive, target_field: impl Into<String>) -> Self {
        Self {
            directive,
            target_field: target_field.into(),
        }
    }

    /// Validate a request payload.
    pub fn from_json(payload: &serde_json::Value) -> CalcResult<Self> {
        let raw: RawRequest =
            serde_json::from_value(payload.clone()).map_err(|e| FieldCalcError::MalformedDirective {
                message: format!("invalid calculation request: {e}"),
            })?;
        Self::try_from(raw)
    }

    /// Execute the request by calling [`FieldCalculator::calculate`].
    pub fn run(&self, calculator: &FieldCalculator, dataset: &mut DataSet) -> CalcResult<CalculationStats> {
        calculator.calculate(dataset, &self.directive, &self.target_field)
    }
}
