use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::error::FieldCalcError;
use crate::strategy::StrategyKind;
use crate::types::DataType;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CalculationSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// The calculation failed because of the data it ran against.
    Error,
    /// The directive itself (or the calculator's configuration) is unusable.
    Critical,
}

impl CalculationSeverity {
    pub(crate) fn of(error: &FieldCalcError) -> Self {
        if error.root_cause().is_directive_error() {
            Self::Critical
        } else {
            Self::Error
        }
    }
}

/// Context about a calculation attempt.
#[derive(Debug, Clone)]
pub struct CalculationContext {
    /// Strategy of the directive, when one was parsed.
    pub strategy: Option<StrategyKind>,
    /// Column the calculation writes.
    pub target_field: String,
}

/// Stats reported on a successful calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculationStats {
    /// Number of rows written.
    pub rows: usize,
    /// Data type of the written column.
    pub data_type: DataType,
    /// Whether the written column became the active geometry column.
    pub geometry_repointed: bool,
    /// Wall-clock time spent computing the column.
    pub elapsed: Duration,
}

/// Observer interface for calculation outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait CalculationObserver: Send + Sync {
    /// Called when a calculation succeeds.
    fn on_success(&self, _ctx: &CalculationContext, _stats: CalculationStats) {}

    /// Called when a calculation fails.
    fn on_failure(&self, _ctx: &CalculationContext, _severity: CalculationSeverity, _error: &FieldCalcError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &CalculationContext, severity: CalculationSeverity, error: &FieldCalcError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Fans callbacks out to a list of observers.
///
/// Members added with [`CompositeObserver::scoped`] only hear about calculations of one strategy.
/// Failures that happen before a directive is parsed carry no strategy, so only unscoped members
/// see them.
#[derive(Default)]
pub struct CompositeObserver {
    members: Vec<(Option<StrategyKind>, Arc<dyn CalculationObserver>)>,
}

impl CompositeObserver {
    /// Composite whose observers hear about every calculation.
    pub fn new(observers: Vec<Arc<dyn CalculationObserver>>) -> Self {
        Self {
            members: observers.into_iter().map(|o| (None, o)).collect(),
        }
    }

    /// Add an observer that is only told about `strategy` calculations.
    pub fn scoped(mut self, strategy: StrategyKind, observer: Arc<dyn CalculationObserver>) -> Self {
        self.members.push((Some(strategy), observer));
        self
    }

    fn members_for<'a>(
        &'a self,
        ctx: &'a CalculationContext,
    ) -> impl Iterator<Item = &'a Arc<dyn CalculationObserver>> + 'a {
        self.members
            .iter()
            .filter(move |(scope, _)| scope.is_none() || *scope == ctx.strategy)
            .map(|(_, observer)| observer)
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scoped = self.members.iter().filter(|(scope, _)| scope.is_some()).count();
        f.debug_struct("CompositeObserver")
            .field("observers", &self.members.len())
            .field("scoped", &scoped)
            .finish()
    }
}

impl CalculationObserver for CompositeObserver {
    fn on_success(&self, ctx: &CalculationContext, stats: CalculationStats) {
        for o in self.members_for(ctx) {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &CalculationContext, severity: CalculationSeverity, error: &FieldCalcError) {
        for o in self.members_for(ctx) {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &CalculationContext, severity: CalculationSeverity, error: &FieldCalcError) {
        for o in self.members_for(ctx) {
            o.on_alert(ctx, severity, error);
        }
    }
}

fn strategy_label(ctx: &CalculationContext) -> &'static str {
    ctx.strategy.map(StrategyKind::tag).unwrap_or("?")
}

/// Writes calculation events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl CalculationObserver for StdErrObserver {
    fn on_success(&self, ctx: &CalculationContext, stats: CalculationStats) {
        eprintln!(
            "[calc][ok] strategy={} target={} rows={} type={:?} elapsed={:?}",
            strategy_label(ctx),
            ctx.target_field,
            stats.rows,
            stats.data_type,
            stats.elapsed
        );
    }

    fn on_failure(&self, ctx: &CalculationContext, severity: CalculationSeverity, error: &FieldCalcError) {
        eprintln!(
            "[calc][{:?}] strategy={} target={} err={}",
            severity,
            strategy_label(ctx),
            ctx.target_field,
            error
        );
    }

    fn on_alert(&self, ctx: &CalculationContext, severity: CalculationSeverity, error: &FieldCalcError) {
        eprintln!(
            "[ALERT][calc][{:?}] strategy={} target={} err={}",
            severity,
            strategy_label(ctx),
            ctx.target_field,
            error
        );
    }
}

/// Routes calculation events through the `log` facade under the `field_calculator` target.
#[derive(Debug, Default)]
pub struct LogObserver;

impl CalculationObserver for LogObserver {
    fn on_success(&self, ctx: &CalculationContext, stats: CalculationStats) {
        info!(
            target: "field_calculator",
            "calculated '{}' with {} strategy: {} row(s) of {:?} in {:?}",
            ctx.target_field,
            strategy_label(ctx),
            stats.rows,
            stats.data_type,
            stats.elapsed
        );
    }

    fn on_failure(&self, ctx: &CalculationContext, severity: CalculationSeverity, error: &FieldCalcError) {
        warn!(
            target: "field_calculator",
            "calculating '{}' failed ({:?}): {}",
            ctx.target_field,
            severity,
            error
        );
    }

    fn on_alert(&self, ctx: &CalculationContext, severity: CalculationSeverity, error: &FieldCalcError) {
        error!(
            target: "field_calculator",
            "ALERT calculating '{}' failed ({:?}): {}",
            ctx.target_field,
            severity,
            error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::CalculationSeverity;
    use crate::error::FieldCalcError;

    #[test]
    fn directive_errors_are_critical() {
        let malformed = FieldCalcError::MalformedDirective {
            message: "x".to_string(),
        };
        let missing = FieldCalcError::Reference {
            column: "a".to_string(),
        };
        assert_eq!(CalculationSeverity::of(&malformed), CalculationSeverity::Critical);
        assert_eq!(CalculationSeverity::of(&missing), CalculationSeverity::Error);
        assert!(CalculationSeverity::Critical > CalculationSeverity::Error);
    }
}
