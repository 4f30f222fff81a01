use thiserror::Error;

use crate::types::DataType;

/// Convenience result type for field calculation.
pub type CalcResult<T> = Result<T, FieldCalcError>;

/// Error type returned by directive parsing, expression evaluation and every strategy.
///
/// Failures are reported at the point of detection and abort the whole directive; the target
/// column is only written once a strategy has produced every row.
#[derive(Debug, Error)]
pub enum FieldCalcError {
    /// A column reference names a column that is not in the dataset.
    #[error("column '{column}' not found in dataset")]
    Reference { column: String },

    /// A column used in a numeric context has a non-numeric type.
    #[error("column '{column}' is not numeric (found {found:?})")]
    Type { column: String, found: DataType },

    /// A spatial operation name has no registered handler for the current chain value.
    #[error("{target} value has no operation '{operation}'")]
    UnsupportedOperation {
        operation: String,
        target: &'static str,
    },

    /// An operation received arguments it does not accept, or is missing a required one.
    #[error("invalid argument '{argument}' for operation '{operation}': {message}")]
    InvalidArgument {
        operation: String,
        argument: String,
        message: String,
    },

    /// The directive is missing required keys or has the wrong shape.
    #[error("malformed directive: {message}")]
    MalformedDirective { message: String },

    /// The directive's `strategy` tag matches none of the known strategies.
    #[error("unknown strategy '{name}' (expected one of: spatial, conditional, vector)")]
    UnknownStrategy { name: String },

    /// The dataset has no active geometry column to start a spatial chain from.
    #[error("dataset has no active geometry column")]
    MissingGeometry,

    /// A column handed to the dataset does not match its row count.
    #[error("column '{column}' has {actual} values but the dataset has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// An expression could not be parsed.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// An operator was applied to values it does not support.
    #[error("unsupported operand types for '{op}': {left} and {right}")]
    OperandType {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// A unary operator was applied to a value it does not support.
    #[error("unsupported operand type for '{op}': {operand}")]
    UnaryOperand {
        op: &'static str,
        operand: &'static str,
    },

    /// Integer overflow or a similar arithmetic failure.
    #[error("arithmetic error: {message}")]
    Arithmetic { message: String },

    /// A rule condition evaluated to something other than booleans.
    #[error("condition produced {found} values instead of booleans")]
    NotBoolean { found: &'static str },

    /// Division (or modulo) by zero while evaluating an expression.
    #[error("division by zero detected in expression '{expression}'")]
    DivisionByZero { expression: String },

    /// Any other failure while evaluating a vector expression.
    #[error("failed to execute expression '{expression}': {source}")]
    Evaluation {
        expression: String,
        source: Box<FieldCalcError>,
    },

    /// Any failure while evaluating a logic rule condition.
    #[error("rule engine failed on condition '{condition}': {source}")]
    RuleEngine {
        condition: String,
        source: Box<FieldCalcError>,
    },

    /// A dedicated worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl FieldCalcError {
    /// Returns the innermost error, looking through `Evaluation` and `RuleEngine` wrappers.
    pub fn root_cause(&self) -> &FieldCalcError {
        match self {
            FieldCalcError::Evaluation { source, .. } | FieldCalcError::RuleEngine { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }

    /// `true` for errors caused by the directive itself rather than by the data it ran against.
    pub fn is_directive_error(&self) -> bool {
        matches!(
            self,
            FieldCalcError::MalformedDirective { .. }
                | FieldCalcError::UnknownStrategy { .. }
                | FieldCalcError::Syntax { .. }
                | FieldCalcError::ThreadPool(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::FieldCalcError;

    #[test]
    fn root_cause_unwraps_nested_wrappers() {
        let err = FieldCalcError::RuleEngine {
            condition: "a > 1".to_string(),
            source: Box::new(FieldCalcError::Evaluation {
                expression: "a > 1".to_string(),
                source: Box::new(FieldCalcError::Reference {
                    column: "a".to_string(),
                }),
            }),
        };
        assert!(matches!(
            err.root_cause(),
            FieldCalcError::Reference { column } if column == "a"
        ));
    }

    #[test]
    fn messages_carry_context() {
        let err = FieldCalcError::RuleEngine {
            condition: "speed > 'x'".to_string(),
            source: Box::new(FieldCalcError::OperandType {
                op: ">",
                left: "Int64",
                right: "Utf8",
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("rule engine failed"));
        assert!(msg.contains("speed > 'x'"));
        assert!(msg.contains("Int64 and Utf8"));
    }
}
