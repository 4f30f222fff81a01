//! `field-calculator` computes a new column on an in-memory [`types::DataSet`] from a small
//! declarative directive, without writing bespoke code per computation.
//!
//! A directive is a JSON object whose `strategy` key selects one of three computation families:
//!
//! - **spatial**: an ordered chain of geometry operations starting from the dataset's active
//!   geometry column (`buffer` then `centroid`, `area` then `round`, ...)
//! - **conditional** (alias `logic`): first-match-wins rules of the form
//!   `{"if": <condition>, "then": <value>}` with an optional `else`
//! - **vector**: one vectorized numeric expression over `!column!` references
//!
//! Directives are validated into a typed [`strategy::Directive`] at the boundary, so a malformed
//! payload fails before anything runs. Expressions are parsed into a restricted syntax tree
//! ([`expression`]) and can only read dataset columns.
//!
//! ## Quick example
//!
//! ```rust
//! use field_calculator::{calculate_field, Directive};
//! use field_calculator::types::{DataSet, DataType, Field, Schema, Value};
//!
//! # fn main() -> Result<(), field_calculator::FieldCalcError> {
//! let mut ds = DataSet::new(
//!     Schema::new(vec![Field::new("speed", DataType::Int64)]),
//!     vec![vec![Value::Int64(20)], vec![Value::Int64(55)], vec![Value::Int64(90)]],
//! );
//!
//! let directive: Directive = r#"{
//!     "strategy": "conditional",
//!     "rules": [
//!         {"if": "speed > 80", "then": "fast"},
//!         {"if": "speed > 40", "then": "medium"}
//!     ],
//!     "else": "slow"
//! }"#
//! .parse()?;
//!
//! calculate_field(&mut ds, &directive, "class")?;
//! assert_eq!(
//!     ds.column("class").unwrap(),
//!     &[
//!         Value::Utf8("slow".into()),
//!         Value::Utf8("medium".into()),
//!         Value::Utf8("fast".into()),
//!     ]
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`calculator`]: the dispatcher, its configuration and observer hooks
//! - [`strategy`]: directives, the three strategies and the spatial operation registry
//! - [`expression`]: the restricted expression language
//! - [`resolver`]: `!column!` reference handling
//! - [`types`]: schema + in-memory dataset types
//! - [`error`]: the error type shared by every module
//!
//! The library logs through the [`log`] facade and never installs a logger itself.

pub mod calculator;
pub mod error;
pub mod expression;
pub mod resolver;
pub mod strategy;
pub mod types;

pub use calculator::{FieldCalculator, calculate_field};
pub use error::{CalcResult, FieldCalcError};
pub use strategy::Directive;
