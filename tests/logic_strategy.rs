use field_calculator::strategy::{Directive, LogicDirective, Rule};
use field_calculator::types::{DataSet, DataType, Field, Schema, Value};
use field_calculator::{FieldCalcError, calculate_field};
use serde_json::json;

fn parcels() -> DataSet {
    let schema = Schema::new(vec![
        Field::new("zone", DataType::Utf8),
        Field::new("area", DataType::Float64),
        Field::new("floors", DataType::Int64),
    ]);
    DataSet::new(
        schema,
        vec![
            vec![Value::Utf8("R".into()), Value::Float64(450.0), Value::Int64(2)],
            vec![Value::Utf8("C".into()), Value::Float64(1200.0), Value::Int64(6)],
            vec![Value::Utf8("R".into()), Value::Float64(900.0), Value::Int64(1)],
            vec![Value::Utf8("I".into()), Value::Null, Value::Int64(1)],
        ],
    )
}

fn utf8(values: &[Option<&str>]) -> Vec<Value> {
    values
        .iter()
        .map(|v| v.map(|s| Value::Utf8(s.to_string())).unwrap_or(Value::Null))
        .collect()
}

#[test]
fn first_matching_rule_wins() {
    let mut ds = parcels();
    let directive = Directive::Logic(LogicDirective::new(
        vec![
            Rule::new("area > 800", "large"),
            Rule::new("zone == 'R'", "residential"),
        ],
        Some(json!("other")),
    ));
    calculate_field(&mut ds, &directive, "class").unwrap();
    assert_eq!(
        ds.column("class").unwrap(),
        utf8(&[Some("residential"), Some("large"), Some("large"), Some("other")]).as_slice()
    );
}

#[test]
fn unmatched_rows_are_null_without_else() {
    let mut ds = parcels();
    let directive: Directive = r#"{"strategy": "conditional", "rules": [{"if": "floors >= 2", "then": "multi"}]}"#
        .parse()
        .unwrap();
    calculate_field(&mut ds, &directive, "storeys").unwrap();
    assert_eq!(
        ds.column("storeys").unwrap(),
        utf8(&[Some("multi"), Some("multi"), None, None]).as_slice()
    );
}

#[test]
fn compound_conditions_and_marked_references() {
    let mut ds = parcels();
    let directive: Directive = r#"{
        "strategy": "conditional",
        "rules": [
            {"if": "(zone == 'C') | (!floors! > 4)", "then": 3},
            {"if": "zone == 'R' and not area < 500", "then": 2}
        ],
        "else": 1
    }"#
    .parse()
    .unwrap();
    let stats = calculate_field(&mut ds, &directive, "tier").unwrap();
    assert_eq!(stats.data_type, DataType::Int64);
    assert_eq!(
        ds.column("tier").unwrap(),
        &[Value::Int64(1), Value::Int64(3), Value::Int64(2), Value::Int64(1)]
    );
}

#[test]
fn condition_failures_are_wrapped_and_leave_dataset_untouched() {
    let mut ds = parcels();
    let before = ds.clone();
    let directive = Directive::Logic(LogicDirective::new(
        vec![Rule::new("zone > 3", "x")],
        None,
    ));
    let err = calculate_field(&mut ds, &directive, "bad").unwrap_err();
    match &err {
        FieldCalcError::RuleEngine { condition, source } => {
            assert_eq!(condition, "zone > 3");
            assert!(matches!(**source, FieldCalcError::OperandType { .. }));
        }
        other => panic!("expected rule engine error, got {other:?}"),
    }
    assert!(err.to_string().contains("rule engine failed"));
    assert_eq!(ds, before);
}

#[test]
fn unknown_column_in_condition_is_reported() {
    let mut ds = parcels();
    let directive = Directive::Logic(LogicDirective::new(
        vec![Rule::new("height > 10", true)],
        Some(json!(false)),
    ));
    let err = calculate_field(&mut ds, &directive, "tall").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        FieldCalcError::Reference { column } if column == "height"
    ));
}

#[test]
fn non_boolean_condition_is_rejected() {
    let mut ds = parcels();
    let directive = Directive::Logic(LogicDirective::new(vec![Rule::new("floors + 1", "x")], None));
    let err = calculate_field(&mut ds, &directive, "out").unwrap_err();
    assert!(matches!(err.root_cause(), FieldCalcError::NotBoolean { .. }));
}
