use field_calculator::strategy::{Directive, VectorDirective};
use field_calculator::types::{DataSet, DataType, Field, Schema, Value};
use field_calculator::{FieldCalcError, calculate_field};

fn roads() -> DataSet {
    let schema = Schema::new(vec![
        Field::new("A", DataType::Int64),
        Field::new("len", DataType::Float64),
        Field::new("time", DataType::Float64),
        Field::new("name", DataType::Utf8),
    ]);
    DataSet::new(
        schema,
        vec![
            vec![Value::Int64(1), Value::Float64(10.0), Value::Float64(2.0), Value::Utf8("a".into())],
            vec![Value::Int64(2), Value::Float64(30.0), Value::Float64(3.0), Value::Utf8("b".into())],
            vec![Value::Int64(3), Value::Float64(8.0), Value::Float64(0.5), Value::Utf8("c".into())],
        ],
    )
}

fn vector(expression: &str) -> Directive {
    Directive::Vector(VectorDirective::new(expression))
}

#[test]
fn scales_integer_column() {
    let mut ds = roads();
    let stats = calculate_field(&mut ds, &vector("!A! * 2"), "B").unwrap();
    assert_eq!(stats.rows, 3);
    assert_eq!(stats.data_type, DataType::Int64);
    assert_eq!(
        ds.column("B").unwrap(),
        &[Value::Int64(2), Value::Int64(4), Value::Int64(6)]
    );
    // Existing columns and row count are untouched.
    assert_eq!(ds.row_count(), 3);
    assert_eq!(ds.column("A"), roads().column("A"));
}

#[test]
fn evaluates_compound_expression_with_brackets() {
    let mut ds = roads();
    calculate_field(&mut ds, &vector("(![len]! / !time!) ** 2"), "speed_sq").unwrap();
    assert_eq!(
        ds.column("speed_sq").unwrap(),
        &[Value::Float64(25.0), Value::Float64(100.0), Value::Float64(256.0)]
    );
}

#[test]
fn overwrites_existing_column_in_place() {
    let mut ds = roads();
    calculate_field(&mut ds, &vector("!len! + !A!"), "time").unwrap();
    assert_eq!(ds.schema.index_of("time"), Some(2));
    assert_eq!(ds.schema.fields.len(), 4);
    assert_eq!(
        ds.column("time").unwrap(),
        &[Value::Float64(11.0), Value::Float64(32.0), Value::Float64(11.0)]
    );
}

#[test]
fn division_by_zero_is_reported_with_expression() {
    let mut ds = roads();
    let err = calculate_field(&mut ds, &vector("!len! / (!A! - 2)"), "ratio").unwrap_err();
    match &err {
        FieldCalcError::DivisionByZero { expression } => assert_eq!(expression, "!len! / (!A! - 2)"),
        other => panic!("expected division by zero, got {other:?}"),
    }
    assert!(err.to_string().contains("division by zero"));
    assert!(ds.column("ratio").is_none());
}

#[test]
fn unknown_reference_fails_before_evaluation() {
    let mut ds = roads();
    let before = ds.clone();
    let err = calculate_field(&mut ds, &vector("!A! + !missing!"), "out").unwrap_err();
    assert!(matches!(err, FieldCalcError::Reference { ref column } if column == "missing"));
    assert_eq!(ds, before);
}

#[test]
fn non_numeric_reference_is_a_type_error() {
    let mut ds = roads();
    let err = calculate_field(&mut ds, &vector("!name! * 2"), "out").unwrap_err();
    assert!(matches!(
        err,
        FieldCalcError::Type { ref column, found: DataType::Utf8 } if column == "name"
    ));

    // Bare identifiers are held to the same rule.
    let err = calculate_field(&mut ds, &vector("name + 1"), "out").unwrap_err();
    assert!(matches!(err, FieldCalcError::Type { .. }));
    assert!(ds.column("out").is_none());
}

#[test]
fn other_failures_are_wrapped_with_expression_text() {
    let mut ds = roads();
    let err = calculate_field(&mut ds, &vector("!A! +"), "out").unwrap_err();
    match err {
        FieldCalcError::Evaluation { expression, source } => {
            assert_eq!(expression, "!A! +");
            assert!(matches!(*source, FieldCalcError::Syntax { .. }));
        }
        other => panic!("expected wrapped evaluation error, got {other:?}"),
    }
}

#[test]
fn null_cells_propagate() {
    let mut ds = DataSet::new(
        Schema::new(vec![Field::new("v", DataType::Float64)]),
        vec![vec![Value::Float64(1.0)], vec![Value::Null]],
    );
    calculate_field(&mut ds, &vector("!v! * 10"), "w").unwrap();
    assert_eq!(ds.column("w").unwrap(), &[Value::Float64(10.0), Value::Null]);
}

#[test]
fn repeated_runs_produce_identical_columns() {
    let mut ds = roads();
    let directive = vector("!len! / !A!");
    calculate_field(&mut ds, &directive, "r").unwrap();
    let first = ds.column("r").unwrap().to_vec();
    calculate_field(&mut ds, &directive, "r").unwrap();
    assert_eq!(ds.column("r").unwrap(), first.as_slice());
}

#[test]
fn zero_to_a_negative_power_is_division_by_zero() {
    let mut ds = DataSet::new(
        Schema::new(vec![
            Field::new("Z", DataType::Int64),
            Field::new("F", DataType::Float64),
        ]),
        vec![vec![Value::Int64(0), Value::Float64(0.0)]],
    );
    for expression in ["!Z! ** -1", "!F! ** -1.5"] {
        let err = calculate_field(&mut ds, &vector(expression), "out").unwrap_err();
        assert!(
            matches!(err, FieldCalcError::DivisionByZero { expression: ref e } if e == expression),
            "{expression}: {err:?}"
        );
    }
    assert!(ds.column("out").is_none());
}

#[test]
fn boolean_columns_count_as_zero_and_one() {
    let mut ds = DataSet::new(
        Schema::new(vec![
            Field::new("flag", DataType::Bool),
            Field::new("len", DataType::Float64),
        ]),
        vec![
            vec![Value::Bool(true), Value::Float64(2.5)],
            vec![Value::Bool(false), Value::Float64(4.0)],
        ],
    );
    let stats = calculate_field(&mut ds, &vector("!flag! * 2"), "doubled").unwrap();
    assert_eq!(stats.data_type, DataType::Int64);
    assert_eq!(ds.column("doubled").unwrap(), &[Value::Int64(2), Value::Int64(0)]);

    calculate_field(&mut ds, &vector("!len! * !flag!"), "kept").unwrap();
    assert_eq!(ds.column("kept").unwrap(), &[Value::Float64(2.5), Value::Float64(0.0)]);
}
