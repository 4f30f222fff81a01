//! Core data model: a column-major [`DataSet`] described by a [`Schema`], with an optional
//! active geometry column.
//!
//! Field calculation adds or replaces exactly one column of a dataset at a time; every other
//! column and the row count are left untouched.

use std::fmt;

use geo::Geometry;

use crate::error::{CalcResult, FieldCalcError};

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Planar geometry (points, lines, polygons and their collections).
    Geometry,
}

impl DataType {
    /// `true` for types that may take part in numeric expressions.
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// `true` for types a vector expression may compute with: the numeric types, plus `Bool`
    /// counted as `0`/`1`.
    pub fn is_arithmetic(self) -> bool {
        self.is_numeric() || self == DataType::Bool
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered list of fields describing the columns of a [`DataSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns a field by name, if present.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/unset value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Planar geometry.
    Geometry(Geometry<f64>),
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Int64(_) => "Int64",
            Value::Float64(_) => "Float64",
            Value::Bool(_) => "Bool",
            Value::Utf8(_) => "Utf8",
            Value::Geometry(_) => "Geometry",
        }
    }

    /// The [`DataType`] this value belongs to, or `None` for [`Value::Null`].
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::Utf8(_) => Some(DataType::Utf8),
            Value::Geometry(_) => Some(DataType::Geometry),
        }
    }

    /// `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value (`Int64` widened to `f64`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow the geometry of a [`Value::Geometry`] cell.
    pub fn as_geometry(&self) -> Option<&Geometry<f64>> {
        match self {
            Value::Geometry(g) => Some(g),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Utf8(v) => f.write_str(v),
            Value::Geometry(g) => f.write_str(geometry_type_name(g)),
        }
    }
}

/// Name of a geometry's concrete type (`"Point"`, `"Polygon"`, ...).
pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Infer a column type for freshly computed values and coerce them to it.
///
/// - all non-null values share one type: that type is kept
/// - a mix of `Int64` and `Float64`: integers are widened to `Float64`
/// - any other mix: every non-null value is rendered as `Utf8`
/// - no non-null values at all: `Utf8`
pub fn normalize_values(values: Vec<Value>) -> (DataType, Vec<Value>) {
    let mut seen: Option<DataType> = None;
    let mut mixed_numeric = false;
    let mut mixed_other = false;

    for dt in values.iter().filter_map(Value::data_type) {
        match seen {
            None => seen = Some(dt),
            Some(cur) if cur == dt => {}
            Some(cur) if cur.is_numeric() && dt.is_numeric() => {
                mixed_numeric = true;
                seen = Some(DataType::Float64);
            }
            Some(_) => mixed_other = true,
        }
    }

    if mixed_other {
        let values = values
            .into_iter()
            .map(|v| match v {
                Value::Null => Value::Null,
                Value::Utf8(s) => Value::Utf8(s),
                other => Value::Utf8(other.to_string()),
            })
            .collect();
        return (DataType::Utf8, values);
    }

    if mixed_numeric {
        let values = values
            .into_iter()
            .map(|v| match v {
                Value::Int64(i) => Value::Float64(i as f64),
                other => other,
            })
            .collect();
        return (DataType::Float64, values);
    }

    (seen.unwrap_or(DataType::Utf8), values)
}

/// In-memory tabular dataset.
///
/// Values are stored column-major, one `Vec<Value>` per [`Schema`] field, and every column has
/// exactly [`DataSet::row_count`] entries. One `Geometry` column may be marked as the active
/// geometry column that spatial calculations start from.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing the columns.
    pub schema: Schema,
    columns: Vec<Vec<Value>>,
    row_count: usize,
    geometry_column: Option<String>,
}

impl DataSet {
    /// Create a dataset from schema and row-major rows.
    ///
    /// # Panics
    ///
    /// Panics if any row has a different length than the schema field count.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        let width = schema.fields.len();
        let row_count = rows.len();
        let mut columns: Vec<Vec<Value>> = (0..width).map(|_| Vec::with_capacity(row_count)).collect();
        for row in rows {
            assert!(
                row.len() == width,
                "row length {} does not match schema length {}",
                row.len(),
                width
            );
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Self {
            schema,
            columns,
            row_count,
            geometry_column: None,
        }
    }

    /// Create a dataset from column-major storage, validating that every column has the same
    /// length and that there is one column per schema field.
    pub fn from_columns(schema: Schema, columns: Vec<Vec<Value>>) -> CalcResult<Self> {
        if columns.len() != schema.fields.len() {
            return Err(FieldCalcError::LengthMismatch {
                column: "<schema>".to_string(),
                expected: schema.fields.len(),
                actual: columns.len(),
            });
        }
        let row_count = columns.first().map(Vec::len).unwrap_or(0);
        for (field, column) in schema.fields.iter().zip(&columns) {
            if column.len() != row_count {
                return Err(FieldCalcError::LengthMismatch {
                    column: field.name.clone(),
                    expected: row_count,
                    actual: column.len(),
                });
            }
        }
        Ok(Self {
            schema,
            columns,
            row_count,
            geometry_column: None,
        })
    }

    /// Builder-style variant of [`DataSet::set_geometry_column`].
    pub fn with_geometry_column(mut self, name: &str) -> CalcResult<Self> {
        self.set_geometry_column(name)?;
        Ok(self)
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Returns a column's values by name.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.schema
            .index_of(name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Returns a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.schema.field(name)
    }

    /// Collects row `idx` across all columns, in schema order.
    pub fn row(&self, idx: usize) -> Option<Vec<Value>> {
        if idx >= self.row_count {
            return None;
        }
        Some(self.columns.iter().map(|c| c[idx].clone()).collect())
    }

    /// Name of the active geometry column, if one is set.
    pub fn geometry_column(&self) -> Option<&str> {
        self.geometry_column.as_deref()
    }

    /// Mark `name` as the active geometry column.
    pub fn set_geometry_column(&mut self, name: &str) -> CalcResult<()> {
        let field = self.schema.field(name).ok_or_else(|| FieldCalcError::Reference {
            column: name.to_string(),
        })?;
        if field.data_type != DataType::Geometry {
            return Err(FieldCalcError::Type {
                column: name.to_string(),
                found: field.data_type,
            });
        }
        self.geometry_column = Some(name.to_string());
        Ok(())
    }

    /// Add `field` as a new column, or replace the column of the same name.
    ///
    /// Replacing keeps the column's position in the schema but takes the new data type.
    pub fn set_column(&mut self, field: Field, values: Vec<Value>) -> CalcResult<()> {
        if values.len() != self.row_count && !(self.columns.is_empty() && self.row_count == 0) {
            return Err(FieldCalcError::LengthMismatch {
                column: field.name,
                expected: self.row_count,
                actual: values.len(),
            });
        }
        if self.columns.is_empty() {
            self.row_count = values.len();
        }

        match self.schema.index_of(&field.name) {
            Some(idx) => {
                if self.geometry_column.as_deref() == Some(field.name.as_str())
                    && field.data_type != DataType::Geometry
                {
                    self.geometry_column = None;
                }
                self.schema.fields[idx] = field;
                self.columns[idx] = values;
            }
            None => {
                self.schema.fields.push(field);
                self.columns.push(values);
            }
        }
        Ok(())
    }
}
