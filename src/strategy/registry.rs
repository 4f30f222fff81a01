//! Named operations available to spatial chains.
//!
//! Each step of a spatial chain looks its operation up by name for the kind of value the chain
//! currently holds (geometries, numbers, booleans or text). Names without an entry for that
//! kind are rejected at lookup time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use geo::Geometry;

use crate::error::{CalcResult, FieldCalcError};
use crate::resolver::ResolvedArg;
use crate::types::{DataType, Value};

/// Kind of value held between spatial chain steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChainKind {
    Geometry,
    Number,
    Boolean,
    Text,
}

impl ChainKind {
    pub fn describe(self) -> &'static str {
        match self {
            ChainKind::Geometry => "geometry",
            ChainKind::Number => "number",
            ChainKind::Boolean => "boolean",
            ChainKind::Text => "text",
        }
    }
}

/// One value per row, carried from one chain step to the next.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainValue {
    Geometries(Vec<Option<Geometry<f64>>>),
    Numbers(Vec<Option<f64>>),
    Booleans(Vec<Option<bool>>),
    Texts(Vec<Option<String>>),
}

impl ChainValue {
    pub fn kind(&self) -> ChainKind {
        match self {
            ChainValue::Geometries(_) => ChainKind::Geometry,
            ChainValue::Numbers(_) => ChainKind::Number,
            ChainValue::Booleans(_) => ChainKind::Boolean,
            ChainValue::Texts(_) => ChainKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChainValue::Geometries(v) => v.len(),
            ChainValue::Numbers(v) => v.len(),
            ChainValue::Booleans(v) => v.len(),
            ChainValue::Texts(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a geometry column into a chain value; non-geometry cells are a type error.
    pub fn from_geometry_column(column: &str, values: &[Value]) -> CalcResult<Self> {
        values
            .iter()
            .map(|v| match v {
                Value::Geometry(g) => Ok(Some(g.clone())),
                Value::Null => Ok(None),
                other => Err(FieldCalcError::Type {
                    column: column.to_string(),
                    found: other.data_type().unwrap_or(DataType::Utf8),
                }),
            })
            .collect::<CalcResult<Vec<_>>>()
            .map(ChainValue::Geometries)
    }

    /// Convert into a dataset column.
    pub fn into_column(self) -> (DataType, Vec<Value>) {
        fn collect<T>(values: Vec<Option<T>>, f: impl Fn(T) -> Value) -> Vec<Value> {
            values
                .into_iter()
                .map(|v| v.map(&f).unwrap_or(Value::Null))
                .collect()
        }
        match self {
            ChainValue::Geometries(v) => (DataType::Geometry, collect(v, Value::Geometry)),
            ChainValue::Numbers(v) => (DataType::Float64, collect(v, Value::Float64)),
            ChainValue::Booleans(v) => (DataType::Bool, collect(v, Value::Bool)),
            ChainValue::Texts(v) => (DataType::Utf8, collect(v, Value::Utf8)),
        }
    }
}

/// Whether an operation is read as a property or invoked as a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Read without arguments, like `area`.
    Property,
    /// Called with arguments, like `buffer(distance)`.
    Method,
}

/// Handler for operations on geometry chain values.
pub type GeometryHandler = fn(&[Option<Geometry<f64>>], &OperationArgs<'_>) -> CalcResult<ChainValue>;
/// Handler for operations on number chain values.
pub type NumberHandler = fn(&[Option<f64>], &OperationArgs<'_>) -> CalcResult<ChainValue>;
/// Handler for operations on boolean chain values.
pub type BooleanHandler = fn(&[Option<bool>], &OperationArgs<'_>) -> CalcResult<ChainValue>;
/// Handler for operations on text chain values.
pub type TextHandler = fn(&[Option<String>], &OperationArgs<'_>) -> CalcResult<ChainValue>;

/// A typed handler; the variant decides which chain kind the operation is registered for.
#[derive(Clone, Copy)]
pub enum Handler {
    Geometry(GeometryHandler),
    Number(NumberHandler),
    Boolean(BooleanHandler),
    Text(TextHandler),
}

impl Handler {
    pub fn kind(&self) -> ChainKind {
        match self {
            Handler::Geometry(_) => ChainKind::Geometry,
            Handler::Number(_) => ChainKind::Number,
            Handler::Boolean(_) => ChainKind::Boolean,
            Handler::Text(_) => ChainKind::Text,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:?})", self.kind())
    }
}

/// A registered operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationSpec {
    pub member: MemberKind,
    /// Parameter names, in positional order. Properties take none.
    pub params: &'static [&'static str],
    pub handler: Handler,
}

/// Operation lookup table keyed by chain kind and name.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    entries: HashMap<(ChainKind, String), OperationSpec>,
}

impl Default for OperationRegistry {
    /// A registry holding the built-in operations.
    fn default() -> Self {
        let mut registry = Self::empty();
        super::builtins::register(&mut registry);
        registry
    }
}

impl OperationRegistry {
    /// A registry with no operations at all.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a property (read without arguments).
    pub fn register_property(&mut self, name: impl Into<String>, handler: Handler) -> &mut Self {
        self.insert(name.into(), MemberKind::Property, &[], handler)
    }

    /// Register a method accepting `params` positionally or by name.
    pub fn register_method(
        &mut self,
        name: impl Into<String>,
        params: &'static [&'static str],
        handler: Handler,
    ) -> &mut Self {
        self.insert(name.into(), MemberKind::Method, params, handler)
    }

    fn insert(
        &mut self,
        name: String,
        member: MemberKind,
        params: &'static [&'static str],
        handler: Handler,
    ) -> &mut Self {
        self.entries.insert(
            (handler.kind(), name),
            OperationSpec {
                member,
                params,
                handler,
            },
        );
        self
    }

    pub fn lookup(&self, kind: ChainKind, name: &str) -> Option<&OperationSpec> {
        self.entries.get(&(kind, name.to_string()))
    }

    /// Sorted operation names registered for `kind`.
    pub fn names(&self, kind: ChainKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Apply operation `name` to `value`.
    pub fn apply(
        &self,
        value: &ChainValue,
        name: &str,
        positional: Vec<ResolvedArg<'_>>,
        named: BTreeMap<String, ResolvedArg<'_>>,
    ) -> CalcResult<ChainValue> {
        let unsupported = || FieldCalcError::UnsupportedOperation {
            operation: name.to_string(),
            target: value.kind().describe(),
        };
        let spec = self.lookup(value.kind(), name).ok_or_else(unsupported)?;
        let args = OperationArgs::bind(name, spec, positional, named)?;

        let out = match (spec.handler, value) {
            (Handler::Geometry(f), ChainValue::Geometries(v)) => f(v, &args)?,
            (Handler::Number(f), ChainValue::Numbers(v)) => f(v, &args)?,
            (Handler::Boolean(f), ChainValue::Booleans(v)) => f(v, &args)?,
            (Handler::Text(f), ChainValue::Texts(v)) => f(v, &args)?,
            _ => return Err(unsupported()),
        };
        if out.len() != value.len() {
            return Err(FieldCalcError::LengthMismatch {
                column: name.to_string(),
                expected: value.len(),
                actual: out.len(),
            });
        }
        Ok(out)
    }
}

/// Arguments of one operation call, bound to the operation's parameter names.
#[derive(Debug)]
pub struct OperationArgs<'a> {
    operation: String,
    bound: BTreeMap<&'static str, ResolvedArg<'a>>,
}

impl<'a> OperationArgs<'a> {
    fn bind(
        operation: &str,
        spec: &OperationSpec,
        positional: Vec<ResolvedArg<'a>>,
        named: BTreeMap<String, ResolvedArg<'a>>,
    ) -> CalcResult<Self> {
        let invalid = |argument: String, message: String| FieldCalcError::InvalidArgument {
            operation: operation.to_string(),
            argument,
            message,
        };

        if spec.member == MemberKind::Property && (!positional.is_empty() || !named.is_empty()) {
            let argument = named
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| "#1".to_string());
            return Err(invalid(
                argument,
                "is a property and takes no arguments".to_string(),
            ));
        }
        if positional.len() > spec.params.len() {
            return Err(invalid(
                format!("#{}", spec.params.len() + 1),
                format!(
                    "takes at most {} argument(s), {} given",
                    spec.params.len(),
                    positional.len()
                ),
            ));
        }
        let mut bound: BTreeMap<&'static str, ResolvedArg<'a>> = spec
            .params
            .iter()
            .copied()
            .zip(positional)
            .collect();
        for (key, value) in named {
            let Some(param) = spec.params.iter().copied().find(|p| *p == key) else {
                return Err(invalid(key, "unexpected keyword argument".to_string()));
            };
            if bound.insert(param, value).is_some() {
                return Err(invalid(
                    key,
                    "given both positionally and by name".to_string(),
                ));
            }
        }

        Ok(Self {
            operation: operation.to_string(),
            bound,
        })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn is_set(&self, param: &str) -> bool {
        self.bound.contains_key(param)
    }

    fn invalid(&self, param: &str, message: impl Into<String>) -> FieldCalcError {
        FieldCalcError::InvalidArgument {
            operation: self.operation.clone(),
            argument: param.to_string(),
            message: message.into(),
        }
    }

    /// Numeric argument for `row`; a missing argument is an error, a null cell yields `None`.
    pub fn number(&self, param: &str, row: usize) -> CalcResult<Option<f64>> {
        match self.bound.get(param) {
            None => Err(self.invalid(param, "missing required argument")),
            Some(ResolvedArg::Literal(v)) => match v {
                serde_json::Value::Null => Ok(None),
                serde_json::Value::Number(n) => Ok(n.as_f64()),
                other => Err(self.invalid(param, format!("expected a number, got {other}"))),
            },
            Some(ResolvedArg::Column { name, values }) => match &values[row] {
                Value::Null => Ok(None),
                v => v.as_f64().map(Some).ok_or_else(|| {
                    self.invalid(param, format!("column '{name}' is not numeric"))
                }),
            },
        }
    }

    /// Like [`OperationArgs::number`] but falls back to `default` when the argument is absent.
    pub fn number_or(&self, param: &str, row: usize, default: f64) -> CalcResult<Option<f64>> {
        if self.is_set(param) {
            self.number(param, row)
        } else {
            Ok(Some(default))
        }
    }

    /// Geometry argument for `row`. Geometries can only come from column references.
    pub fn geometry(&self, param: &str, row: usize) -> CalcResult<Option<&'a Geometry<f64>>> {
        match self.bound.get(param) {
            None => Err(self.invalid(param, "missing required argument")),
            Some(ResolvedArg::Literal(_)) => Err(self.invalid(
                param,
                "expected a '!column!' reference to a geometry column",
            )),
            Some(ResolvedArg::Column { name, values }) => {
                let values: &'a [Value] = values;
                match &values[row] {
                    Value::Null => Ok(None),
                    Value::Geometry(g) => Ok(Some(g)),
                    _ => Err(self.invalid(
                        param,
                        format!("column '{name}' is not a geometry column"),
                    )),
                }
            }
        }
    }
}
