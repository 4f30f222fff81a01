//! Built-in spatial chain operations.
//!
//! Geometry operations follow planar semantics: areas, lengths and distances are in the units of
//! the coordinates, angles are in degrees, and scaling and rotation happen around the centre of
//! the geometry's bounding box. Null rows stay null through every step.

use geo::{
    Area, BoundingRect, Buffer, Centroid, ConvexHull, Distance, Euclidean, Geometry, HasDimensions,
    Intersects, Line, MultiPolygon, Point, Polygon, Relate, Rotate, Scale, Translate,
};

use super::registry::{ChainValue, Handler, OperationArgs, OperationRegistry};
use crate::error::{CalcResult, FieldCalcError};
use crate::types::geometry_type_name;

type Geometries<'a> = &'a [Option<Geometry<f64>>];

pub(super) fn register(registry: &mut OperationRegistry) {
    registry
        .register_property("area", Handler::Geometry(area))
        .register_property("length", Handler::Geometry(length))
        .register_property("centroid", Handler::Geometry(centroid))
        .register_property("envelope", Handler::Geometry(envelope))
        .register_property("convex_hull", Handler::Geometry(convex_hull))
        .register_property("x", Handler::Geometry(x))
        .register_property("y", Handler::Geometry(y))
        .register_property("is_empty", Handler::Geometry(is_empty))
        .register_property("geom_type", Handler::Geometry(geom_type))
        .register_method("buffer", &["distance"], Handler::Geometry(buffer))
        .register_method("translate", &["xoff", "yoff"], Handler::Geometry(translate))
        .register_method("scale", &["xfact", "yfact"], Handler::Geometry(scale))
        .register_method("rotate", &["angle"], Handler::Geometry(rotate))
        .register_method("distance", &["other"], Handler::Geometry(distance))
        .register_method("intersects", &["other"], Handler::Geometry(intersects))
        .register_method("contains", &["other"], Handler::Geometry(contains));

    registry
        .register_method("round", &["decimals"], Handler::Number(round))
        .register_property("abs", Handler::Number(abs))
        .register_method("add", &["other"], Handler::Number(add))
        .register_method("sub", &["other"], Handler::Number(sub))
        .register_method("mul", &["other"], Handler::Number(mul))
        .register_method("div", &["other"], Handler::Number(div));

    registry.register_property("invert", Handler::Boolean(invert));

    registry
        .register_property("upper", Handler::Text(upper))
        .register_property("lower", Handler::Text(lower));
}

/// Applies `f` to every non-null row.
fn each<T, U>(
    values: &[Option<T>],
    mut f: impl FnMut(usize, &T) -> CalcResult<Option<U>>,
) -> CalcResult<Vec<Option<U>>> {
    values
        .iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(v) => f(row, v),
            None => Ok(None),
        })
        .collect()
}

fn area(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, g| Ok(Some(g.unsigned_area()))).map(ChainValue::Numbers)
}

fn length(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, g| {
        let mut lines = Vec::new();
        collect_lines(g, &mut lines);
        Ok(Some(lines.iter().map(line_length).sum()))
    })
    .map(ChainValue::Numbers)
}

fn centroid(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, g| Ok(g.centroid().map(Geometry::Point))).map(ChainValue::Geometries)
}

fn envelope(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, g| {
        Ok(g.bounding_rect().map(|rect| {
            if rect.min() == rect.max() {
                Geometry::Point(Point(rect.min()))
            } else {
                Geometry::Polygon(rect.to_polygon())
            }
        }))
    })
    .map(ChainValue::Geometries)
}

fn convex_hull(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, g| Ok(Some(Geometry::Polygon(g.convex_hull())))).map(ChainValue::Geometries)
}

fn point_coord(values: Geometries<'_>, operation: &str, f: fn(Point<f64>) -> f64) -> CalcResult<ChainValue> {
    each(values, |_, g| match g {
        Geometry::Point(p) => Ok(Some(f(*p))),
        _ => Err(FieldCalcError::UnsupportedOperation {
            operation: operation.to_string(),
            target: "non-point geometry",
        }),
    })
    .map(ChainValue::Numbers)
}

fn x(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    point_coord(values, "x", |p| p.x())
}

fn y(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    point_coord(values, "y", |p| p.y())
}

fn is_empty(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, g| Ok(Some(g.is_empty()))).map(ChainValue::Booleans)
}

fn geom_type(values: Geometries<'_>, _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, g| Ok(Some(geometry_type_name(g).to_string()))).map(ChainValue::Texts)
}

fn buffer(values: Geometries<'_>, args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |row, g| {
        let Some(distance) = args.number("distance", row)? else {
            return Ok(None);
        };
        Ok(Some(single_polygon(g.buffer(distance))))
    })
    .map(ChainValue::Geometries)
}

fn translate(values: Geometries<'_>, args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |row, g| {
        let (Some(dx), Some(dy)) = (args.number_or("xoff", row, 0.0)?, args.number_or("yoff", row, 0.0)?)
        else {
            return Ok(None);
        };
        Ok(Some(g.translate(dx, dy)))
    })
    .map(ChainValue::Geometries)
}

fn scale(values: Geometries<'_>, args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |row, g| {
        let (Some(fx), Some(fy)) = (args.number_or("xfact", row, 1.0)?, args.number_or("yfact", row, 1.0)?)
        else {
            return Ok(None);
        };
        Ok(Some(g.scale_xy(fx, fy)))
    })
    .map(ChainValue::Geometries)
}

fn rotate(values: Geometries<'_>, args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |row, g| {
        let Some(angle) = args.number("angle", row)? else {
            return Ok(None);
        };
        Ok(Some(g.rotate_around_center(angle)))
    })
    .map(ChainValue::Geometries)
}

/// Distance involving an empty geometry is undefined and comes out null.
fn distance(values: Geometries<'_>, args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |row, g| {
        Ok(args
            .geometry("other", row)?
            .filter(|other| !g.is_empty() && !other.is_empty())
            .map(|other| Euclidean.distance(g, other)))
    })
    .map(ChainValue::Numbers)
}

fn intersects(values: Geometries<'_>, args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |row, g| {
        Ok(args.geometry("other", row)?.map(|other| g.intersects(other)))
    })
    .map(ChainValue::Booleans)
}

fn contains(values: Geometries<'_>, args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |row, g| {
        Ok(args
            .geometry("other", row)?
            .map(|other| g.relate(other).is_contains()))
    })
    .map(ChainValue::Booleans)
}

fn round(values: &[Option<f64>], args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |row, v| {
        let Some(decimals) = args.number_or("decimals", row, 0.0)? else {
            return Ok(None);
        };
        if decimals.fract() != 0.0 {
            return Err(FieldCalcError::InvalidArgument {
                operation: args.operation().to_string(),
                argument: "decimals".to_string(),
                message: format!("expected an integer, got {decimals}"),
            });
        }
        let factor = 10f64.powi(decimals as i32);
        Ok(Some((v * factor).round_ties_even() / factor))
    })
    .map(ChainValue::Numbers)
}

fn abs(values: &[Option<f64>], _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, v| Ok(Some(v.abs()))).map(ChainValue::Numbers)
}

fn binary(
    values: &[Option<f64>],
    args: &OperationArgs<'_>,
    f: impl Fn(f64, f64) -> CalcResult<f64>,
) -> CalcResult<ChainValue> {
    each(values, |row, v| match args.number("other", row)? {
        Some(other) => f(*v, other).map(Some),
        None => Ok(None),
    })
    .map(ChainValue::Numbers)
}

fn add(values: &[Option<f64>], args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    binary(values, args, |a, b| Ok(a + b))
}

fn sub(values: &[Option<f64>], args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    binary(values, args, |a, b| Ok(a - b))
}

fn mul(values: &[Option<f64>], args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    binary(values, args, |a, b| Ok(a * b))
}

fn div(values: &[Option<f64>], args: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    binary(values, args, |a, b| {
        if b == 0.0 {
            return Err(FieldCalcError::DivisionByZero {
                expression: format!("div({a}, {b})"),
            });
        }
        Ok(a / b)
    })
}

fn invert(values: &[Option<bool>], _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, v| Ok(Some(!v))).map(ChainValue::Booleans)
}

fn upper(values: &[Option<String>], _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, v| Ok(Some(v.to_uppercase()))).map(ChainValue::Texts)
}

fn lower(values: &[Option<String>], _: &OperationArgs<'_>) -> CalcResult<ChainValue> {
    each(values, |_, v| Ok(Some(v.to_lowercase()))).map(ChainValue::Texts)
}

/// A buffer that came out as exactly one polygon is stored as a plain polygon.
fn single_polygon(mut buffered: MultiPolygon<f64>) -> Geometry<f64> {
    match buffered.0.len() {
        1 => Geometry::Polygon(buffered.0.remove(0)),
        _ => Geometry::MultiPolygon(buffered),
    }
}

fn polygon_lines(polygon: &Polygon<f64>, out: &mut Vec<Line<f64>>) {
    out.extend(polygon.exterior().lines());
    for ring in polygon.interiors() {
        out.extend(ring.lines());
    }
}

/// Boundary segments of `geometry`. Points contribute a zero-length segment.
fn collect_lines(geometry: &Geometry<f64>, out: &mut Vec<Line<f64>>) {
    match geometry {
        Geometry::Point(p) => out.push(Line::new(p.0, p.0)),
        Geometry::Line(l) => out.push(*l),
        Geometry::LineString(ls) => out.extend(ls.lines()),
        Geometry::Polygon(poly) => polygon_lines(poly, out),
        Geometry::MultiPoint(mp) => out.extend(mp.iter().map(|p| Line::new(p.0, p.0))),
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                out.extend(ls.lines());
            }
        }
        Geometry::MultiPolygon(mp) => {
            for poly in mp {
                polygon_lines(poly, out);
            }
        }
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                collect_lines(g, out);
            }
        }
        Geometry::Rect(r) => polygon_lines(&r.to_polygon(), out),
        Geometry::Triangle(t) => polygon_lines(&t.to_polygon(), out),
    }
}

/// Point geometries contribute nothing to length.
fn line_length(line: &Line<f64>) -> f64 {
    let d = line.delta();
    d.x.hypot(d.y)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use geo::{Geometry, MultiPoint, line_string, point, polygon};
    use serde_json::json;

    use crate::error::FieldCalcError;
    use crate::resolver::ResolvedArg;
    use crate::strategy::{ChainKind, ChainValue, OperationRegistry};
    use crate::types::Value;

    fn square() -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ])
    }

    fn apply(value: &ChainValue, name: &str, args: Vec<serde_json::Value>) -> Result<ChainValue, FieldCalcError> {
        let positional = args.into_iter().map(ResolvedArg::Literal).collect();
        OperationRegistry::default().apply(value, name, positional, BTreeMap::new())
    }

    fn numbers(value: ChainValue) -> Vec<Option<f64>> {
        match value {
            ChainValue::Numbers(v) => v,
            other => panic!("expected numbers, got {other:?}"),
        }
    }

    #[test]
    fn measures_area_length_and_centroid() {
        let value = ChainValue::Geometries(vec![Some(square()), None]);
        assert_eq!(numbers(apply(&value, "area", vec![]).unwrap()), vec![Some(4.0), None]);
        assert_eq!(numbers(apply(&value, "length", vec![]).unwrap()), vec![Some(8.0), None]);
        assert_eq!(
            apply(&value, "centroid", vec![]).unwrap(),
            ChainValue::Geometries(vec![Some(Geometry::Point(point!(x: 1.0, y: 1.0))), None])
        );
    }

    #[test]
    fn x_and_y_only_apply_to_points() {
        let points = ChainValue::Geometries(vec![Some(Geometry::Point(point!(x: 3.0, y: -1.0)))]);
        assert_eq!(numbers(apply(&points, "x", vec![]).unwrap()), vec![Some(3.0)]);
        assert_eq!(numbers(apply(&points, "y", vec![]).unwrap()), vec![Some(-1.0)]);

        let polygons = ChainValue::Geometries(vec![Some(square())]);
        let err = apply(&polygons, "x", vec![]).unwrap_err();
        assert!(matches!(err, FieldCalcError::UnsupportedOperation { target: "non-point geometry", .. }));
    }

    #[test]
    fn translate_and_round_take_positional_arguments() {
        let value = ChainValue::Geometries(vec![Some(Geometry::Point(point!(x: 1.0, y: 1.0)))]);
        assert_eq!(
            apply(&value, "translate", vec![json!(2), json!(-1)]).unwrap(),
            ChainValue::Geometries(vec![Some(Geometry::Point(point!(x: 3.0, y: 0.0)))])
        );

        let value = ChainValue::Numbers(vec![Some(2.36), Some(2.5)]);
        assert_eq!(numbers(apply(&value, "round", vec![json!(1)]).unwrap()), vec![Some(2.4), Some(2.5)]);
        assert_eq!(numbers(apply(&value, "round", vec![]).unwrap()), vec![Some(2.0), Some(2.0)]);
    }

    #[test]
    fn distance_to_disjoint_line() {
        let value = ChainValue::Geometries(vec![Some(square())]);
        let other = [Value::Geometry(Geometry::LineString(line_string![
            (x: 5.0, y: 0.0),
            (x: 5.0, y: 2.0),
        ]))];
        let mut named = BTreeMap::new();
        named.insert(
            "other".to_string(),
            ResolvedArg::Column {
                name: "lines".to_string(),
                values: &other,
            },
        );
        let out = OperationRegistry::default()
            .apply(&value, "distance", Vec::new(), named)
            .unwrap();
        assert_eq!(numbers(out), vec![Some(3.0)]);
    }

    #[test]
    fn distance_from_empty_geometry_is_null() {
        let value = ChainValue::Geometries(vec![
            Some(Geometry::MultiPoint(MultiPoint::new(Vec::new()))),
            Some(Geometry::Point(point!(x: 0.0, y: 4.0))),
        ]);
        let other = [
            Value::Geometry(Geometry::Point(point!(x: 1.0, y: 1.0))),
            Value::Geometry(Geometry::Point(point!(x: 3.0, y: 0.0))),
        ];
        let mut named = BTreeMap::new();
        named.insert(
            "other".to_string(),
            ResolvedArg::Column {
                name: "sites".to_string(),
                values: &other,
            },
        );
        let out = OperationRegistry::default()
            .apply(&value, "distance", Vec::new(), named)
            .unwrap();
        assert_eq!(numbers(out), vec![None, Some(5.0)]);
    }

    #[test]
    fn literal_geometry_argument_is_rejected() {
        let value = ChainValue::Geometries(vec![Some(square())]);
        let err = apply(&value, "intersects", vec![json!("POINT (1 1)")]).unwrap_err();
        assert!(matches!(err, FieldCalcError::InvalidArgument { ref argument, .. } if argument == "other"));
    }

    #[test]
    fn division_by_zero_in_chain() {
        let value = ChainValue::Numbers(vec![Some(1.0)]);
        assert!(matches!(
            apply(&value, "div", vec![json!(0)]).unwrap_err(),
            FieldCalcError::DivisionByZero { .. }
        ));
    }

    #[test]
    fn binding_rejects_bad_arguments() {
        let value = ChainValue::Geometries(vec![Some(square())]);
        assert!(matches!(
            apply(&value, "area", vec![json!(1)]).unwrap_err(),
            FieldCalcError::InvalidArgument { .. }
        ));
        assert!(matches!(
            apply(&value, "buffer", vec![json!(1), json!(2)]).unwrap_err(),
            FieldCalcError::InvalidArgument { .. }
        ));
        assert!(matches!(
            apply(&value, "buffer", vec![]).unwrap_err(),
            FieldCalcError::InvalidArgument { ref message, .. } if message.contains("missing")
        ));

        let mut named = BTreeMap::new();
        named.insert("distance".to_string(), ResolvedArg::Literal(json!(1)));
        let err = OperationRegistry::default()
            .apply(&value, "buffer", vec![ResolvedArg::Literal(json!(1))], named)
            .unwrap_err();
        assert!(matches!(err, FieldCalcError::InvalidArgument { ref message, .. } if message.contains("both")));
    }

    #[test]
    fn unknown_name_for_kind_is_unsupported() {
        let value = ChainValue::Numbers(vec![Some(1.0)]);
        let err = apply(&value, "centroid", vec![]).unwrap_err();
        assert!(matches!(err, FieldCalcError::UnsupportedOperation { target: "number", .. }));
    }

    #[test]
    fn registry_lists_names_per_kind() {
        let registry = OperationRegistry::default();
        assert_eq!(registry.names(ChainKind::Text), vec!["lower", "upper"]);
        assert!(registry.names(ChainKind::Geometry).contains(&"buffer"));
        assert!(OperationRegistry::empty().names(ChainKind::Geometry).is_empty());
    }
}
