//! Geometry functions
//!
//! The `$`-prefixed functions read the geometry of the context feature and
//! are never static. The rest operate on geometry arguments. Indexes taken
//! by `point_n`, `geometry_n` and `interior_ring_n` are 1-based; `$x_at`
//! and `$y_at` take 0-based vertex indexes and count from the end when
//! negative.

use std::sync::Arc;

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use super::function::FunctionContext;
use super::utils::{measurer, single_point};
use crate::core::{EvalError, EvalResult, Result, Value};
use crate::geometry::{Geometry, GeometryType, Point};
use crate::register_function;

/// Geometry of the context feature, if it has one
fn feature_geometry(call: &FunctionContext<'_>) -> Option<Arc<Geometry>> {
    call.context.feature().and_then(|f| f.geometry().cloned())
}

/// Feature geometry when it belongs to `family`
fn feature_geometry_of(call: &FunctionContext<'_>, family: GeometryType) -> Option<Arc<Geometry>> {
    feature_geometry(call).filter(|g| g.geometry_type() == family)
}

fn point_value(point: Point) -> Value {
    Value::from(Geometry::from(point))
}

fn optional_geometry(geometry: Option<Geometry>) -> Value {
    geometry.map(Value::from).unwrap_or_default()
}

/// Convert a 1-based index argument into a 0-based one
fn zero_based(call: &FunctionContext<'_>, index: usize) -> EvalResult<Option<usize>> {
    let index = call.int(index)?;
    Ok(usize::try_from(index - 1).ok())
}

fn vertex_at(call: &FunctionContext<'_>) -> EvalResult<Option<Point>> {
    let Some(geometry) = feature_geometry(call) else {
        return Ok(None);
    };
    let vertices = geometry.vertices();
    let count = vertices.len() as i64;
    let mut index = call.int(0)?;
    if index < 0 {
        index += count;
    }
    if !(0..count).contains(&index) {
        return Err(EvalError::new("Index is out of range"));
    }
    Ok(vertices.get(index as usize).copied())
}

impl FunctionRegistry {
    pub fn register_geometry_functions(&self) -> Result<()> {
        self.register_feature_geometry_functions()?;
        self.register_geometry_constructors()?;
        self.register_geometry_accessors()?;
        self.register_geometry_measurements()?;
        self.register_geometry_transforms()
    }

    fn register_feature_geometry_functions(&self) -> Result<()> {
        FunctionBuilder::new("$geometry", FunctionGroup::Geometry)
            .help("Returns the geometry of the current feature.")
            .arity(0)
            .uses_geometry(true)
            .is_static(false)
            .implementation(|call| {
                Ok(feature_geometry(call).map(Value::Geometry).unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("$area", FunctionGroup::Geometry)
            .help("Returns the area of the current feature, in the expression's area units.")
            .arity(0)
            .uses_geometry(true)
            .is_static(false)
            .implementation(|call| {
                let Some(geometry) = feature_geometry_of(call, GeometryType::Polygon) else {
                    return Ok(Value::Null);
                };
                let calculator = measurer(call.parent);
                let area = calculator.measure_area(&geometry);
                Ok(Value::Double(
                    calculator.convert_area_measurement(area, call.parent.area_units()),
                ))
            })
            .register_builtin(self)?;
        FunctionBuilder::new("$length", FunctionGroup::Geometry)
            .help("Returns the length of the current line feature, in the expression's distance units.")
            .arity(0)
            .uses_geometry(true)
            .is_static(false)
            .implementation(|call| {
                let Some(geometry) = feature_geometry_of(call, GeometryType::Line) else {
                    return Ok(Value::Null);
                };
                let calculator = measurer(call.parent);
                let length = calculator.measure_length(&geometry);
                Ok(Value::Double(
                    calculator.convert_length_measurement(length, call.parent.distance_units()),
                ))
            })
            .register_builtin(self)?;
        FunctionBuilder::new("$perimeter", FunctionGroup::Geometry)
            .help("Returns the perimeter of the current polygon feature, in the expression's distance units.")
            .arity(0)
            .uses_geometry(true)
            .is_static(false)
            .implementation(|call| {
                let Some(geometry) = feature_geometry_of(call, GeometryType::Polygon) else {
                    return Ok(Value::Null);
                };
                let calculator = measurer(call.parent);
                let perimeter = calculator.measure_perimeter(&geometry);
                Ok(Value::Double(
                    calculator.convert_length_measurement(perimeter, call.parent.distance_units()),
                ))
            })
            .register_builtin(self)?;

        let coordinates: [(&str, &str, fn(&Point) -> f64); 2] = [
            ("$x", "Returns the x coordinate of the current point feature.", |p| p.x),
            ("$y", "Returns the y coordinate of the current point feature.", |p| p.y),
        ];
        for (name, help, pick) in coordinates {
            FunctionBuilder::new(name, FunctionGroup::Geometry)
                .help(help)
                .arity(0)
                .uses_geometry(true)
                .is_static(false)
                .implementation(move |call| {
                    Ok(feature_geometry_of(call, GeometryType::Point)
                        .and_then(|g| g.vertices().first().map(pick))
                        .map(Value::Double)
                        .unwrap_or_default())
                })
                .register_builtin(self)?;
        }

        FunctionBuilder::new("$x_at", FunctionGroup::Geometry)
            .help("Returns the x coordinate of a vertex of the current feature.")
            .parameter("vertex")
            .alias("xat")
            .alias("x_at")
            .uses_geometry(true)
            .is_static(false)
            .implementation(|call| {
                Ok(vertex_at(call)?.map(|p| Value::Double(p.x)).unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("$y_at", FunctionGroup::Geometry)
            .help("Returns the y coordinate of a vertex of the current feature.")
            .parameter("vertex")
            .alias("yat")
            .alias("y_at")
            .uses_geometry(true)
            .is_static(false)
            .implementation(|call| {
                Ok(vertex_at(call)?.map(|p| Value::Double(p.y)).unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("geometry", FunctionGroup::Geometry)
            .help("Returns the geometry of a feature.")
            .parameter("feature")
            .uses_geometry(true)
            .implementation(|call| {
                Ok(call.feature(0)?.geometry().cloned().map(Value::Geometry).unwrap_or_default())
            })
            .register_builtin(self)
    }

    fn register_geometry_constructors(&self) -> Result<()> {
        FunctionBuilder::new("make_point", FunctionGroup::Geometry)
            .help("Creates a point geometry from x, y and optional z and m values.")
            .variadic()
            .implementation(|call| {
                if !(2..=4).contains(&call.arg_count()) {
                    return Err(EvalError::new("Function make_point requires 2-4 arguments"));
                }
                let mut point = Point::new(call.double(0)?, call.double(1)?);
                if call.arg_count() >= 3 {
                    point = point.with_z(call.double(2)?);
                }
                if call.arg_count() == 4 {
                    point = point.with_m(call.double(3)?);
                }
                Ok(point_value(point))
            })
            .register_builtin(self)?;
        register_function!(
            self,
            "make_point_m",
            groups: [FunctionGroup::Geometry],
            help: "Creates a point geometry from x, y and m values.",
            parameters: ["x", "y", "m"],
            implementation: |call| {
                let point = Point::new(call.double(0)?, call.double(1)?);
                Ok(point_value(point.with_m(call.double(2)?)))
            }
        )?;
        FunctionBuilder::new("make_line", FunctionGroup::Geometry)
            .help("Creates a line geometry from a series of point geometries.")
            .variadic()
            .handles_null()
            .implementation(|call| {
                if call.arg_count() < 2 {
                    return Ok(Value::Null);
                }
                let points = call
                    .values()
                    .filter_map(|value| match value {
                        Value::Geometry(g) if !g.is_multipart() => single_point(g).copied(),
                        _ => None,
                    })
                    .collect();
                Ok(Value::from(Geometry::LineString(points)))
            })
            .register_builtin(self)?;
        FunctionBuilder::new("make_polygon", FunctionGroup::Geometry)
            .help("Creates a polygon from an outer ring and optional inner rings.")
            .variadic()
            .handles_null()
            .implementation(|call| {
                if call.arg_count() < 1 {
                    return Err(EvalError::new("Function make_polygon requires an argument"));
                }
                let ring = |value: &Value| match value {
                    Value::Geometry(g) => match g.as_ref() {
                        Geometry::LineString(points) => Some(points.clone()),
                        _ => None,
                    },
                    _ => None,
                };
                let Some(exterior) = ring(call.value(0)) else {
                    return Ok(Value::Null);
                };
                let mut rings = vec![exterior];
                rings.extend(call.values().skip(1).filter_map(ring));
                Ok(Value::from(Geometry::Polygon(rings)))
            })
            .register_builtin(self)?;
        FunctionBuilder::new("geom_from_wkt", FunctionGroup::Geometry)
            .help("Returns a geometry created from a well-known text representation.")
            .parameter("text")
            .alias("geomFromWKT")
            .implementation(|call| {
                let text = call.text(0);
                match Geometry::from_wkt(&text) {
                    Ok(geometry) => Ok(Value::from(geometry)),
                    Err(error) => {
                        log::debug!("geom_from_wkt: cannot parse '{text}': {error}");
                        Ok(Value::Null)
                    }
                }
            })
            .register_builtin(self)?;
        FunctionBuilder::new("geom_to_wkt", FunctionGroup::Geometry)
            .help("Returns the well-known text representation of a geometry, rounded to a precision.")
            .parameter("geometry")
            .optional_parameter("precision", 8)
            .alias("geomToWKT")
            .implementation(|call| {
                let precision = i32::try_from(call.int(1)?).unwrap_or(i32::MAX);
                Ok(Value::String(call.geometry(0)?.rounded(precision).to_wkt()))
            })
            .register_builtin(self)
    }

    fn register_geometry_accessors(&self) -> Result<()> {
        register_function!(
            self,
            "x",
            groups: [FunctionGroup::Geometry],
            help: "Returns the x coordinate of a point, or of the centroid of any other geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                let geometry = call.geometry(0)?;
                Ok(point_or_centroid(&geometry).map(|p| Value::Double(p.x)).unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "y",
            groups: [FunctionGroup::Geometry],
            help: "Returns the y coordinate of a point, or of the centroid of any other geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                let geometry = call.geometry(0)?;
                Ok(point_or_centroid(&geometry).map(|p| Value::Double(p.y)).unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "z",
            groups: [FunctionGroup::Geometry],
            help: "Returns the z coordinate of a point geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                Ok(match call.geometry(0)?.as_ref() {
                    Geometry::Point(Some(p)) => p.z.map(Value::Double).unwrap_or_default(),
                    _ => Value::Null,
                })
            }
        )?;
        register_function!(
            self,
            "m",
            groups: [FunctionGroup::Geometry],
            help: "Returns the m value of a point geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                Ok(match call.geometry(0)?.as_ref() {
                    Geometry::Point(Some(p)) => p.m.map(Value::Double).unwrap_or_default(),
                    _ => Value::Null,
                })
            }
        )?;
        register_function!(
            self,
            "point_n",
            groups: [FunctionGroup::Geometry],
            help: "Returns a specific vertex of a geometry, counting from 1.",
            parameters: ["geometry", "index"],
            implementation: |call| {
                let vertices = call.geometry(0)?.vertices();
                zero_based(call, 1)?
                    .and_then(|index| vertices.get(index).copied())
                    .map(point_value)
                    .ok_or_else(|| EvalError::new("Point index is out of range"))
            }
        )?;
        register_function!(
            self,
            "start_point",
            groups: [FunctionGroup::Geometry],
            help: "Returns the first vertex of a geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                let vertices = call.geometry(0)?.vertices();
                Ok(vertices.first().copied().map(point_value).unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "end_point",
            groups: [FunctionGroup::Geometry],
            help: "Returns the last vertex of a geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                let vertices = call.geometry(0)?.vertices();
                Ok(vertices.last().copied().map(point_value).unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "num_points",
            groups: [FunctionGroup::Geometry],
            help: "Returns the number of vertices in a geometry.",
            parameters: ["geometry"],
            implementation: |call| Ok(Value::from(call.geometry(0)?.num_points()))
        )?;
        register_function!(
            self,
            "num_geometries",
            groups: [FunctionGroup::Geometry],
            help: "Returns the number of parts in a geometry.",
            parameters: ["geometry"],
            implementation: |call| Ok(Value::from(call.geometry(0)?.num_geometries()))
        )?;
        register_function!(
            self,
            "num_rings",
            groups: [FunctionGroup::Geometry],
            help: "Returns the number of rings, exterior included, in a polygon or collection of polygons.",
            parameters: ["geometry"],
            implementation: |call| {
                Ok(call.geometry(0)?.num_rings().map(Value::from).unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "num_interior_rings",
            groups: [FunctionGroup::Geometry],
            help: "Returns the number of interior rings of a polygon, or of the first polygon in a collection.",
            parameters: ["geometry"],
            implementation: |call| {
                let geometry = call.geometry(0)?;
                let first_polygon = match geometry.as_ref() {
                    Geometry::Polygon(_) => Some(geometry.as_ref().clone()),
                    Geometry::MultiPolygon(_) => geometry.geometry_n(0),
                    Geometry::GeometryCollection(parts) => parts
                        .iter()
                        .find(|part| matches!(part, Geometry::Polygon(_)))
                        .cloned(),
                    _ => None,
                };
                Ok(first_polygon
                    .and_then(|polygon| polygon.num_interior_rings())
                    .map(Value::from)
                    .unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "exterior_ring",
            groups: [FunctionGroup::Geometry],
            help: "Returns the exterior ring of a polygon as a line.",
            parameters: ["geometry"],
            implementation: |call| Ok(optional_geometry(call.geometry(0)?.exterior_ring()))
        )?;
        register_function!(
            self,
            "interior_ring_n",
            groups: [FunctionGroup::Geometry],
            help: "Returns an interior ring of a polygon, counting from 1.",
            parameters: ["geometry", "index"],
            implementation: |call| {
                let geometry = call.geometry(0)?;
                Ok(optional_geometry(zero_based(call, 1)?.and_then(|i| geometry.interior_ring(i))))
            }
        )?;
        register_function!(
            self,
            "geometry_n",
            groups: [FunctionGroup::Geometry],
            help: "Returns a part of a multi-part geometry, counting from 1.",
            parameters: ["geometry", "index"],
            implementation: |call| {
                let geometry = call.geometry(0)?;
                if !geometry.is_multipart() {
                    return Ok(Value::Null);
                }
                Ok(optional_geometry(zero_based(call, 1)?.and_then(|i| geometry.geometry_n(i))))
            }
        )?;
        register_function!(
            self,
            "is_closed",
            groups: [FunctionGroup::Geometry],
            help: "Returns true if a line is closed, false otherwise; null for other geometries.",
            parameters: ["geometry"],
            implementation: |call| {
                Ok(call.geometry(0)?.is_closed().map(Value::Bool).unwrap_or_default())
            }
        )
    }

    fn register_geometry_measurements(&self) -> Result<()> {
        register_function!(
            self,
            "area",
            groups: [FunctionGroup::Geometry],
            help: "Returns the planar area of a polygon geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                let geometry = call.geometry(0)?;
                Ok(if geometry.geometry_type() == GeometryType::Polygon {
                    Value::Double(geometry.area())
                } else {
                    Value::Null
                })
            }
        )?;
        register_function!(
            self,
            "perimeter",
            groups: [FunctionGroup::Geometry],
            help: "Returns the planar perimeter of a polygon geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                let geometry = call.geometry(0)?;
                Ok(if geometry.geometry_type() == GeometryType::Polygon {
                    Value::Double(geometry.perimeter())
                } else {
                    Value::Null
                })
            }
        )?;
        register_function!(
            self,
            "distance",
            groups: [FunctionGroup::Geometry],
            help: "Returns the planar distance between two point geometries.",
            parameters: ["geometry1", "geometry2"],
            implementation: |call| {
                let (first, second) = (call.geometry(0)?, call.geometry(1)?);
                match (single_point(&first), single_point(&second)) {
                    (Some(a), Some(b)) => Ok(Value::Double(a.distance(b))),
                    _ => Err(EvalError::new("Function `distance` requires two point geometries")),
                }
            }
        )?;
        register_function!(
            self,
            "bounds",
            groups: [FunctionGroup::Geometry],
            help: "Returns the bounding box of a geometry as a polygon.",
            parameters: ["geometry"],
            implementation: |call| {
                Ok(optional_geometry(call.geometry(0)?.bounding_box().map(|r| r.to_geometry())))
            }
        )?;

        type BoundsAccessor = fn(&crate::geometry::Rect) -> f64;
        let accessors: [(&str, &str, &str, BoundsAccessor); 6] = [
            (
                "bounds_width",
                "",
                "Returns the width of the bounding box of a geometry.",
                |r| r.width(),
            ),
            (
                "bounds_height",
                "",
                "Returns the height of the bounding box of a geometry.",
                |r| r.height(),
            ),
            ("x_min", "xmin", "Returns the minimum x coordinate of a geometry.", |r| r.x_min),
            ("x_max", "xmax", "Returns the maximum x coordinate of a geometry.", |r| r.x_max),
            ("y_min", "ymin", "Returns the minimum y coordinate of a geometry.", |r| r.y_min),
            ("y_max", "ymax", "Returns the maximum y coordinate of a geometry.", |r| r.y_max),
        ];
        for (name, alias, help, accessor) in accessors {
            let mut builder = FunctionBuilder::new(name, FunctionGroup::Geometry)
                .help(help)
                .parameter("geometry");
            if !alias.is_empty() {
                builder = builder.alias(alias);
            }
            builder
                .implementation(move |call| {
                    Ok(call
                        .geometry(0)?
                        .bounding_box()
                        .map(|r| Value::Double(accessor(&r)))
                        .unwrap_or_default())
                })
                .register_builtin(self)?;
        }
        Ok(())
    }

    fn register_geometry_transforms(&self) -> Result<()> {
        register_function!(
            self,
            "centroid",
            groups: [FunctionGroup::Geometry],
            help: "Returns the geometric center of a geometry.",
            parameters: ["geometry"],
            implementation: |call| {
                Ok(call.geometry(0)?.centroid().map(point_value).unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "reverse",
            groups: [FunctionGroup::Geometry],
            help: "Reverses the direction of a line.",
            parameters: ["geometry"],
            implementation: |call| {
                let geometry = call.geometry(0)?;
                Ok(match geometry.as_ref() {
                    Geometry::LineString(_) => Value::from(geometry.reversed()),
                    _ => Value::Null,
                })
            }
        )?;
        register_function!(
            self,
            "translate",
            groups: [FunctionGroup::Geometry],
            help: "Returns a translated version of a geometry.",
            parameters: ["geometry", "dx", "dy"],
            implementation: |call| {
                let (dx, dy) = (call.double(1)?, call.double(2)?);
                Ok(Value::from(call.geometry(0)?.translated(dx, dy)))
            }
        )
    }
}

fn point_or_centroid(geometry: &Geometry) -> Option<Point> {
    match geometry {
        Geometry::Point(Some(p)) => Some(*p),
        other => other.centroid(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::evaluator::{EvaluationContext, Expression, feature_context};
    use crate::feature::{Feature, Fields};

    const SQUARE: &str =
        "geom_from_wkt('Polygon ((0 0, 4 0, 4 4, 0 4, 0 0),(1 1, 2 1, 2 2, 1 2, 1 1))')";
    const LINE: &str = "geom_from_wkt('LineString (0 0, 3 4, 3 10)')";

    fn eval(text: &str) -> (Value, String) {
        let mut expression = Expression::new(text);
        let value = expression.evaluate(&mut EvaluationContext::new());
        (value, expression.eval_error_string())
    }

    fn eval_ok(text: &str) -> Value {
        let (value, error) = eval(text);
        assert_eq!(error, "", "{text}");
        value
    }

    fn eval_for(geometry: &str, text: &str) -> Value {
        let fields = Arc::new(Fields::from_names(["name"]));
        let feature = Feature::new(7, fields.clone())
            .with_attributes(vec![Value::from("a")])
            .with_geometry(Geometry::from_wkt(geometry).unwrap());
        let mut context = feature_context(feature, fields);
        let mut expression = Expression::new(text);
        let value = expression.evaluate(&mut context);
        assert_eq!(expression.eval_error_string(), "", "{text}");
        value
    }

    #[rstest]
    #[case("geom_to_wkt(make_point(2, 4))", "Point (2 4)")]
    #[case("geom_to_wkt(make_point(2, 4, 6))", "PointZ (2 4 6)")]
    #[case("geom_to_wkt(make_point(2, 4, 6, 8))", "PointZM (2 4 6 8)")]
    #[case("geom_to_wkt(make_point_m(2, 4, 8))", "PointM (2 4 8)")]
    #[case("geom_to_wkt(make_point(1.123456789, 2), 3)", "Point (1.123 2)")]
    #[case("geom_to_wkt(make_line(make_point(0, 0), make_point(1, 1)))", "LineString (0 0, 1 1)")]
    #[case(
        "geom_to_wkt(make_polygon(geom_from_wkt('LineString (0 0, 1 0, 1 1, 0 0)')))",
        "Polygon ((0 0, 1 0, 1 1, 0 0))"
    )]
    #[case("geom_to_wkt(start_point(geom_from_wkt('LineString (0 0, 3 4, 3 10)')))", "Point (0 0)")]
    #[case("geom_to_wkt(end_point(geom_from_wkt('LineString (0 0, 3 4, 3 10)')))", "Point (3 10)")]
    #[case("geom_to_wkt(point_n(geom_from_wkt('LineString (0 0, 3 4, 3 10)'), 2))", "Point (3 4)")]
    #[case("geom_to_wkt(reverse(geom_from_wkt('LineString (0 0, 3 4)')))", "LineString (3 4, 0 0)")]
    #[case("geom_to_wkt(translate(make_point(1, 1), 2, -1))", "Point (3 0)")]
    #[case("geom_to_wkt(centroid(geom_from_wkt('LineString (0 0, 4 0)')))", "Point (2 0)")]
    #[case(
        "geom_to_wkt(bounds(geom_from_wkt('LineString (1 2, 3 5)')))",
        "Polygon ((1 2, 3 2, 3 5, 1 5, 1 2))"
    )]
    #[case(
        "geom_to_wkt(geometry_n(geom_from_wkt('MultiPoint ((1 1),(2 2))'), 2))",
        "Point (2 2)"
    )]
    #[case("geom_to_wkt(geom_from_wkt('POINT EMPTY'))", "Point EMPTY")]
    fn test_geometry_wkt(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(eval_ok(text), Value::from(expected));
    }

    #[rstest]
    #[case(format!("area({SQUARE})"), Value::Double(15.0))]
    #[case(format!("perimeter({SQUARE})"), Value::Double(20.0))]
    #[case(format!("num_rings({SQUARE})"), Value::Int(2))]
    #[case(format!("num_interior_rings({SQUARE})"), Value::Int(1))]
    #[case(format!("num_points({SQUARE})"), Value::Int(10))]
    #[case(format!("length({LINE})"), Value::Double(11.0))]
    #[case(format!("area({LINE})"), Value::Null)]
    #[case(format!("is_closed({LINE})"), Value::Bool(false))]
    #[case(format!("is_closed({SQUARE})"), Value::Null)]
    #[case(format!("bounds_width({LINE})"), Value::Double(3.0))]
    #[case(format!("bounds_height({LINE})"), Value::Double(10.0))]
    #[case(format!("xmax({LINE})"), Value::Double(3.0))]
    #[case(format!("y_min({LINE})"), Value::Double(0.0))]
    #[case(format!("num_geometries({LINE})"), Value::Int(1))]
    #[case(format!("geometry_n({LINE}, 1)"), Value::Null)]
    #[case("x(make_point(3, 7))".to_string(), Value::Double(3.0))]
    #[case("y(geom_from_wkt('LineString (0 0, 0 4)'))".to_string(), Value::Double(2.0))]
    #[case("z(make_point(1, 2, 3))".to_string(), Value::Double(3.0))]
    #[case("m(make_point(1, 2))".to_string(), Value::Null)]
    #[case("distance(make_point(0, 0), make_point(3, 4))".to_string(), Value::Double(5.0))]
    #[case("geom_from_wkt('nonsense')".to_string(), Value::Null)]
    #[case("make_line(make_point(0, 0))".to_string(), Value::Null)]
    fn test_geometry_values(#[case] text: String, #[case] expected: Value) {
        assert_eq!(eval_ok(&text), expected);
    }

    #[test]
    fn test_geometry_errors() {
        assert_eq!(
            eval("make_point(1)"),
            (Value::Null, "Function make_point requires 2-4 arguments".to_string())
        );
        assert_eq!(
            eval(&format!("point_n({LINE}, 9)")),
            (Value::Null, "Point index is out of range".to_string())
        );
        assert_eq!(
            eval(&format!("point_n({LINE}, 0)")),
            (Value::Null, "Point index is out of range".to_string())
        );
    }

    #[test]
    fn test_interior_ring_n() {
        let ring = eval_ok(&format!("geom_to_wkt(interior_ring_n({SQUARE}, 1))"));
        assert_eq!(ring, Value::from("LineString (1 1, 2 1, 2 2, 1 2, 1 1)"));
        assert_eq!(eval_ok(&format!("interior_ring_n({SQUARE}, 2)")), Value::Null);
        let exterior = eval_ok(&format!("num_points(exterior_ring({SQUARE}))"));
        assert_eq!(exterior, Value::Int(5));
    }

    #[test]
    fn test_feature_geometry_functions() {
        assert_eq!(eval_for("Point (3 4)", "$x"), Value::Double(3.0));
        assert_eq!(eval_for("Point (3 4)", "$y"), Value::Double(4.0));
        assert_eq!(eval_for("LineString (0 0, 3 4)", "$x"), Value::Null);
        assert_eq!(eval_for("LineString (0 0, 3 4)", "$length"), Value::Double(5.0));
        assert_eq!(eval_for("LineString (0 0, 3 4)", "$x_at(-1)"), Value::Double(3.0));
        assert_eq!(eval_for("LineString (0 0, 3 4)", "y_at(0)"), Value::Double(0.0));
        assert_eq!(
            eval_for("Polygon ((0 0, 2 0, 2 2, 0 2, 0 0))", "$area"),
            Value::Double(4.0)
        );
        assert_eq!(
            eval_for("Polygon ((0 0, 2 0, 2 2, 0 2, 0 0))", "$perimeter"),
            Value::Double(8.0)
        );
        assert_eq!(
            eval_for("Point (1 2)", "geom_to_wkt($geometry)"),
            Value::from("Point (1 2)")
        );
        assert_eq!(eval_for("Point (1 2)", "$geometry IS NULL"), Value::Bool(false));
    }

    #[test]
    fn test_feature_geometry_without_feature_is_null() {
        assert_eq!(eval_ok("$geometry"), Value::Null);
        assert_eq!(eval_ok("$area"), Value::Null);
    }

    #[test]
    fn test_geometry_functions_need_geometry() {
        let expression = Expression::new("$area > 10");
        assert!(expression.needs_geometry());
        let expression = Expression::new("upper(\"name\")");
        assert!(!expression.needs_geometry());
    }
}
