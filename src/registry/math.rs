//! Math functions
//!
//! Numeric functions work on doubles. Logarithms of non-positive input
//! return null rather than NaN or infinity, and do so without an error.

use rand::Rng;
use std::f64::consts::{FRAC_PI_2, PI};

use super::builder::{FunctionBuilder, FunctionGroup};
use super::utils::single_point;
use super::{FunctionContext, FunctionRegistry};
use crate::core::{EvalError, EvalResult, Result, Value};
use crate::geometry::{Geometry, Point};
use crate::register_function;

impl FunctionRegistry {
    pub fn register_math_functions(&self) -> Result<()> {
        self.register_unary_math_functions()?;
        self.register_point_math_functions()?;
        self.register_logarithm_functions()?;
        self.register_round_function()?;
        self.register_random_functions()?;
        self.register_min_max_functions()?;
        self.register_clamp_function()?;
        self.register_scale_functions()?;
        self.register_pi_function()?;
        Ok(())
    }

    fn register_unary_math_functions(&self) -> Result<()> {
        let unary: [(&str, &str, &str, fn(f64) -> f64); 13] = [
            ("sqrt", "value", "Returns the square root of a value.", f64::sqrt),
            ("radians", "degrees", "Converts degrees to radians.", f64::to_radians),
            ("degrees", "radians", "Converts radians to degrees.", f64::to_degrees),
            ("abs", "value", "Returns the absolute value of a number.", f64::abs),
            ("cos", "angle", "Returns the cosine of an angle in radians.", f64::cos),
            ("sin", "angle", "Returns the sine of an angle in radians.", f64::sin),
            ("tan", "angle", "Returns the tangent of an angle in radians.", f64::tan),
            ("asin", "value", "Returns the inverse sine of a value in radians.", f64::asin),
            ("acos", "value", "Returns the inverse cosine of a value in radians.", f64::acos),
            ("atan", "value", "Returns the inverse tangent of a value in radians.", f64::atan),
            ("exp", "value", "Returns the exponential of a value.", f64::exp),
            ("floor", "value", "Rounds a number downwards.", f64::floor),
            ("ceil", "value", "Rounds a number upwards.", f64::ceil),
        ];
        for (name, parameter, help, operation) in unary {
            let builder = FunctionBuilder::new(name, FunctionGroup::Math).help(help);
            // floor and ceil take a bare argument
            let builder = if matches!(name, "floor" | "ceil") {
                builder.arity(1)
            } else {
                builder.parameter(parameter)
            };
            builder
                .implementation(move |call| Ok(Value::Double(operation(call.double(0)?))))
                .register_builtin(self)?;
        }

        register_function!(
            self,
            "atan2",
            groups: [FunctionGroup::Math],
            help: "Returns the inverse tangent of dy/dx, using the signs of both to pick the quadrant.",
            parameters: ["dx", "dy"],
            implementation: |call| {
                let y = call.double(0)?;
                let x = call.double(1)?;
                Ok(Value::Double(y.atan2(x)))
            }
        )
    }

    fn register_point_math_functions(&self) -> Result<()> {
        FunctionBuilder::new("azimuth", FunctionGroup::Math)
            .group(FunctionGroup::Geometry)
            .help("Returns the north-based azimuth in radians from point_a to point_b.")
            .parameter("point_a")
            .parameter("point_b")
            .implementation(azimuth)
            .register_builtin(self)?;

        FunctionBuilder::new("inclination", FunctionGroup::Math)
            .group(FunctionGroup::Geometry)
            .help("Returns the inclination in degrees measured from the zenith to point_b.")
            .parameter("point_a")
            .parameter("point_b")
            .implementation(inclination)
            .register_builtin(self)?;

        FunctionBuilder::new("project", FunctionGroup::Geometry)
            .help("Returns a point projected from a start point using a distance, azimuth and elevation in radians.")
            .parameter("point")
            .parameter("distance")
            .parameter("azimuth")
            .optional_parameter("elevation", FRAC_PI_2)
            .implementation(project)
            .register_builtin(self)
    }

    fn register_logarithm_functions(&self) -> Result<()> {
        register_function!(
            self,
            "ln",
            groups: [FunctionGroup::Math],
            help: "Returns the natural logarithm of a value.",
            parameters: ["value"],
            implementation: |call| {
                let x = call.double(0)?;
                Ok(if x <= 0.0 { Value::Null } else { Value::Double(x.ln()) })
            }
        )?;
        register_function!(
            self,
            "log10",
            groups: [FunctionGroup::Math],
            help: "Returns the base 10 logarithm of a value.",
            parameters: ["value"],
            implementation: |call| {
                let x = call.double(0)?;
                Ok(if x <= 0.0 { Value::Null } else { Value::Double(x.log10()) })
            }
        )?;
        register_function!(
            self,
            "log",
            groups: [FunctionGroup::Math],
            help: "Returns the logarithm of a value in the given base.",
            parameters: ["base", "value"],
            implementation: |call| {
                let base = call.double(0)?;
                let x = call.double(1)?;
                if x <= 0.0 || base <= 0.0 {
                    return Ok(Value::Null);
                }
                Ok(Value::Double(x.ln() / base.ln()))
            }
        )
    }

    fn register_round_function(&self) -> Result<()> {
        register_function!(
            self,
            "round",
            groups: [FunctionGroup::Math],
            help: "Rounds a number to a number of decimal places, halves away from zero.",
            parameters: ["value", "places" = 0],
            implementation: |call| {
                let number = call.double(0)?;
                let places = call.int(1)?;
                if places == 0 {
                    return Ok(Value::Int(number.round() as i64));
                }
                Ok(Value::Double(round_to(number, places)))
            }
        )
    }

    fn register_random_functions(&self) -> Result<()> {
        FunctionBuilder::new("rand", FunctionGroup::Math)
            .help("Returns a random integer between min and max, inclusive.")
            .parameter("min")
            .parameter("max")
            .is_static(false)
            .implementation(|call| {
                let min = call.int(0)?;
                let max = call.int(1)?;
                if max < min {
                    return Ok(Value::Null);
                }
                Ok(Value::Int(rand::thread_rng().gen_range(min..=max)))
            })
            .register_builtin(self)?;

        FunctionBuilder::new("randf", FunctionGroup::Math)
            .help("Returns a random float between min and max.")
            .optional_parameter("min", 0.0)
            .optional_parameter("max", 1.0)
            .is_static(false)
            .implementation(|call| {
                let min = call.double(0)?;
                let max = call.double(1)?;
                if max < min {
                    return Ok(Value::Null);
                }
                if max == min {
                    return Ok(Value::Double(min));
                }
                Ok(Value::Double(rand::thread_rng().gen_range(min..max)))
            })
            .register_builtin(self)
    }

    fn register_min_max_functions(&self) -> Result<()> {
        // Not null-handling: any null argument makes the whole call null
        register_function!(
            self,
            "max",
            groups: [FunctionGroup::Math],
            help: "Returns the largest value in a set of values.",
            arity: -1,
            implementation: |call| fold_doubles(call, |best, candidate| candidate > best)
        )?;
        register_function!(
            self,
            "min",
            groups: [FunctionGroup::Math],
            help: "Returns the smallest value in a set of values.",
            arity: -1,
            implementation: |call| fold_doubles(call, |best, candidate| candidate < best)
        )
    }

    fn register_clamp_function(&self) -> Result<()> {
        register_function!(
            self,
            "clamp",
            groups: [FunctionGroup::Math],
            help: "Restricts an input value to a specified range.",
            parameters: ["min", "value", "max"],
            implementation: |call| {
                let min = call.double(0)?;
                let value = call.double(1)?;
                let max = call.double(2)?;
                let clamped = if value <= min {
                    min
                } else if value >= max {
                    max
                } else {
                    value
                };
                Ok(Value::Double(clamped))
            }
        )
    }

    fn register_scale_functions(&self) -> Result<()> {
        register_function!(
            self,
            "scale_linear",
            groups: [FunctionGroup::Math],
            help: "Transforms a value from an input domain to an output range using linear interpolation.",
            arity: 5,
            implementation: |call| {
                let value = call.double(0)?;
                let (domain_min, domain_max) = (call.double(1)?, call.double(2)?);
                let (range_min, range_max) = (call.double(3)?, call.double(4)?);
                if domain_min >= domain_max {
                    return Err(EvalError::new("Domain max must be greater than domain min"));
                }
                if value >= domain_max {
                    return Ok(Value::Double(range_max));
                }
                if value <= domain_min {
                    return Ok(Value::Double(range_min));
                }
                let slope = (range_max - range_min) / (domain_max - domain_min);
                let intercept = range_min - domain_min * slope;
                Ok(Value::Double(slope * value + intercept))
            }
        )?;
        register_function!(
            self,
            "scale_exp",
            groups: [FunctionGroup::Math],
            help: "Transforms a value from an input domain to an output range using an exponential curve.",
            arity: 6,
            implementation: |call| {
                let value = call.double(0)?;
                let (domain_min, domain_max) = (call.double(1)?, call.double(2)?);
                let (range_min, range_max) = (call.double(3)?, call.double(4)?);
                let exponent = call.double(5)?;
                if domain_min >= domain_max {
                    return Err(EvalError::new("Domain max must be greater than domain min"));
                }
                if exponent <= 0.0 {
                    return Err(EvalError::new("Exponent must be greater than 0"));
                }
                if value >= domain_max {
                    return Ok(Value::Double(range_max));
                }
                if value <= domain_min {
                    return Ok(Value::Double(range_min));
                }
                let scaled = ((range_max - range_min) / (domain_max - domain_min).powf(exponent))
                    * (value - domain_min).powf(exponent)
                    + range_min;
                Ok(Value::Double(scaled))
            }
        )
    }

    fn register_pi_function(&self) -> Result<()> {
        register_function!(
            self,
            "pi",
            groups: [FunctionGroup::Math],
            help: "Returns the value of pi.",
            arity: 0,
            aliases: ["$pi"],
            implementation: |_| Ok(Value::Double(PI))
        )
    }
}

/// Round half away from zero at `places` decimals, on the scaled double
fn round_to(number: f64, places: i64) -> f64 {
    let exponent = places.clamp(-308, 308) as i32;
    if exponent < 0 {
        let scaler = 10f64.powi(-exponent);
        (number / scaler).round() * scaler
    } else {
        let scaler = 10f64.powi(exponent);
        (number * scaler).round() / scaler
    }
}

fn fold_doubles(call: &FunctionContext<'_>, better: fn(f64, f64) -> bool) -> EvalResult<Value> {
    let mut values = call.values();
    let Some(first) = values.next() else {
        return Ok(Value::Null);
    };
    let mut best = first.to_double()?;
    for value in values {
        let candidate = value.to_double()?;
        if better(best, candidate) {
            best = candidate;
        }
    }
    Ok(Value::Double(best))
}

fn two_points(call: &FunctionContext<'_>, message: &str) -> EvalResult<(Point, Point)> {
    let first = call.geometry(0)?;
    let second = call.geometry(1)?;
    match (single_point(&first), single_point(&second)) {
        (Some(a), Some(b)) => Ok((*a, *b)),
        _ => Err(EvalError::new(message)),
    }
}

fn azimuth(call: &mut FunctionContext<'_>) -> EvalResult<Value> {
    let (a, b) = two_points(call, "Function `azimuth` requires two points as arguments.")?;
    let dx = b.x - a.x;
    let dy = b.y - a.y;

    let angle = if a.x == b.x {
        if a.y > b.y { PI } else { 0.0 }
    } else if a.y == b.y {
        if a.x < b.x { FRAC_PI_2 } else { PI + FRAC_PI_2 }
    } else if a.x < b.x {
        if a.y < b.y {
            (dx.abs() / dy.abs()).atan()
        } else {
            (dy.abs() / dx.abs()).atan() + FRAC_PI_2
        }
    } else if a.y > b.y {
        (dx.abs() / dy.abs()).atan() + PI
    } else {
        (dy.abs() / dx.abs()).atan() + PI + FRAC_PI_2
    };
    Ok(Value::Double(angle))
}

fn inclination(call: &mut FunctionContext<'_>) -> EvalResult<Value> {
    let (a, b) = two_points(call, "Function 'inclination' requires two points as arguments.")?;
    let dz = b.z.unwrap_or(0.0) - a.z.unwrap_or(0.0);
    let distance = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2) + dz.powi(2)).sqrt();
    if distance.abs() < 1e-12 {
        return Ok(Value::Double(90.0));
    }
    Ok(Value::Double((dz / distance).acos().to_degrees()))
}

fn project(call: &mut FunctionContext<'_>) -> EvalResult<Value> {
    let geometry = call.geometry(0)?;
    let Some(origin) = single_point(&geometry) else {
        return Err(EvalError::new("'project' requires a point geometry"));
    };
    let distance = call.double(1)?;
    let azimuth = call.double(2)?;
    let elevation = call.double(3)?;

    let flat = (elevation - FRAC_PI_2).abs() < 1e-12;
    let mut projected = if origin.z.is_none() && flat {
        Point::new(
            origin.x + distance * azimuth.sin(),
            origin.y + distance * azimuth.cos(),
        )
    } else {
        let horizontal = distance * elevation.sin();
        Point::new(
            origin.x + horizontal * azimuth.sin(),
            origin.y + horizontal * azimuth.cos(),
        )
        .with_z(origin.z.unwrap_or(0.0) + distance * elevation.cos())
    };
    projected.m = origin.m;
    Ok(Value::from(Geometry::from(projected)))
}

#[cfg(test)]
mod tests {
    use crate::core::Value;
    use crate::evaluator::{EvaluationContext, Expression};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn eval(text: &str) -> Value {
        let mut expression = Expression::new(text);
        assert!(expression.is_valid(), "{}", expression.parser_error_string());
        let value = expression.evaluate(&mut EvaluationContext::new());
        assert!(!expression.has_eval_error(), "{}", expression.eval_error_string());
        value
    }

    fn eval_error(text: &str) -> String {
        let mut expression = Expression::new(text);
        let value = expression.evaluate(&mut EvaluationContext::new());
        assert_eq!(value, Value::Null);
        expression.eval_error_string()
    }

    #[rstest]
    #[case("sqrt(16)", Value::Double(4.0))]
    #[case("abs(-3)", Value::Double(3.0))]
    #[case("floor(4.9)", Value::Double(4.0))]
    #[case("ceil(4.1)", Value::Double(5.0))]
    #[case("round(2.345, 2)", Value::Double(2.35))]
    #[case("round(1.005, 2)", Value::Double(1.0))]
    #[case("round(-1.005, 2)", Value::Double(-1.0))]
    #[case("round(0.125, 2)", Value::Double(0.13))]
    #[case("round(-2.5)", Value::Int(-3))]
    #[case("round(1234.5678, -2)", Value::Double(1200.0))]
    #[case("max(1, 3.5, 2)", Value::Double(3.5))]
    #[case("min(4, 2, 8)", Value::Double(2.0))]
    #[case("clamp(1, 5, 3)", Value::Double(3.0))]
    #[case("clamp(1, -2, 3)", Value::Double(1.0))]
    #[case("scale_linear(5, 0, 10, 0, 100)", Value::Double(50.0))]
    #[case("scale_linear(11, 0, 10, 0, 100)", Value::Double(100.0))]
    #[case("scale_exp(5, 0, 10, 0, 100, 2)", Value::Double(25.0))]
    #[case("log(2, 8)", Value::Double(3.0))]
    #[case("log10(100)", Value::Double(2.0))]
    fn test_math(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(eval(text), expected);
    }

    #[rstest]
    #[case("ln(0)")]
    #[case("log10(-1)")]
    #[case("log(10, 0)")]
    #[case("log(0, 10)")]
    #[case("min(3, NULL, 1)")]
    #[case("max(NULL, 2)")]
    #[case("rand(5, 1)")]
    fn test_null_results(#[case] text: &str) {
        assert_eq!(eval(text), Value::Null);
    }

    #[test]
    fn test_pi_alias() {
        assert_eq!(eval("pi()"), eval("$pi"));
    }

    #[test]
    fn test_rand_is_inclusive() {
        for _ in 0..20 {
            let value = eval("rand(1, 2)").to_int().unwrap();
            assert!((1..=2).contains(&value));
        }
        let value = eval("randf(2, 3)").to_double().unwrap();
        assert!((2.0..3.0).contains(&value));
    }

    #[test]
    fn test_scale_errors() {
        assert_eq!(
            eval_error("scale_linear(5, 10, 0, 0, 100)"),
            "Domain max must be greater than domain min"
        );
        assert_eq!(
            eval_error("scale_exp(5, 0, 10, 0, 100, 0)"),
            "Exponent must be greater than 0"
        );
    }

    #[rstest]
    #[case("azimuth(make_point(0, 0), make_point(0, 1))", 0.0)]
    #[case("azimuth(make_point(0, 0), make_point(1, 0))", 90.0)]
    #[case("azimuth(make_point(0, 0), make_point(0, -1))", 180.0)]
    #[case("azimuth(make_point(0, 0), make_point(-1, 0))", 270.0)]
    #[case("azimuth(make_point(0, 0), make_point(1, 1))", 45.0)]
    #[case("azimuth(make_point(0, 0), make_point(-1, -1))", 225.0)]
    fn test_azimuth(#[case] text: &str, #[case] degrees: f64) {
        let radians = eval(text).to_double().unwrap();
        assert!((radians.to_degrees() - degrees).abs() < 1e-9, "{text}: {radians}");
    }

    #[test]
    fn test_azimuth_requires_points() {
        assert_eq!(
            eval_error("azimuth(make_line(make_point(0, 0), make_point(1, 1)), make_point(0, 1))"),
            "Function `azimuth` requires two points as arguments."
        );
    }

    #[test]
    fn test_project_and_inclination() {
        assert_eq!(
            eval("geom_to_wkt(project(make_point(1, 2), 3, radians(90)))"),
            Value::from("Point (4 2)")
        );
        let angle = eval("inclination(make_point(0, 0, 0), make_point(0, 0, 10))")
            .to_double()
            .unwrap();
        assert!(angle.abs() < 1e-9);
        assert_eq!(
            eval("inclination(make_point(1, 1, 1), make_point(1, 1, 1))"),
            Value::Double(90.0)
        );
        assert_eq!(
            eval_error("project(make_line(make_point(0, 0), make_point(1, 1)), 1, 0)"),
            "'project' requires a point geometry"
        );
    }
}
