//! Helpers shared by the built-in function groups

use regex::Regex;
use std::sync::Arc;

use crate::core::{EvalError, EvalResult};
use crate::evaluator::Expression;
use crate::geometry::{DistanceArea, Geometry, PlanarDistanceArea, Point};

/// Compile `pattern`, reporting failures the way the string functions do
pub(crate) fn compile_regex(pattern: &str) -> EvalResult<Regex> {
    Regex::new(pattern)
        .map_err(|error| EvalError::new(format!("Invalid regular expression '{pattern}': {error}")))
}

/// The parent expression's calculator, or a planar one in its distance units
pub(crate) fn measurer(parent: &Expression) -> Arc<dyn DistanceArea> {
    match parent.geom_calculator() {
        Some(calculator) => Arc::clone(calculator),
        None => Arc::new(PlanarDistanceArea::new(parent.distance_units())),
    }
}

/// The single point of a point geometry
pub(crate) fn single_point(geometry: &Geometry) -> Option<&Point> {
    match geometry {
        Geometry::Point(point) => point.as_ref(),
        Geometry::MultiPoint(points) if points.len() == 1 => points.first(),
        _ => None,
    }
}

/// Resolve a 1-based position, counting from the end when negative
pub(crate) fn position(len: usize, pos: i64) -> Option<usize> {
    let len = len as i64;
    let index = if pos > 0 { pos - 1 } else { len + pos };
    (pos != 0 && (0..len).contains(&index)).then_some(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3, 1, Some(0))]
    #[case(3, 3, Some(2))]
    #[case(3, 4, None)]
    #[case(3, -1, Some(2))]
    #[case(3, -3, Some(0))]
    #[case(3, -4, None)]
    #[case(3, 0, None)]
    #[case(0, 1, None)]
    fn test_position(#[case] len: usize, #[case] pos: i64, #[case] expected: Option<usize>) {
        assert_eq!(position(len, pos), expected);
    }

    #[test]
    fn test_invalid_regex_message() {
        let error = compile_regex("(").unwrap_err();
        assert!(error.message().starts_with("Invalid regular expression '(':"));
    }
}
