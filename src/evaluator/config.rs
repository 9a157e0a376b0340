//! Expression handle configuration

use crate::geometry::{AreaUnit, DistanceUnit};
use crate::parser::ParserConfig;

/// Configuration shared by expression handles
///
/// ```rust
/// use feature_expression::evaluator::ExpressionConfig;
///
/// let config = ExpressionConfig::default()
///     .with_max_recursion_depth(64)
///     .with_retry_parse_on_prepare(false);
/// assert_eq!(config.max_recursion_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionConfig {
    /// Maximum nesting of function calls during evaluation. Default: 256
    pub max_recursion_depth: usize,

    /// Re-parse at prepare time when the constructor-time parse failed,
    /// picking up functions registered since. Default: true
    pub retry_parse_on_prepare: bool,

    /// Unit for distances returned by `$length` and friends. Default: meters
    pub distance_unit: DistanceUnit,

    /// Unit for areas returned by `$area`. Default: square meters
    pub area_unit: AreaUnit,

    /// Parser limits
    pub parser: ParserConfig,
}

impl ExpressionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_retry_parse_on_prepare(mut self, retry: bool) -> Self {
        self.retry_parse_on_prepare = retry;
        self
    }

    pub fn with_distance_unit(mut self, unit: DistanceUnit) -> Self {
        self.distance_unit = unit;
        self
    }

    pub fn with_area_unit(mut self, unit: AreaUnit) -> Self {
        self.area_unit = unit;
        self
    }

    pub fn with_parser_max_depth(mut self, depth: usize) -> Self {
        self.parser.max_depth = depth;
        self
    }

    /// Configuration for unit tests: shallow limits so runaway recursion fails fast
    pub fn for_testing() -> Self {
        Self {
            max_recursion_depth: 32,
            parser: ParserConfig { max_depth: 32 },
            ..Self::default()
        }
    }
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 256,
            retry_parse_on_prepare: true,
            distance_unit: DistanceUnit::Meters,
            area_unit: AreaUnit::SquareMeters,
            parser: ParserConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExpressionConfig::default();
        assert_eq!(config.max_recursion_depth, 256);
        assert!(config.retry_parse_on_prepare);
        assert_eq!(config.parser.max_depth, 128);
        assert_eq!(config.distance_unit, DistanceUnit::Meters);
    }

    #[test]
    fn test_builders() {
        let config = ExpressionConfig::new()
            .with_distance_unit(DistanceUnit::Kilometers)
            .with_area_unit(AreaUnit::SquareKilometers)
            .with_parser_max_depth(10);
        assert_eq!(config.distance_unit, DistanceUnit::Kilometers);
        assert_eq!(config.area_unit, AreaUnit::SquareKilometers);
        assert_eq!(config.parser.max_depth, 10);
    }
}
