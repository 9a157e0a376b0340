//! Measurement units and the distance/area calculator seam

use std::fmt;
use std::str::FromStr;

use super::Geometry;

/// Linear units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Feet,
    NauticalMiles,
    Yards,
    Miles,
    Degrees,
    Centimeters,
    Millimeters,
    /// Native units of the data, no conversion applied
    #[default]
    Unknown,
}

impl DistanceUnit {
    /// Size of one unit in meters
    pub fn to_meters(self) -> Option<f64> {
        Some(match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Kilometers => 1_000.0,
            DistanceUnit::Feet => 0.3048,
            DistanceUnit::NauticalMiles => 1_852.0,
            DistanceUnit::Yards => 0.9144,
            DistanceUnit::Miles => 1_609.344,
            DistanceUnit::Degrees => 111_319.490_793_273_58,
            DistanceUnit::Centimeters => 0.01,
            DistanceUnit::Millimeters => 0.001,
            DistanceUnit::Unknown => return None,
        })
    }

    /// Multiplier converting a value in `self` into `to`; 1.0 when either is unknown
    pub fn factor_to(self, to: DistanceUnit) -> f64 {
        match (self.to_meters(), to.to_meters()) {
            (Some(from), Some(to)) => from / to,
            _ => 1.0,
        }
    }

    /// The area unit measuring squares of this unit
    pub fn area_unit(self) -> AreaUnit {
        match self {
            DistanceUnit::Meters => AreaUnit::SquareMeters,
            DistanceUnit::Kilometers => AreaUnit::SquareKilometers,
            DistanceUnit::Feet => AreaUnit::SquareFeet,
            DistanceUnit::NauticalMiles => AreaUnit::SquareNauticalMiles,
            DistanceUnit::Yards => AreaUnit::SquareYards,
            DistanceUnit::Miles => AreaUnit::SquareMiles,
            DistanceUnit::Degrees => AreaUnit::SquareDegrees,
            DistanceUnit::Centimeters => AreaUnit::SquareCentimeters,
            DistanceUnit::Millimeters => AreaUnit::SquareMillimeters,
            DistanceUnit::Unknown => AreaUnit::Unknown,
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceUnit::Meters => "meters",
            DistanceUnit::Kilometers => "km",
            DistanceUnit::Feet => "feet",
            DistanceUnit::NauticalMiles => "nautical miles",
            DistanceUnit::Yards => "yd",
            DistanceUnit::Miles => "mi",
            DistanceUnit::Degrees => "degrees",
            DistanceUnit::Centimeters => "cm",
            DistanceUnit::Millimeters => "mm",
            DistanceUnit::Unknown => "<unknown>",
        };
        f.write_str(name)
    }
}

impl FromStr for DistanceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "meters" | "m" => DistanceUnit::Meters,
            "km" | "kilometers" => DistanceUnit::Kilometers,
            "feet" | "ft" => DistanceUnit::Feet,
            "nautical miles" | "nm" => DistanceUnit::NauticalMiles,
            "yd" | "yards" => DistanceUnit::Yards,
            "mi" | "miles" => DistanceUnit::Miles,
            "degrees" | "deg" => DistanceUnit::Degrees,
            "cm" | "centimeters" => DistanceUnit::Centimeters,
            "mm" | "millimeters" => DistanceUnit::Millimeters,
            "<unknown>" | "unknown" => DistanceUnit::Unknown,
            other => return Err(format!("Unknown distance unit '{other}'")),
        })
    }
}

/// Areal units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AreaUnit {
    SquareMeters,
    SquareKilometers,
    SquareFeet,
    SquareYards,
    SquareMiles,
    Hectares,
    Acres,
    SquareNauticalMiles,
    SquareDegrees,
    SquareCentimeters,
    SquareMillimeters,
    #[default]
    Unknown,
}

impl AreaUnit {
    /// Size of one unit in square meters
    pub fn to_square_meters(self) -> Option<f64> {
        Some(match self {
            AreaUnit::SquareMeters => 1.0,
            AreaUnit::SquareKilometers => 1_000_000.0,
            AreaUnit::SquareFeet => 0.092_903_04,
            AreaUnit::SquareYards => 0.836_127_36,
            AreaUnit::SquareMiles => 2_589_988.110_336,
            AreaUnit::Hectares => 10_000.0,
            AreaUnit::Acres => 4_046.856_422_4,
            AreaUnit::SquareNauticalMiles => 3_429_904.0,
            AreaUnit::SquareDegrees => 12_392_029_030.5,
            AreaUnit::SquareCentimeters => 0.000_1,
            AreaUnit::SquareMillimeters => 0.000_001,
            AreaUnit::Unknown => return None,
        })
    }

    pub fn factor_to(self, to: AreaUnit) -> f64 {
        match (self.to_square_meters(), to.to_square_meters()) {
            (Some(from), Some(to)) => from / to,
            _ => 1.0,
        }
    }
}

impl fmt::Display for AreaUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AreaUnit::SquareMeters => "m2",
            AreaUnit::SquareKilometers => "km2",
            AreaUnit::SquareFeet => "ft2",
            AreaUnit::SquareYards => "y2",
            AreaUnit::SquareMiles => "mi2",
            AreaUnit::Hectares => "ha",
            AreaUnit::Acres => "ac",
            AreaUnit::SquareNauticalMiles => "nm2",
            AreaUnit::SquareDegrees => "deg2",
            AreaUnit::SquareCentimeters => "cm2",
            AreaUnit::SquareMillimeters => "mm2",
            AreaUnit::Unknown => "<unknown>",
        };
        f.write_str(name)
    }
}

impl FromStr for AreaUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "m2" => AreaUnit::SquareMeters,
            "km2" => AreaUnit::SquareKilometers,
            "ft2" => AreaUnit::SquareFeet,
            "y2" => AreaUnit::SquareYards,
            "mi2" => AreaUnit::SquareMiles,
            "ha" => AreaUnit::Hectares,
            "ac" => AreaUnit::Acres,
            "nm2" => AreaUnit::SquareNauticalMiles,
            "deg2" => AreaUnit::SquareDegrees,
            "cm2" => AreaUnit::SquareCentimeters,
            "mm2" => AreaUnit::SquareMillimeters,
            "<unknown>" | "unknown" => AreaUnit::Unknown,
            other => return Err(format!("Unknown area unit '{other}'")),
        })
    }
}

/// Unit-aware measurement of geometries.
///
/// Measurements are returned in [`DistanceArea::length_units`] /
/// [`DistanceArea::area_units`] and converted on request.
pub trait DistanceArea: Send + Sync + fmt::Debug {
    fn measure_area(&self, geometry: &Geometry) -> f64;

    fn measure_length(&self, geometry: &Geometry) -> f64;

    fn measure_perimeter(&self, geometry: &Geometry) -> f64;

    fn length_units(&self) -> DistanceUnit;

    fn area_units(&self) -> AreaUnit {
        self.length_units().area_unit()
    }

    fn convert_length_measurement(&self, length: f64, to: DistanceUnit) -> f64 {
        length * self.length_units().factor_to(to)
    }

    fn convert_area_measurement(&self, area: f64, to: AreaUnit) -> f64 {
        area * self.area_units().factor_to(to)
    }
}

/// Cartesian measurement in the geometry's own coordinate units
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarDistanceArea {
    source_units: DistanceUnit,
}

impl PlanarDistanceArea {
    pub fn new(source_units: DistanceUnit) -> Self {
        Self { source_units }
    }
}

impl DistanceArea for PlanarDistanceArea {
    fn measure_area(&self, geometry: &Geometry) -> f64 {
        geometry.area()
    }

    fn measure_length(&self, geometry: &Geometry) -> f64 {
        geometry.length()
    }

    fn measure_perimeter(&self, geometry: &Geometry) -> f64 {
        geometry.perimeter()
    }

    fn length_units(&self) -> DistanceUnit {
        self.source_units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_conversion() {
        let calc = PlanarDistanceArea::new(DistanceUnit::Meters);
        assert_eq!(calc.convert_length_measurement(2_500.0, DistanceUnit::Kilometers), 2.5);
        assert_eq!(calc.convert_length_measurement(7.0, DistanceUnit::Unknown), 7.0);
    }

    #[test]
    fn test_area_conversion() {
        let calc = PlanarDistanceArea::new(DistanceUnit::Meters);
        assert_eq!(calc.convert_area_measurement(20_000.0, AreaUnit::Hectares), 2.0);
    }

    #[test]
    fn test_unit_names_round_trip() {
        for unit in [DistanceUnit::Kilometers, DistanceUnit::NauticalMiles, DistanceUnit::Unknown] {
            assert_eq!(unit.to_string().parse::<DistanceUnit>().unwrap(), unit);
        }
        assert_eq!("ha".parse::<AreaUnit>().unwrap(), AreaUnit::Hectares);
    }
}
