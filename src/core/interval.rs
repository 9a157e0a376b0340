//! Time interval value type

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// A duration measured in seconds, with calendar-style accessors.
///
/// Years are 365.25 days and months are 30 days, so the accessors are
/// approximations for anything longer than a week.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Interval {
    seconds: f64,
}

impl Interval {
    pub const SECONDS_PER_MINUTE: f64 = 60.0;
    pub const SECONDS_PER_HOUR: f64 = 3_600.0;
    pub const SECONDS_PER_DAY: f64 = 86_400.0;
    pub const SECONDS_PER_WEEK: f64 = 604_800.0;
    pub const SECONDS_PER_MONTH: f64 = 2_592_000.0;
    pub const SECONDS_PER_YEAR: f64 = 31_557_600.0;

    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn minutes(&self) -> f64 {
        self.seconds / Self::SECONDS_PER_MINUTE
    }

    pub fn hours(&self) -> f64 {
        self.seconds / Self::SECONDS_PER_HOUR
    }

    pub fn days(&self) -> f64 {
        self.seconds / Self::SECONDS_PER_DAY
    }

    pub fn weeks(&self) -> f64 {
        self.seconds / Self::SECONDS_PER_WEEK
    }

    pub fn months(&self) -> f64 {
        self.seconds / Self::SECONDS_PER_MONTH
    }

    pub fn years(&self) -> f64 {
        self.seconds / Self::SECONDS_PER_YEAR
    }

    /// Parse text such as `"1 day 2 hours"` or `"3.5 weeks"`.
    ///
    /// A bare number is read as seconds. Returns `None` when no component is
    /// recognised.
    pub fn parse(text: &str) -> Option<Self> {
        static COMPONENT: Lazy<Regex> = Lazy::new(|| {
            Regex::new(
                r"(?i)([-+]?\d+(?:\.\d+)?)\s*(years?|months?|weeks?|days?|hours?|minutes?|mins?|seconds?|secs?)\b",
            )
            .expect("interval component pattern is valid")
        });

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(seconds) = trimmed.parse::<f64>() {
            return Some(Self::from_seconds(seconds));
        }

        let mut seconds = 0.0;
        let mut matched = false;
        for capture in COMPONENT.captures_iter(trimmed) {
            let amount: f64 = capture[1].parse().ok()?;
            let unit = capture[2].to_ascii_lowercase();
            let factor = if unit.starts_with("year") {
                Self::SECONDS_PER_YEAR
            } else if unit.starts_with("month") {
                Self::SECONDS_PER_MONTH
            } else if unit.starts_with("week") {
                Self::SECONDS_PER_WEEK
            } else if unit.starts_with("day") {
                Self::SECONDS_PER_DAY
            } else if unit.starts_with("hour") {
                Self::SECONDS_PER_HOUR
            } else if unit.starts_with("min") {
                Self::SECONDS_PER_MINUTE
            } else {
                1.0
            };
            seconds += amount * factor;
            matched = true;
        }
        matched.then(|| Self::from_seconds(seconds))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds != 0.0 && (self.seconds % Self::SECONDS_PER_DAY) == 0.0 {
            write!(f, "{} days", self.days())
        } else {
            write!(f, "{} seconds", self.seconds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_components() {
        let interval = Interval::parse("1 day 2 hours").unwrap();
        assert_eq!(interval.seconds(), 86_400.0 + 7_200.0);

        let interval = Interval::parse("2 weeks").unwrap();
        assert_eq!(interval.weeks(), 2.0);
    }

    #[test]
    fn test_parse_bare_number_is_seconds() {
        assert_eq!(Interval::parse("90").unwrap().minutes(), 1.5);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Interval::parse("soon").is_none());
        assert!(Interval::parse("").is_none());
    }

    #[test]
    fn test_year_is_julian() {
        assert_eq!(Interval::from_seconds(Interval::SECONDS_PER_YEAR).days(), 365.25);
    }
}
