//! Dynamic value type produced and consumed by expressions

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::error::{EvalError, EvalResult};
use super::interval::Interval;
use crate::feature::Feature;
use crate::geometry::Geometry;
use crate::layer::VectorLayer;

/// Insertion-ordered string-keyed map value
pub type ValueMap = IndexMap<String, Value>;

/// Any value an expression can produce
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value; a legitimate result, not an error
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Interval(Interval),
    Array(Vec<Value>),
    Map(ValueMap),
    Geometry(Arc<Geometry>),
    Feature(Arc<Feature>),
    Layer(Arc<dyn VectorLayer>),
}

/// Three-valued logic result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tvl {
    False,
    True,
    Unknown,
}

impl Tvl {
    pub fn to_value(self) -> Value {
        match self {
            Tvl::True => Value::Bool(true),
            Tvl::False => Value::Bool(false),
            Tvl::Unknown => Value::Null,
        }
    }

    pub fn and(self, other: Tvl) -> Tvl {
        match (self, other) {
            (Tvl::False, _) | (_, Tvl::False) => Tvl::False,
            (Tvl::True, Tvl::True) => Tvl::True,
            _ => Tvl::Unknown,
        }
    }

    pub fn or(self, other: Tvl) -> Tvl {
        match (self, other) {
            (Tvl::True, _) | (_, Tvl::True) => Tvl::True,
            (Tvl::False, Tvl::False) => Tvl::False,
            _ => Tvl::Unknown,
        }
    }

    pub fn not(self) -> Tvl {
        match self {
            Tvl::True => Tvl::False,
            Tvl::False => Tvl::True,
            Tvl::Unknown => Tvl::Unknown,
        }
    }
}

impl From<bool> for Tvl {
    fn from(value: bool) -> Self {
        if value { Tvl::True } else { Tvl::False }
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
        .ok()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .or_else(|| parse_datetime(text).map(|dt| dt.time()))
}

/// Shortest text that reads back as the same double, without a trailing `.0`
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{value}")
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    /// Short type name used in messages and previews
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::Interval(_) => "interval",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Geometry(_) => "geometry",
            Value::Feature(_) => "feature",
            Value::Layer(_) => "layer",
        }
    }

    /// Plain text form, as used by string functions and concatenation
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => format_double(*d),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Value::Interval(i) => i.to_string(),
            Value::Array(items) => items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => String::new(),
            Value::Geometry(g) => g.to_wkt(),
            Value::Feature(f) => f.id().to_string(),
            Value::Layer(layer) => layer.id().to_string(),
        }
    }

    pub fn to_double(&self) -> EvalResult<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Double(d) => Ok(*d),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| EvalError::new(format!("Cannot convert '{s}' to double"))),
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to double",
                other.to_text()
            ))),
        }
    }

    pub fn to_int(&self) -> EvalResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Double(d) if d.is_finite() => Ok(d.round() as i64),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::String(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| {
                        trimmed
                            .parse::<f64>()
                            .ok()
                            .filter(|d| d.is_finite())
                            .map(|d| d.round() as i64)
                    })
                    .ok_or_else(|| EvalError::new(format!("Cannot convert '{s}' to int")))
            }
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to int",
                other.to_text()
            ))),
        }
    }

    /// Truth value for conditions; null yields [`Tvl::Unknown`]
    pub fn to_tvl(&self) -> EvalResult<Tvl> {
        match self {
            Value::Null => Ok(Tvl::Unknown),
            Value::Bool(b) => Ok(Tvl::from(*b)),
            Value::Int(i) => Ok(Tvl::from(*i != 0)),
            Value::Double(d) => Ok(Tvl::from(*d != 0.0)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|d| Tvl::from(d != 0.0))
                .map_err(|_| EvalError::new(format!("Cannot convert '{s}' to boolean"))),
            Value::Geometry(g) => Ok(Tvl::from(!g.is_empty())),
            Value::Feature(_) => Ok(Tvl::True),
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to boolean",
                other.to_text()
            ))),
        }
    }

    pub fn to_datetime(&self) -> EvalResult<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Ok(*dt),
            Value::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| EvalError::new("Cannot convert date to DateTime")),
            Value::String(s) => parse_datetime(s.trim())
                .ok_or_else(|| EvalError::new(format!("Cannot convert '{s}' to DateTime"))),
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to DateTime",
                other.to_text()
            ))),
        }
    }

    pub fn to_date(&self) -> EvalResult<NaiveDate> {
        match self {
            Value::Date(d) => Ok(*d),
            Value::DateTime(dt) => Ok(dt.date()),
            Value::String(s) => parse_date(s.trim())
                .or_else(|| parse_datetime(s.trim()).map(|dt| dt.date()))
                .ok_or_else(|| EvalError::new(format!("Cannot convert '{s}' to Date"))),
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to Date",
                other.to_text()
            ))),
        }
    }

    pub fn to_time(&self) -> EvalResult<NaiveTime> {
        match self {
            Value::Time(t) => Ok(*t),
            Value::DateTime(dt) => Ok(dt.time()),
            Value::String(s) => parse_time(s.trim())
                .ok_or_else(|| EvalError::new(format!("Cannot convert '{s}' to Time"))),
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to Time",
                other.to_text()
            ))),
        }
    }

    pub fn to_interval(&self) -> EvalResult<Interval> {
        match self {
            Value::Interval(i) => Ok(*i),
            Value::String(s) => Interval::parse(s)
                .ok_or_else(|| EvalError::new(format!("Cannot convert '{s}' to interval"))),
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to interval",
                other.to_text()
            ))),
        }
    }

    pub fn to_array(&self) -> EvalResult<Vec<Value>> {
        match self {
            Value::Array(items) => Ok(items.clone()),
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to array",
                other.to_text()
            ))),
        }
    }

    pub fn to_map(&self) -> EvalResult<ValueMap> {
        match self {
            Value::Map(map) => Ok(map.clone()),
            other => Err(EvalError::new(format!(
                "Cannot convert '{}' to map",
                other.to_text()
            ))),
        }
    }

    pub fn to_geometry(&self) -> EvalResult<Arc<Geometry>> {
        match self {
            Value::Geometry(g) => Ok(Arc::clone(g)),
            _ => Err(EvalError::new("Cannot convert to geometry")),
        }
    }

    pub fn to_feature(&self) -> EvalResult<Arc<Feature>> {
        match self {
            Value::Feature(f) => Ok(Arc::clone(f)),
            _ => Err(EvalError::new("Cannot convert to feature")),
        }
    }

    /// Ordering used by comparison operators and min/max style functions.
    ///
    /// Numbers compare numerically, temporal values chronologically and
    /// everything else by text. Returns `None` for null operands.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.to_double().ok()?.partial_cmp(&b.to_double().ok()?)
            }
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::DateTime(_) | Value::Date(_), Value::DateTime(_) | Value::Date(_)) => {
                Some(self.to_datetime().ok()?.cmp(&other.to_datetime().ok()?))
            }
            (Value::Interval(a), Value::Interval(b)) => a.seconds().partial_cmp(&b.seconds()),
            (Value::String(a), b) if b.is_numeric() => match a.trim().parse::<f64>() {
                Ok(a) => a.partial_cmp(&b.to_double().ok()?),
                Err(_) => Some(a.as_str().cmp(b.to_text().as_str())),
            },
            (a, Value::String(b)) if a.is_numeric() => match b.trim().parse::<f64>() {
                Ok(b) => a.to_double().ok()?.partial_cmp(&b),
                Err(_) => Some(a.to_text().as_str().cmp(b.as_str())),
            },
            (a, b) => Some(a.to_text().cmp(&b.to_text())),
        }
    }

    /// Seconds since midnight for time values
    pub fn seconds_of_day(time: &NaiveTime) -> f64 {
        f64::from(time.num_seconds_from_midnight()) + f64::from(time.nanosecond()) / 1e9
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Interval(a), Value::Interval(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Geometry(a), Value::Geometry(b)) => a == b,
            (Value::Feature(a), Value::Feature(b)) => a == b,
            (Value::Layer(a), Value::Layer(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Double(d) => write!(f, "Double({d})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Date(d) => write!(f, "Date({d})"),
            Value::Time(t) => write!(f, "Time({t})"),
            Value::DateTime(dt) => write!(f, "DateTime({dt})"),
            Value::Interval(i) => write!(f, "Interval({i})"),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Geometry(g) => write!(f, "Geometry({})", g.to_wkt()),
            Value::Feature(feature) => write!(f, "Feature({})", feature.id()),
            Value::Layer(layer) => write!(f, "Layer({})", layer.id()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Value::Map(value)
    }
}

impl From<Geometry> for Value {
    fn from(value: Geometry) -> Self {
        Value::Geometry(Arc::new(value))
    }
}

impl From<Feature> for Value {
    fn from(value: Feature) -> Self {
        Value::Feature(Arc::new(value))
    }
}

impl From<Interval> for Value {
    fn from(value: Interval) -> Self {
        Value::Interval(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Double))
                .unwrap_or_default(),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Int(3), 3.0)]
    #[case(Value::from(" 2.5 "), 2.5)]
    #[case(Value::Bool(true), 1.0)]
    fn test_to_double(#[case] value: Value, #[case] expected: f64) {
        assert_eq!(value.to_double().unwrap(), expected);
    }

    #[test]
    fn test_conversion_error_messages() {
        assert_eq!(
            Value::from("abc").to_double().unwrap_err().message(),
            "Cannot convert 'abc' to double"
        );
        assert_eq!(
            Value::from("abc").to_int().unwrap_err().message(),
            "Cannot convert 'abc' to int"
        );
        assert_eq!(
            Value::from("yes").to_tvl().unwrap_err().message(),
            "Cannot convert 'yes' to boolean"
        );
    }

    #[test]
    fn test_numeric_cross_equality() {
        assert_eq!(Value::Int(2), Value::Double(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
    }

    #[test]
    fn test_text_forms() {
        assert_eq!(Value::Double(2.0).to_text(), "2");
        assert_eq!(Value::Double(2.35).to_text(), "2.35");
        assert_eq!(Value::Null.to_text(), "");
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Value::Date(date).to_text(), "2024-02-29");
    }

    #[test]
    fn test_datetime_parsing() {
        let dt = Value::from("2023-05-04 10:11:12").to_datetime().unwrap();
        assert_eq!(dt.format("%Y-%m-%dT%H:%M:%S").to_string(), "2023-05-04T10:11:12");
        let date = Value::from("2023-05-04").to_datetime().unwrap();
        assert_eq!(date.time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(Tvl::Unknown.and(Tvl::False), Tvl::False);
        assert_eq!(Tvl::Unknown.or(Tvl::True), Tvl::True);
        assert_eq!(Tvl::Unknown.and(Tvl::True), Tvl::Unknown);
        assert_eq!(Tvl::Unknown.not(), Tvl::Unknown);
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(Value::Int(2).compare(&Value::Double(2.5)), Some(Ordering::Less));
        assert_eq!(Value::from("10").compare(&Value::Int(9)), Some(Ordering::Greater));
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
    }
}
