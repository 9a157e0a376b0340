//! Layer collaborator: the data source aggregate and record functions query
//!
//! Expressions never scan features themselves. Anything that needs more
//! than the current feature goes through [`VectorLayer`], which a host
//! implements over its own storage. [`MemoryLayer`] is a complete
//! in-memory implementation.

mod aggregate;
mod memory;
mod relation;
mod store;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::{Result, Value};
use crate::evaluator::EvaluationContext;
use crate::feature::{Feature, Fields};
use crate::geometry::{GeometryType, Rect};

pub use aggregate::AggregateCalculator;
pub use memory::MemoryLayer;
pub use relation::Relation;
pub use store::LayerStore;

/// Statistic computed by a layer aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    CountDistinct,
    CountMissing,
    Min,
    Max,
    Sum,
    Mean,
    Median,
    StDev,
    StDevSample,
    Range,
    Minority,
    Majority,
    FirstQuartile,
    ThirdQuartile,
    InterQuartileRange,
    StringMinimumLength,
    StringMaximumLength,
    StringConcatenate,
    GeometryCollect,
    ArrayAggregate,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 21] = [
        AggregateKind::Count,
        AggregateKind::CountDistinct,
        AggregateKind::CountMissing,
        AggregateKind::Min,
        AggregateKind::Max,
        AggregateKind::Sum,
        AggregateKind::Mean,
        AggregateKind::Median,
        AggregateKind::StDev,
        AggregateKind::StDevSample,
        AggregateKind::Range,
        AggregateKind::Minority,
        AggregateKind::Majority,
        AggregateKind::FirstQuartile,
        AggregateKind::ThirdQuartile,
        AggregateKind::InterQuartileRange,
        AggregateKind::StringMinimumLength,
        AggregateKind::StringMaximumLength,
        AggregateKind::StringConcatenate,
        AggregateKind::GeometryCollect,
        AggregateKind::ArrayAggregate,
    ];

    /// Name used in expression text, e.g. `aggregate('l', 'count_distinct', ...)`
    pub fn name(self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::CountDistinct => "count_distinct",
            AggregateKind::CountMissing => "count_missing",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Sum => "sum",
            AggregateKind::Mean => "mean",
            AggregateKind::Median => "median",
            AggregateKind::StDev => "stdev",
            AggregateKind::StDevSample => "stdevsample",
            AggregateKind::Range => "range",
            AggregateKind::Minority => "minority",
            AggregateKind::Majority => "majority",
            AggregateKind::FirstQuartile => "q1",
            AggregateKind::ThirdQuartile => "q3",
            AggregateKind::InterQuartileRange => "iqr",
            AggregateKind::StringMinimumLength => "min_length",
            AggregateKind::StringMaximumLength => "max_length",
            AggregateKind::StringConcatenate => "concatenate",
            AggregateKind::GeometryCollect => "collect",
            AggregateKind::ArrayAggregate => "array_agg",
        }
    }

    /// Case-insensitive lookup by name, ignoring surrounding whitespace
    pub fn from_name(name: &str) -> Option<AggregateKind> {
        let normalized = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.name() == normalized)
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("No such aggregate '{s}'"))
    }
}

/// Optional knobs for an aggregate request
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AggregateParameters {
    /// Filter expression text; only features where it is true take part
    pub filter: Option<String>,
    /// Separator for string concatenation
    pub delimiter: String,
}

/// A source of features that expressions can query
pub trait VectorLayer: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn fields(&self) -> Arc<Fields>;

    fn feature_count(&self) -> i64;

    fn selected_feature_ids(&self) -> Vec<i64>;

    fn selected_feature_count(&self) -> usize {
        self.selected_feature_ids().len()
    }

    fn get_feature(&self, id: i64) -> Option<Feature>;

    /// First feature whose `attribute` equals `value`
    fn find_feature(&self, attribute: &str, value: &Value) -> Option<Feature>;

    /// Compute `kind` over `expression` evaluated for every feature
    /// passing the parameters' filter.
    fn aggregate(
        &self,
        kind: AggregateKind,
        expression: &str,
        parameters: &AggregateParameters,
        context: Option<&EvaluationContext>,
    ) -> Result<Value>;

    fn geometry_type(&self) -> GeometryType {
        GeometryType::Unknown
    }

    fn extent(&self) -> Option<Rect> {
        None
    }

    /// Named layer property as exposed by `layer_property()`
    fn property(&self, name: &str) -> Option<Value> {
        match name.to_ascii_lowercase().as_str() {
            "name" => Some(Value::from(self.name())),
            "id" => Some(Value::from(self.id())),
            "feature_count" => Some(Value::Int(self.feature_count())),
            "geometry_type" => Some(Value::from(match self.geometry_type() {
                GeometryType::Point => "Point",
                GeometryType::Line => "Line",
                GeometryType::Polygon => "Polygon",
                GeometryType::Unknown => "Unknown geometry",
            })),
            "extent" => Some(self.extent().map(|r| Value::from(r.to_geometry())).into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_kind_from_name() {
        assert_eq!(
            AggregateKind::from_name(" Count_Distinct "),
            Some(AggregateKind::CountDistinct)
        );
        assert_eq!(AggregateKind::from_name("q3"), Some(AggregateKind::ThirdQuartile));
        assert_eq!(AggregateKind::from_name("avg"), None);
        assert_eq!(
            "avg".parse::<AggregateKind>().unwrap_err(),
            "No such aggregate 'avg'"
        );
    }
}
