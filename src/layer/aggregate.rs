//! Statistics over a column of values

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use super::AggregateKind;
use crate::core::Value;
use crate::geometry::Geometry;
use crate::quoting::quoted_value;

/// Computes one [`AggregateKind`] over values already extracted per feature
pub struct AggregateCalculator;

impl AggregateCalculator {
    pub fn calculate(
        kind: AggregateKind,
        values: &[Value],
        delimiter: &str,
    ) -> Result<Value, String> {
        let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();

        match kind {
            AggregateKind::Count => Ok(Value::from(present.len())),
            AggregateKind::CountMissing => Ok(Value::from(values.len() - present.len())),
            AggregateKind::CountDistinct => Ok(Value::from(frequencies(&present).len())),
            AggregateKind::Min => Ok(extreme(&present, Ordering::Less)),
            AggregateKind::Max => Ok(extreme(&present, Ordering::Greater)),
            AggregateKind::Minority => Ok(by_frequency(&present, false)),
            AggregateKind::Majority => Ok(by_frequency(&present, true)),
            AggregateKind::StringMinimumLength | AggregateKind::StringMaximumLength => {
                let lengths = present.iter().map(|v| v.to_text().chars().count());
                let length = if kind == AggregateKind::StringMinimumLength {
                    lengths.min()
                } else {
                    lengths.max()
                };
                Ok(length.map(Value::from).unwrap_or_default())
            }
            AggregateKind::StringConcatenate => Ok(Value::String(
                present
                    .iter()
                    .map(|v| v.to_text())
                    .collect::<Vec<_>>()
                    .join(delimiter),
            )),
            AggregateKind::GeometryCollect => {
                let geometries: Vec<Geometry> = present
                    .iter()
                    .filter_map(|v| match v {
                        Value::Geometry(g) => Some(g.as_ref().clone()),
                        _ => None,
                    })
                    .collect();
                Ok(Geometry::collect(geometries).map(Value::from).unwrap_or_default())
            }
            AggregateKind::ArrayAggregate => Ok(Value::Array(values.to_vec())),
            AggregateKind::Sum | AggregateKind::Range
                if present.iter().all(|v| matches!(v, Value::Int(_))) =>
            {
                let ints: Vec<i64> = present
                    .iter()
                    .filter_map(|v| match v {
                        Value::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                if kind == AggregateKind::Sum {
                    Ok(Value::Int(ints.iter().sum()))
                } else {
                    match (ints.iter().min(), ints.iter().max()) {
                        (Some(min), Some(max)) => Ok(Value::Int(max - min)),
                        _ => Ok(Value::Null),
                    }
                }
            }
            numeric => {
                let mut numbers = present
                    .iter()
                    .map(|v| v.to_double())
                    .collect::<Result<Vec<f64>, _>>()
                    .map_err(|_| {
                        format!("Aggregate '{}' requires numeric values", numeric.name())
                    })?;
                numbers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                Ok(numeric_statistic(numeric, &numbers))
            }
        }
    }
}

fn frequencies<'a>(values: &[&'a Value]) -> Vec<(&'a Value, usize)> {
    let mut order: Vec<(&'a Value, usize)> = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    for &value in values {
        let key = quoted_value(value);
        match index.get(&key) {
            Some(&slot) => order[slot].1 += 1,
            None => {
                index.insert(key, order.len());
                order.push((value, 1));
            }
        }
    }
    order
}

fn by_frequency(values: &[&Value], most: bool) -> Value {
    let counts = frequencies(values);
    let mut best: Option<(&Value, usize)> = None;
    for (value, count) in counts {
        let better = match best {
            None => true,
            Some((_, best_count)) if most => count > best_count,
            Some((_, best_count)) => count < best_count,
        };
        if better {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v.clone()).unwrap_or_default()
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in values {
        best = match best {
            Some(current) if value.compare(current) != Some(wanted) => Some(current),
            _ => Some(*value),
        };
    }
    best.cloned().unwrap_or_default()
}

fn median_of(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    Some(if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    })
}

/// Quartiles as the medians of the lower and upper halves, the middle value
/// belonging to both halves when the count is odd.
fn quartiles(sorted: &[f64]) -> Option<(f64, f64)> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let half = if n % 2 == 0 { n / 2 } else { n / 2 + 1 };
    let q1 = median_of(&sorted[..half])?;
    let q3 = median_of(&sorted[n - half..])?;
    Some((q1, q3))
}

fn numeric_statistic(kind: AggregateKind, sorted: &[f64]) -> Value {
    let n = sorted.len() as f64;
    let sum: f64 = sorted.iter().sum();
    let mean = (!sorted.is_empty()).then(|| sum / n);
    let variance = |denominator: f64| {
        mean.filter(|_| denominator > 0.0).map(|mean| {
            sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / denominator
        })
    };

    let result = match kind {
        AggregateKind::Sum => Some(sum),
        AggregateKind::Mean => mean,
        AggregateKind::Median => median_of(sorted),
        AggregateKind::StDev => variance(n).map(f64::sqrt),
        AggregateKind::StDevSample => variance(n - 1.0).map(f64::sqrt),
        AggregateKind::Range => match (sorted.first(), sorted.last()) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        },
        AggregateKind::FirstQuartile => quartiles(sorted).map(|(q1, _)| q1),
        AggregateKind::ThirdQuartile => quartiles(sorted).map(|(_, q3)| q3),
        AggregateKind::InterQuartileRange => quartiles(sorted).map(|(q1, q3)| q3 - q1),
        _ => None,
    };
    result.map(Value::Double).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[rstest]
    #[case(AggregateKind::Count, Value::Int(5))]
    #[case(AggregateKind::Sum, Value::Int(15))]
    #[case(AggregateKind::Mean, Value::Double(3.0))]
    #[case(AggregateKind::Median, Value::Double(3.0))]
    #[case(AggregateKind::Min, Value::Int(1))]
    #[case(AggregateKind::Max, Value::Int(5))]
    #[case(AggregateKind::Range, Value::Int(4))]
    #[case(AggregateKind::FirstQuartile, Value::Double(2.0))]
    #[case(AggregateKind::ThirdQuartile, Value::Double(4.0))]
    #[case(AggregateKind::InterQuartileRange, Value::Double(2.0))]
    fn test_numeric_statistics(#[case] kind: AggregateKind, #[case] expected: Value) {
        let values = ints(&[3, 1, 5, 2, 4]);
        assert_eq!(AggregateCalculator::calculate(kind, &values, "").unwrap(), expected);
    }

    #[test]
    fn test_nulls_are_missing() {
        let values = vec![Value::Int(1), Value::Null, Value::Int(1), Value::Null];
        let calc = |kind| AggregateCalculator::calculate(kind, &values, ",").unwrap();
        assert_eq!(calc(AggregateKind::Count), Value::Int(2));
        assert_eq!(calc(AggregateKind::CountMissing), Value::Int(2));
        assert_eq!(calc(AggregateKind::CountDistinct), Value::Int(1));
    }

    #[test]
    fn test_string_aggregates() {
        let values = vec![Value::from("a"), Value::from("bbb"), Value::from("a")];
        let calc = |kind| AggregateCalculator::calculate(kind, &values, "|").unwrap();
        assert_eq!(calc(AggregateKind::StringConcatenate), Value::from("a|bbb|a"));
        assert_eq!(calc(AggregateKind::StringMaximumLength), Value::Int(3));
        assert_eq!(calc(AggregateKind::Majority), Value::from("a"));
        assert_eq!(calc(AggregateKind::Minority), Value::from("bbb"));
        assert!(AggregateCalculator::calculate(AggregateKind::Mean, &values, "").is_err());
    }

    #[test]
    fn test_population_stdev() {
        let values = ints(&[2, 4, 4, 4, 5, 5, 7, 9]);
        let stdev = AggregateCalculator::calculate(AggregateKind::StDev, &values, "").unwrap();
        assert_eq!(stdev, Value::Double(2.0));
    }
}
