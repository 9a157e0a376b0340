//! Date and time functions
//!
//! The component extractors (`year`, `month`, ...) accept either a
//! temporal value or an interval. For intervals they return the fractional
//! length of the interval in that unit.

use chrono::{Datelike, Local, Timelike};

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use super::function::FunctionContext;
use crate::core::{EvalResult, Interval, Result, Value};
use crate::register_function;

/// Which part of a date, time or interval an extractor returns
#[derive(Debug, Clone, Copy)]
enum Component {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl Component {
    fn of_interval(self, interval: &Interval) -> f64 {
        match self {
            Component::Year => interval.years(),
            Component::Month => interval.months(),
            Component::Week => interval.weeks(),
            Component::Day => interval.days(),
            Component::Hour => interval.hours(),
            Component::Minute => interval.minutes(),
            Component::Second => interval.seconds(),
        }
    }

    fn of_value(self, value: &Value) -> EvalResult<i64> {
        Ok(match self {
            Component::Year => i64::from(value.to_date()?.year()),
            Component::Month => i64::from(value.to_date()?.month()),
            Component::Week => i64::from(value.to_date()?.iso_week().week()),
            Component::Day => i64::from(value.to_date()?.day()),
            Component::Hour => i64::from(value.to_time()?.hour()),
            Component::Minute => i64::from(value.to_time()?.minute()),
            Component::Second => i64::from(value.to_time()?.second()),
        })
    }
}

/// Interval carried by `value`, if it holds one rather than a date or time
fn as_interval(value: &Value) -> Option<Interval> {
    match value {
        Value::Interval(interval) => Some(*interval),
        Value::String(text) if value.to_datetime().is_err() && value.to_time().is_err() => {
            Interval::parse(text)
        }
        _ => None,
    }
}

fn extract(call: &mut FunctionContext<'_>, component: Component) -> EvalResult<Value> {
    let value = call.value(0);
    match as_interval(value) {
        Some(interval) => Ok(Value::Double(component.of_interval(&interval))),
        None => component.of_value(value).map(Value::Int),
    }
}

impl FunctionRegistry {
    pub fn register_datetime_functions(&self) -> Result<()> {
        FunctionBuilder::new("now", FunctionGroup::DateTime)
            .help("Returns the current date and time.")
            .arity(0)
            .alias("$now")
            .is_static(false)
            .implementation(|_| Ok(Value::DateTime(Local::now().naive_local())))
            .register_builtin(self)?;
        register_function!(
            self,
            "age",
            groups: [FunctionGroup::DateTime],
            help: "Returns the difference between two dates or datetimes as an interval.",
            parameters: ["datetime1", "datetime2"],
            implementation: |call| {
                let elapsed = call.datetime(0)? - call.datetime(1)?;
                Ok(Value::Interval(Interval::from_seconds(elapsed.num_seconds() as f64)))
            }
        )?;
        register_function!(
            self,
            "day_of_week",
            groups: [FunctionGroup::DateTime],
            help: "Returns the day of the week, from 0 (Sunday) to 6 (Saturday).",
            parameters: ["date"],
            implementation: |call| {
                Ok(call
                    .date(0)
                    .map(|date| Value::Int(i64::from(date.weekday().num_days_from_sunday())))
                    .unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "epoch",
            groups: [FunctionGroup::DateTime],
            help: "Returns the interval in milliseconds between the unix epoch and a datetime.",
            parameters: ["date"],
            implementation: |call| Ok(Value::Int(call.datetime(0)?.and_utc().timestamp_millis()))
        )?;

        let extractors = [
            (
                "year",
                "date",
                Component::Year,
                "Extracts the year from a date, or the number of years from an interval.",
            ),
            (
                "month",
                "date",
                Component::Month,
                "Extracts the month from a date, or the number of months from an interval.",
            ),
            (
                "week",
                "date",
                Component::Week,
                "Extracts the ISO week number from a date, or the number of weeks from an interval.",
            ),
            (
                "day",
                "date",
                Component::Day,
                "Extracts the day from a date, or the number of days from an interval.",
            ),
            (
                "hour",
                "datetime",
                Component::Hour,
                "Extracts the hour from a datetime or time, or the number of hours from an interval.",
            ),
            (
                "minute",
                "datetime",
                Component::Minute,
                "Extracts the minutes from a datetime or time, or the number of minutes from an interval.",
            ),
            (
                "second",
                "datetime",
                Component::Second,
                "Extracts the seconds from a datetime or time, or the number of seconds from an interval.",
            ),
        ];
        for (name, parameter, component, help) in extractors {
            FunctionBuilder::new(name, FunctionGroup::DateTime)
                .help(help)
                .parameter(parameter)
                .implementation(move |call| extract(call, component))
                .register_builtin(self)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::evaluator::{EvaluationContext, Expression};

    fn eval(text: &str) -> (Value, String) {
        let mut expression = Expression::new(text);
        let value = expression.evaluate(&mut EvaluationContext::new());
        (value, expression.eval_error_string())
    }

    #[rstest]
    #[case("year('2012-05-04')", Value::Int(2012))]
    #[case("month('2012-05-04')", Value::Int(5))]
    #[case("day('2012-05-04')", Value::Int(4))]
    #[case("week('2012-05-04')", Value::Int(18))]
    #[case("hour('2012-05-04 21:14:03')", Value::Int(21))]
    #[case("minute('2012-05-04 21:14:03')", Value::Int(14))]
    #[case("second('2012-05-04 21:14:03')", Value::Int(3))]
    #[case("hour(to_time('08:30:00'))", Value::Int(8))]
    #[case("day_of_week('2015-09-21')", Value::Int(1))]
    #[case("day_of_week('2015-09-20')", Value::Int(0))]
    #[case("epoch('1970-01-01 00:00:01')", Value::Int(1000))]
    #[case("day(to_interval('3 days'))", Value::Double(3.0))]
    #[case("hour('2 hours 30 minutes')", Value::Double(2.5))]
    #[case("minute(age('2012-05-12 10:00:00', '2012-05-12 08:30:00'))", Value::Double(90.0))]
    #[case("day(age('2012-05-12', '2012-05-02'))", Value::Double(10.0))]
    fn test_datetime_functions(#[case] text: &str, #[case] expected: Value) {
        let (value, error) = eval(text);
        assert_eq!(error, "");
        assert_eq!(value, expected);
    }

    #[test]
    fn test_day_of_week_of_non_date_is_null() {
        assert_eq!(eval("day_of_week('not a date')"), (Value::Null, String::new()));
    }

    #[test]
    fn test_year_of_garbage_is_an_error() {
        let (value, error) = eval("year('soon')");
        assert_eq!(value, Value::Null);
        assert!(!error.is_empty());
    }

    #[test]
    fn test_now_is_not_static() {
        let mut expression = Expression::new("$now");
        let value = expression.evaluate(&mut EvaluationContext::new());
        assert!(matches!(value, Value::DateTime(_)));
        let root = expression.root_node().unwrap().clone();
        assert!(!root.is_static(&expression, &mut EvaluationContext::new()));
    }
}
