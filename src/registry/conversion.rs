//! Conversion functions

use super::FunctionRegistry;
use super::builder::FunctionGroup;
use crate::core::{Result, Value};
use crate::register_function;

impl FunctionRegistry {
    pub fn register_conversion_functions(&self) -> Result<()> {
        self.register_numeric_conversions()?;
        self.register_to_string_function()?;
        self.register_temporal_conversions()?;
        Ok(())
    }

    fn register_numeric_conversions(&self) -> Result<()> {
        register_function!(
            self,
            "to_int",
            groups: [FunctionGroup::Conversions],
            help: "Converts a string or number to an integer, rounding doubles.",
            parameters: ["value"],
            aliases: ["toint"],
            implementation: |call| Ok(Value::Int(call.int(0)?))
        )?;
        register_function!(
            self,
            "to_real",
            groups: [FunctionGroup::Conversions],
            help: "Converts a string or number to a real number.",
            parameters: ["value"],
            aliases: ["toreal"],
            implementation: |call| Ok(Value::Double(call.double(0)?))
        )
    }

    fn register_to_string_function(&self) -> Result<()> {
        register_function!(
            self,
            "to_string",
            groups: [FunctionGroup::Conversions, FunctionGroup::String],
            help: "Converts a value to its string form.",
            parameters: ["value"],
            aliases: ["tostring"],
            implementation: |call| Ok(Value::String(call.text(0)))
        )
    }

    fn register_temporal_conversions(&self) -> Result<()> {
        register_function!(
            self,
            "to_datetime",
            groups: [FunctionGroup::Conversions, FunctionGroup::DateTime],
            help: "Converts a string into a datetime.",
            parameters: ["value"],
            aliases: ["todatetime"],
            implementation: |call| Ok(Value::DateTime(call.datetime(0)?))
        )?;
        register_function!(
            self,
            "to_date",
            groups: [FunctionGroup::Conversions, FunctionGroup::DateTime],
            help: "Converts a string into a date.",
            parameters: ["value"],
            aliases: ["todate"],
            implementation: |call| Ok(Value::Date(call.date(0)?))
        )?;
        register_function!(
            self,
            "to_time",
            groups: [FunctionGroup::Conversions, FunctionGroup::DateTime],
            help: "Converts a string into a time.",
            parameters: ["value"],
            aliases: ["totime"],
            implementation: |call| Ok(Value::Time(call.time(0)?))
        )?;
        register_function!(
            self,
            "to_interval",
            groups: [FunctionGroup::Conversions, FunctionGroup::DateTime],
            help: "Converts a string such as '1 day 2 hours' into an interval.",
            parameters: ["value"],
            aliases: ["tointerval"],
            implementation: |call| Ok(Value::Interval(call.interval(0)?))
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::core::{Interval, Value};
    use crate::evaluator::{EvaluationContext, Expression};

    fn eval(text: &str) -> (Value, String) {
        let mut expression = Expression::new(text);
        assert!(expression.is_valid(), "{}", expression.parser_error_string());
        let value = expression.evaluate(&mut EvaluationContext::new());
        (value, expression.eval_error_string())
    }

    #[rstest]
    #[case("to_int('42')", Value::Int(42))]
    #[case("toint(2.6)", Value::Int(3))]
    #[case("to_real('1.5')", Value::Double(1.5))]
    #[case("to_string(12)", Value::from("12"))]
    #[case("tostring(1.5)", Value::from("1.5"))]
    #[case("to_date('2020-03-04')", Value::Date(NaiveDate::from_ymd_opt(2020, 3, 4).unwrap()))]
    #[case("to_time('10:30:00')", Value::Time(NaiveTime::from_hms_opt(10, 30, 0).unwrap()))]
    #[case("to_interval('1 day')", Value::Interval(Interval::from_seconds(86_400.0)))]
    fn test_conversions(#[case] text: &str, #[case] expected: Value) {
        let (value, error) = eval(text);
        assert_eq!(error, "");
        assert_eq!(value, expected);
    }

    #[test]
    fn test_invalid_conversion_sets_error() {
        let (value, error) = eval("to_int('abc')");
        assert_eq!(value, Value::Null);
        assert_eq!(error, "Cannot convert 'abc' to int");
    }

    #[test]
    fn test_datetime_round_trip() {
        let (value, _) = eval("to_string(to_datetime('2021-05-06 07:08:09'))");
        assert_eq!(value, Value::from("2021-05-06T07:08:09"));
    }
}
