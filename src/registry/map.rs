//! Map functions
//!
//! Maps keep their insertion order and are returned as modified copies.

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use crate::core::{Result, Value, ValueMap};
use crate::register_function;

impl FunctionRegistry {
    pub fn register_map_functions(&self) -> Result<()> {
        FunctionBuilder::new("map", FunctionGroup::Maps)
            .help("Returns a map containing all the keys and values passed as pairs of parameters.")
            .variadic()
            .implementation(|call| {
                let values: Vec<&Value> = call.values().collect();
                // a trailing key without a value is ignored
                let map: ValueMap = values
                    .chunks_exact(2)
                    .map(|pair| (pair[0].to_text(), pair[1].clone()))
                    .collect();
                Ok(Value::Map(map))
            })
            .register_builtin(self)?;
        FunctionBuilder::new("map_concat", FunctionGroup::Maps)
            .help("Returns a map containing all the entries of the given maps; later maps win on duplicate keys.")
            .variadic()
            .implementation(|call| {
                let mut merged = ValueMap::new();
                for index in 0..call.arg_count() {
                    merged.extend(call.map(index)?);
                }
                Ok(Value::Map(merged))
            })
            .register_builtin(self)?;
        register_function!(
            self,
            "map_get",
            groups: [FunctionGroup::Maps],
            help: "Returns the value of a map, given its key.",
            parameters: ["map", "key"],
            implementation: |call| {
                Ok(call.map(0)?.shift_remove(&call.text(1)).unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "map_exist",
            groups: [FunctionGroup::Maps],
            help: "Returns true if the given key exists in the map.",
            parameters: ["map", "key"],
            implementation: |call| Ok(Value::Bool(call.map(0)?.contains_key(&call.text(1))))
        )?;
        register_function!(
            self,
            "map_delete",
            groups: [FunctionGroup::Maps],
            help: "Returns a map with the given key and its value deleted.",
            parameters: ["map", "key"],
            implementation: |call| {
                let mut map = call.map(0)?;
                map.shift_remove(&call.text(1));
                Ok(Value::Map(map))
            }
        )?;
        register_function!(
            self,
            "map_insert",
            groups: [FunctionGroup::Maps],
            help: "Returns a map with an added key and value; an existing key keeps its place.",
            parameters: ["map", "key", "value"],
            implementation: |call| {
                let mut map = call.map(0)?;
                map.insert(call.text(1), call.value(2).clone());
                Ok(Value::Map(map))
            }
        )?;
        register_function!(
            self,
            "map_akeys",
            groups: [FunctionGroup::Maps],
            help: "Returns all the keys of a map as an array.",
            parameters: ["map"],
            implementation: |call| {
                Ok(Value::Array(call.map(0)?.into_keys().map(Value::String).collect()))
            }
        )?;
        register_function!(
            self,
            "map_avals",
            groups: [FunctionGroup::Maps],
            help: "Returns all the values of a map as an array.",
            parameters: ["map"],
            implementation: |call| Ok(Value::Array(call.map(0)?.into_values().collect()))
        )
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

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        )
    }

    #[rstest]
    #[case("map('a', 1, 'b', 2)", map(&[("a", Value::Int(1)), ("b", Value::Int(2))]))]
    #[case("map('a', 1, 'b')", map(&[("a", Value::Int(1))]))]
    #[case("map()", map(&[]))]
    #[case("map_get(map('a', 1, 'b', 2), 'b')", Value::Int(2))]
    #[case("map_get(map('a', 1), 'z')", Value::Null)]
    #[case("map_exist(map('a', 1), 'a')", Value::Bool(true))]
    #[case("map_exist(map('a', 1), 'z')", Value::Bool(false))]
    #[case("map_delete(map('a', 1, 'b', 2), 'a')", map(&[("b", Value::Int(2))]))]
    #[case(
        "map_insert(map('a', 1), 'b', 2)",
        map(&[("a", Value::Int(1)), ("b", Value::Int(2))])
    )]
    #[case(
        "map_concat(map('a', 1, 'b', 2), map('b', 3, 'c', 4))",
        map(&[("a", Value::Int(1)), ("b", Value::Int(3)), ("c", Value::Int(4))])
    )]
    #[case(
        "map_akeys(map('a', 1, 'b', 2))",
        Value::Array(vec![Value::from("a"), Value::from("b")])
    )]
    #[case("map_avals(map('a', 1, 'b', 2))", Value::Array(vec![Value::Int(1), Value::Int(2)]))]
    fn test_map_functions(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(eval(text), (expected, String::new()));
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let (value, _) = eval("map_akeys(map_insert(map('z', 1, 'a', 2), 'm', 3))");
        assert_eq!(
            value,
            Value::Array(vec![Value::from("z"), Value::from("a"), Value::from("m")])
        );
    }

    #[test]
    fn test_non_map_is_an_error() {
        let (value, error) = eval("map_get('abc', 'a')");
        assert_eq!(value, Value::Null);
        assert_eq!(error, "Cannot convert 'abc' to map");
    }
}
