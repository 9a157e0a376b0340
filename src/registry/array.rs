//! Array functions
//!
//! Arrays are values: every function returns a modified copy. Positions
//! are 1-based and negative positions count back from the last element.

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use super::utils::position;
use crate::ast::values_equal;
use crate::core::{Result, Value};
use crate::register_function;

/// Index at which `array_insert` places its value; out of range positions
/// clamp to the nearest end
fn insertion_index(len: usize, pos: i64) -> usize {
    position(len + 1, pos).unwrap_or(if pos > 0 { len } else { 0 })
}

fn contains(items: &[Value], needle: &Value) -> bool {
    items.iter().any(|item| values_equal(item, needle))
}

fn join(items: &[Value], delimiter: &str, empty: &str) -> String {
    items
        .iter()
        .map(|item| match item.to_text() {
            text if text.is_empty() => empty.to_string(),
            text => text,
        })
        .collect::<Vec<_>>()
        .join(delimiter)
}

fn split(text: &str, delimiter: &str, empty: &str) -> Vec<Value> {
    let parts: Vec<String> = if delimiter.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(delimiter).map(String::from).collect()
    };
    parts
        .into_iter()
        .map(|part| Value::String(if part.is_empty() { empty.to_string() } else { part }))
        .collect()
}

impl FunctionRegistry {
    pub fn register_array_functions(&self) -> Result<()> {
        self.register_array_constructors()?;
        self.register_array_accessors()?;
        self.register_array_edits()?;
        self.register_array_conversions()
    }

    fn register_array_constructors(&self) -> Result<()> {
        FunctionBuilder::new("array", FunctionGroup::Arrays)
            .help("Returns an array containing all the values passed as parameters.")
            .variadic()
            .handles_null()
            .implementation(|call| Ok(Value::Array(call.values().cloned().collect())))
            .register_builtin(self)?;
        FunctionBuilder::new("array_cat", FunctionGroup::Arrays)
            .help("Returns an array containing all the given arrays concatenated.")
            .variadic()
            .implementation(|call| {
                let mut joined = Vec::new();
                for index in 0..call.arg_count() {
                    joined.extend(call.array(index)?);
                }
                Ok(Value::Array(joined))
            })
            .register_builtin(self)
    }

    fn register_array_accessors(&self) -> Result<()> {
        register_function!(
            self,
            "array_length",
            groups: [FunctionGroup::Arrays],
            help: "Returns the number of elements of an array.",
            parameters: ["array"],
            implementation: |call| Ok(Value::from(call.array(0)?.len()))
        )?;
        register_function!(
            self,
            "array_contains",
            groups: [FunctionGroup::Arrays],
            help: "Returns true if an array contains the given value.",
            parameters: ["array", "value"],
            implementation: |call| Ok(Value::Bool(contains(&call.array(0)?, call.value(1))))
        )?;
        register_function!(
            self,
            "array_find",
            groups: [FunctionGroup::Arrays],
            help: "Returns the position of a value in an array, starting at 1, or -1 when it is absent.",
            parameters: ["array", "value"],
            implementation: |call| {
                let needle = call.value(1);
                Ok(Value::Int(
                    call.array(0)?
                        .iter()
                        .position(|item| values_equal(item, needle))
                        .map_or(-1, |index| index as i64 + 1),
                ))
            }
        )?;
        register_function!(
            self,
            "array_get",
            groups: [FunctionGroup::Arrays],
            help: "Returns the value at a 1-based position of an array; negative positions count from the end.",
            parameters: ["array", "pos"],
            implementation: |call| {
                let mut items = call.array(0)?;
                Ok(position(items.len(), call.int(1)?)
                    .map(|index| items.swap_remove(index))
                    .unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "array_first",
            groups: [FunctionGroup::Arrays],
            help: "Returns the first value of an array.",
            parameters: ["array"],
            implementation: |call| Ok(call.array(0)?.into_iter().next().unwrap_or_default())
        )?;
        register_function!(
            self,
            "array_last",
            groups: [FunctionGroup::Arrays],
            help: "Returns the last value of an array.",
            parameters: ["array"],
            implementation: |call| Ok(call.array(0)?.pop().unwrap_or_default())
        )?;
        register_function!(
            self,
            "array_intersect",
            groups: [FunctionGroup::Arrays],
            help: "Returns true if the two arrays share at least one value.",
            parameters: ["array1", "array2"],
            implementation: |call| {
                let first = call.array(0)?;
                Ok(Value::Bool(call.array(1)?.iter().any(|item| contains(&first, item))))
            }
        )
    }

    fn register_array_edits(&self) -> Result<()> {
        register_function!(
            self,
            "array_append",
            groups: [FunctionGroup::Arrays],
            help: "Returns an array with the given value added at the end.",
            parameters: ["array", "value"],
            implementation: |call| {
                let mut items = call.array(0)?;
                items.push(call.value(1).clone());
                Ok(Value::Array(items))
            }
        )?;
        register_function!(
            self,
            "array_prepend",
            groups: [FunctionGroup::Arrays],
            help: "Returns an array with the given value added at the beginning.",
            parameters: ["array", "value"],
            implementation: |call| {
                let mut items = call.array(0)?;
                items.insert(0, call.value(1).clone());
                Ok(Value::Array(items))
            }
        )?;
        register_function!(
            self,
            "array_insert",
            groups: [FunctionGroup::Arrays],
            help: "Returns an array with the given value inserted at a 1-based position.",
            parameters: ["array", "pos", "value"],
            implementation: |call| {
                let mut items = call.array(0)?;
                let index = insertion_index(items.len(), call.int(1)?);
                items.insert(index, call.value(2).clone());
                Ok(Value::Array(items))
            }
        )?;
        register_function!(
            self,
            "array_remove_at",
            groups: [FunctionGroup::Arrays],
            help: "Returns an array with the element at a 1-based position removed.",
            parameters: ["array", "pos"],
            implementation: |call| {
                let mut items = call.array(0)?;
                if let Some(index) = position(items.len(), call.int(1)?) {
                    items.remove(index);
                }
                Ok(Value::Array(items))
            }
        )?;
        register_function!(
            self,
            "array_remove_all",
            groups: [FunctionGroup::Arrays],
            help: "Returns an array with all the entries equal to the given value removed.",
            parameters: ["array", "value"],
            implementation: |call| {
                let needle = call.value(1);
                let mut items = call.array(0)?;
                items.retain(|item| !values_equal(item, needle));
                Ok(Value::Array(items))
            }
        )?;
        register_function!(
            self,
            "array_distinct",
            groups: [FunctionGroup::Arrays],
            help: "Returns an array containing the distinct values of the input array.",
            parameters: ["array"],
            implementation: |call| {
                let mut distinct = Vec::new();
                for item in call.array(0)? {
                    if !contains(&distinct, &item) {
                        distinct.push(item);
                    }
                }
                Ok(Value::Array(distinct))
            }
        )
    }

    fn register_array_conversions(&self) -> Result<()> {
        register_function!(
            self,
            "array_to_string",
            groups: [FunctionGroup::Arrays],
            help: "Concatenates array elements into a string separated by a delimiter, replacing empty values.",
            parameters: ["array", "delimiter" = ",", "emptyvalue" = ""],
            implementation: |call| {
                Ok(Value::String(join(&call.array(0)?, &call.text(1), &call.text(2))))
            }
        )?;
        register_function!(
            self,
            "string_to_array",
            groups: [FunctionGroup::Arrays],
            help: "Splits a string into an array using a delimiter, replacing empty parts.",
            parameters: ["string", "delimiter" = ",", "emptyvalue" = ""],
            implementation: |call| {
                Ok(Value::Array(split(&call.text(0), &call.text(1), &call.text(2))))
            }
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

    fn ints(values: &[i64]) -> Value {
        Value::Array(values.iter().copied().map(Value::Int).collect())
    }

    fn strings(values: &[&str]) -> Value {
        Value::Array(values.iter().copied().map(Value::from).collect())
    }

    #[rstest]
    #[case("array(1, 2, 3)", ints(&[1, 2, 3]))]
    #[case("array()", ints(&[]))]
    #[case("array(1, NULL)", Value::Array(vec![Value::Int(1), Value::Null]))]
    #[case("array_length(array(1, 2, 3))", Value::Int(3))]
    #[case("array_contains(array(1, 2, 3), 2)", Value::Bool(true))]
    #[case("array_contains(array(1, 2, 3), 5)", Value::Bool(false))]
    #[case("array_find(array('a', 'b', 'c'), 'b')", Value::Int(2))]
    #[case("array_find(array('a', 'b', 'c'), 'z')", Value::Int(-1))]
    #[case("array_get(array('a', 'b', 'c'), 1)", Value::from("a"))]
    #[case("array_get(array('a', 'b', 'c'), -1)", Value::from("c"))]
    #[case("array_get(array('a', 'b', 'c'), 4)", Value::Null)]
    #[case("array_get(array('a', 'b', 'c'), 0)", Value::Null)]
    #[case("array_first(array(4, 5))", Value::Int(4))]
    #[case("array_last(array(4, 5))", Value::Int(5))]
    #[case("array_first(array())", Value::Null)]
    #[case("array_append(array(1, 2), 3)", ints(&[1, 2, 3]))]
    #[case("array_prepend(array(1, 2), 0)", ints(&[0, 1, 2]))]
    #[case("array_insert(array(1, 3), 2, 2)", ints(&[1, 2, 3]))]
    #[case("array_insert(array(1, 2), 3, 3)", ints(&[1, 2, 3]))]
    #[case("array_insert(array(1, 2), -1, 3)", ints(&[1, 2, 3]))]
    #[case("array_insert(array(1, 2), 9, 3)", ints(&[1, 2, 3]))]
    #[case("array_remove_at(array(1, 2, 3), 2)", ints(&[1, 3]))]
    #[case("array_remove_at(array(1, 2, 3), -1)", ints(&[1, 2]))]
    #[case("array_remove_at(array(1, 2, 3), 7)", ints(&[1, 2, 3]))]
    #[case("array_remove_all(array('a', 'b', 'a'), 'a')", strings(&["b"]))]
    #[case("array_cat(array(1, 2), array(3), array())", ints(&[1, 2, 3]))]
    #[case("array_intersect(array(1, 2), array(2, 3))", Value::Bool(true))]
    #[case("array_intersect(array(1, 2), array(3))", Value::Bool(false))]
    #[case("array_distinct(array(1, 2, 1, 3, 2))", ints(&[1, 2, 3]))]
    #[case("array_to_string(array('1', '2', '3'))", Value::from("1,2,3"))]
    #[case("array_to_string(array('1', '', '3'), '-', '0')", Value::from("1-0-3"))]
    #[case("string_to_array('1,2,3')", strings(&["1", "2", "3"]))]
    #[case("string_to_array('1,,3', ',', '0')", strings(&["1", "0", "3"]))]
    #[case("string_to_array('abc', '')", strings(&["a", "b", "c"]))]
    fn test_array_functions(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(eval(text), (expected, String::new()));
    }

    #[test]
    fn test_null_array_gives_null() {
        assert_eq!(eval("array_length(NULL)"), (Value::Null, String::new()));
    }

    #[test]
    fn test_non_array_is_an_error() {
        let (value, error) = eval("array_length('abc')");
        assert_eq!(value, Value::Null);
        assert_eq!(error, "Cannot convert 'abc' to array");
    }

    #[rstest]
    #[case(2, 1, 0)]
    #[case(2, 3, 2)]
    #[case(2, 0, 0)]
    #[case(2, -3, 0)]
    #[case(2, -4, 0)]
    #[case(0, 1, 0)]
    fn test_insertion_index(#[case] len: usize, #[case] pos: i64, #[case] expected: usize) {
        assert_eq!(insertion_index(len, pos), expected);
    }
}
