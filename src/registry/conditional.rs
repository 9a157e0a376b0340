//! Conditional functions

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use crate::ast::values_equal;
use crate::core::{Result, Tvl, Value};

impl FunctionRegistry {
    pub fn register_conditional_functions(&self) -> Result<()> {
        self.register_coalesce_function()?;
        self.register_if_function()?;
        self.register_nullif_function()?;
        Ok(())
    }

    fn register_coalesce_function(&self) -> Result<()> {
        FunctionBuilder::new("coalesce", FunctionGroup::Conditionals)
            .help("Returns the first non-null value from the argument list.")
            .variadic()
            .handles_null()
            .implementation(|call| {
                Ok(call
                    .values()
                    .find(|value| !value.is_null())
                    .cloned()
                    .unwrap_or_default())
            })
            .register_builtin(self)
    }

    /// Only the branch selected by the condition is ever evaluated
    fn register_if_function(&self) -> Result<()> {
        FunctionBuilder::new("if", FunctionGroup::Conditionals)
            .help("Returns the second argument when the condition is true, the third otherwise.")
            .arity(3)
            .lazy()
            .implementation(|call| {
                let condition = call.eval_arg(0)?;
                if condition.to_tvl()? == Tvl::True {
                    call.eval_arg(1)
                } else {
                    call.eval_arg(2)
                }
            })
            .register_builtin(self)
    }

    fn register_nullif_function(&self) -> Result<()> {
        FunctionBuilder::new("nullif", FunctionGroup::Conditionals)
            .help("Returns null when value1 equals value2, otherwise value1.")
            .parameter("value1")
            .parameter("value2")
            .handles_null()
            .implementation(|call| {
                let (first, second) = (call.value(0), call.value(1));
                if values_equal(first, second) {
                    Ok(Value::Null)
                } else {
                    Ok(first.clone())
                }
            })
            .register_builtin(self)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::core::Value;
    use crate::evaluator::{EvaluationContext, Expression};

    fn eval(text: &str) -> (Value, bool) {
        let mut expression = Expression::new(text);
        assert!(expression.is_valid(), "{}", expression.parser_error_string());
        let value = expression.evaluate(&mut EvaluationContext::new());
        (value, expression.has_eval_error())
    }

    #[rstest]
    #[case("coalesce(NULL, NULL, 'x')", Value::from("x"))]
    #[case("coalesce(NULL, 2, 3)", Value::Int(2))]
    #[case("coalesce(NULL, NULL)", Value::Null)]
    #[case("if(true, 1, 2)", Value::Int(1))]
    #[case("if(0, 1, 2)", Value::Int(2))]
    #[case("if(NULL, 1, 2)", Value::Int(2))]
    #[case("nullif(3, 3)", Value::Null)]
    #[case("nullif(3, 4)", Value::Int(3))]
    #[case("nullif('a', NULL)", Value::from("a"))]
    fn test_conditionals(#[case] text: &str, #[case] expected: Value) {
        let (value, failed) = eval(text);
        assert!(!failed);
        assert_eq!(value, expected);
    }

    #[test]
    fn test_if_skips_untaken_branch() {
        assert_eq!(eval("if(true, 1, to_int('oops'))"), (Value::Int(1), false));
        assert_eq!(eval("if(false, to_int('oops'), 2)"), (Value::Int(2), false));
        assert_eq!(eval("if(true, to_int('oops'), 2)"), (Value::Null, true));
    }
}
