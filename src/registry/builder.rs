//! Function builder pattern for registering built-ins

use std::fmt;
use std::sync::Arc;

use super::FunctionRegistry;
use super::function::{
    CallSiteHook, ColumnSet, ContextPredicate, FunctionContext, FunctionImpl, Parameter,
    Signature, StaticFunction, StaticPolicy,
};
use crate::ast::FunctionCallNode;
use crate::core::{EvalError, EvalResult, Result, Value};
use crate::evaluator::{EvaluationContext, Expression};

/// Documentation group a function is listed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionGroup {
    Math,
    Conversions,
    Conditionals,
    Aggregates,
    String,
    FuzzyMatching,
    DateTime,
    Color,
    Geometry,
    Record,
    General,
    Arrays,
    Maps,
    Custom,
    Deprecated,
}

impl FunctionGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionGroup::Math => "Math",
            FunctionGroup::Conversions => "Conversions",
            FunctionGroup::Conditionals => "Conditionals",
            FunctionGroup::Aggregates => "Aggregates",
            FunctionGroup::String => "String",
            FunctionGroup::FuzzyMatching => "Fuzzy Matching",
            FunctionGroup::DateTime => "Date and Time",
            FunctionGroup::Color => "Color",
            FunctionGroup::Geometry => "GeometryGroup",
            FunctionGroup::Record => "Record",
            FunctionGroup::General => "General",
            FunctionGroup::Arrays => "Arrays",
            FunctionGroup::Maps => "Maps",
            FunctionGroup::Custom => "Custom",
            FunctionGroup::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for FunctionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct FunctionBuilder {
    name: String,
    signature: Signature,
    groups: Vec<String>,
    help: String,
    aliases: Vec<String>,
    lazy_eval: bool,
    handles_null: bool,
    uses_geometry: CallSiteHook<bool>,
    referenced_columns: CallSiteHook<ColumnSet>,
    is_static: StaticPolicy,
    prepare: Option<ContextPredicate>,
    implementation: Option<FunctionImpl>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, group: FunctionGroup) -> Self {
        Self {
            name: name.into(),
            signature: Signature::Parameters(Vec::new()),
            groups: vec![group.as_str().to_string()],
            help: String::new(),
            aliases: Vec::new(),
            lazy_eval: false,
            handles_null: false,
            uses_geometry: CallSiteHook::Fixed(false),
            referenced_columns: CallSiteHook::Fixed(ColumnSet::new()),
            is_static: StaticPolicy::AllParamsStatic,
            prepare: None,
            implementation: None,
        }
    }

    /// List the function under an additional group
    pub fn group(mut self, group: FunctionGroup) -> Self {
        let group = group.as_str().to_string();
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        match &mut self.signature {
            Signature::Parameters(params) => params.push(parameter),
            Signature::Arity(_) => self.signature = Signature::Parameters(vec![parameter]),
        }
        self
    }

    pub fn parameter(self, name: impl Into<String>) -> Self {
        self.param(Parameter::new(name))
    }

    pub fn optional_parameter(
        self,
        name: impl Into<String>,
        default_value: impl Into<Value>,
    ) -> Self {
        self.param(Parameter::optional(name, default_value))
    }

    /// Parameter evaluated over other features
    pub fn sub_expression_parameter(self, name: impl Into<String>) -> Self {
        self.param(Parameter::new(name).as_sub_expression())
    }

    /// Declare a bare argument count instead of named parameters
    pub fn arity(mut self, count: i32) -> Self {
        self.signature = Signature::Arity(count);
        self
    }

    pub fn variadic(self) -> Self {
        self.arity(Signature::VARIADIC)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy_eval = true;
        self
    }

    pub fn handles_null(mut self) -> Self {
        self.handles_null = true;
        self
    }

    pub fn uses_geometry(mut self, uses_geometry: bool) -> Self {
        self.uses_geometry = CallSiteHook::Fixed(uses_geometry);
        self
    }

    pub fn uses_geometry_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FunctionCallNode) -> bool + Send + Sync + 'static,
    {
        self.uses_geometry = CallSiteHook::PerCall(Arc::new(hook));
        self
    }

    pub fn referenced_columns(mut self, columns: ColumnSet) -> Self {
        self.referenced_columns = CallSiteHook::Fixed(columns);
        self
    }

    pub fn referenced_columns_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FunctionCallNode) -> ColumnSet + Send + Sync + 'static,
    {
        self.referenced_columns = CallSiteHook::PerCall(Arc::new(hook));
        self
    }

    /// Fix static-ness; `false` for functions whose value changes between calls
    pub fn is_static(mut self, is_static: bool) -> Self {
        self.is_static = StaticPolicy::Fixed(is_static);
        self
    }

    pub fn static_when<F>(mut self, check: F) -> Self
    where
        F: Fn(&FunctionCallNode, &Expression, &mut EvaluationContext) -> bool
            + Send
            + Sync
            + 'static,
    {
        self.is_static = StaticPolicy::Custom(Arc::new(check));
        self
    }

    pub fn prepare_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FunctionCallNode, &Expression, &mut EvaluationContext) -> bool
            + Send
            + Sync
            + 'static,
    {
        self.prepare = Some(Arc::new(hook));
        self
    }

    pub fn implementation<F>(mut self, implementation: F) -> Self
    where
        F: Fn(&mut FunctionContext<'_>) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.implementation = Some(Arc::new(implementation));
        self
    }

    pub fn build(self) -> StaticFunction {
        let implementation: FunctionImpl = match self.implementation {
            Some(implementation) => implementation,
            None => {
                let name = self.name.clone();
                Arc::new(move |_: &mut FunctionContext<'_>| {
                    Err(EvalError::new(format!("Function '{name}' has no implementation")))
                })
            }
        };
        StaticFunction {
            name: self.name,
            signature: self.signature,
            groups: self.groups,
            help: self.help,
            aliases: self.aliases,
            lazy_eval: self.lazy_eval,
            handles_null: self.handles_null,
            uses_geometry: self.uses_geometry,
            referenced_columns: self.referenced_columns,
            is_static: self.is_static,
            prepare: self.prepare,
            implementation,
        }
    }

    /// Build and add to `registry` as a protected built-in
    pub fn register_builtin(self, registry: &FunctionRegistry) -> Result<()> {
        registry.register_builtin(self.build())
    }
}

/// Convenience macro for registering plain built-ins
#[macro_export]
macro_rules! register_function {
    (@param $builder:ident, $name:literal) => {
        $builder.parameter($name)
    };
    (@param $builder:ident, $name:literal, $default:expr) => {
        $builder.optional_parameter($name, $default)
    };
    (
        $registry:expr,
        $name:literal,
        groups: [$group:expr $(, $extra:expr)*],
        help: $help:literal,
        parameters: [$($param:literal $(= $default:expr)?),*],
        $(aliases: [$($alias:literal),*],)?
        implementation: $impl:expr
    ) => {{
        let builder = $crate::registry::builder::FunctionBuilder::new($name, $group)
            $(.group($extra))*;
        let builder = builder.help($help);
        $(
            let builder = $crate::register_function!(@param builder, $param $(, $default)?);
        )*
        $($(
            let builder = builder.alias($alias);
        )*)?
        builder.implementation($impl).register_builtin($registry)
    }};
    (
        $registry:expr,
        $name:literal,
        groups: [$group:expr $(, $extra:expr)*],
        help: $help:literal,
        arity: $arity:expr,
        $(aliases: [$($alias:literal),*],)?
        implementation: $impl:expr
    ) => {{
        let builder = $crate::registry::builder::FunctionBuilder::new($name, $group)
            $(.group($extra))*;
        let builder = builder.help($help).arity($arity);
        $($(
            let builder = builder.alias($alias);
        )*)?
        builder.implementation($impl).register_builtin($registry)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let function = FunctionBuilder::new("twice", FunctionGroup::Math)
            .group(FunctionGroup::Custom)
            .parameter("value")
            .optional_parameter("factor", 2)
            .alias("double_it")
            .implementation(|call| Ok(Value::Double(call.double(0)? * call.double(1)?)))
            .build();

        assert_eq!(function.name, "twice");
        assert_eq!(function.groups, vec!["Math".to_string(), "Custom".to_string()]);
        assert_eq!(function.signature.min_args(), 1);
        assert_eq!(function.signature.max_args(), Some(2));
        assert_eq!(function.aliases, vec!["double_it".to_string()]);
        assert!(!function.lazy_eval);
        assert!(!function.handles_null);
        assert!(matches!(function.is_static, StaticPolicy::AllParamsStatic));
    }

    #[test]
    fn test_parameter_after_arity_switches_signature() {
        let function = FunctionBuilder::new("f", FunctionGroup::Custom)
            .variadic()
            .parameter("a")
            .build();
        assert_eq!(function.signature.param_count(), 1);
    }

    #[test]
    fn test_missing_implementation_fails_on_call() {
        use crate::registry::ExpressionFunction;

        let function = FunctionBuilder::new("empty", FunctionGroup::Custom).arity(0).build();
        let node = FunctionCallNode::new("empty", Vec::new());
        let parent = Expression::new("1");
        let mut context = EvaluationContext::new();
        let error = function.run(&node, &mut context, &parent).unwrap_err();
        assert_eq!(error.message(), "Function 'empty' has no implementation");
    }

    #[test]
    fn test_register_function_macro() {
        let registry = FunctionRegistry::empty();
        register_function!(
            &registry,
            "plus_one",
            groups: [FunctionGroup::Math, FunctionGroup::Custom],
            help: "Adds one.",
            parameters: ["value", "step" = 1],
            aliases: ["inc"],
            implementation: |call| Ok(Value::Int(call.int(0)? + call.int(1)?))
        )
        .unwrap();

        let function = registry.find("inc").unwrap();
        assert_eq!(function.name(), "plus_one");
        assert_eq!(function.signature().min_args(), 1);
        assert_eq!(function.groups(), ["Math".to_string(), "Custom".to_string()]);
        assert!(registry.is_builtin("plus_one"));
    }
}
