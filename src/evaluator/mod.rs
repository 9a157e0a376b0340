//! Evaluation: the expression handle, its configuration and the context
//! expressions are evaluated against

pub mod config;
pub mod context;
pub mod expression;
pub mod scopes;

pub use config::ExpressionConfig;
pub use context::{
    AggregateCacheKey, AggregateSource, CacheKey, ContextScope, EvaluationContext,
    ORIGINAL_VALUE_VARIABLE, ScopeGuard, StaticVariable,
};
pub use expression::Expression;
pub use scopes::{feature_context, global_scope, layer_scope};
