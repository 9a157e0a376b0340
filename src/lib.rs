//! Per-feature expression language core
//!
//! Expressions are parsed once into an [`Expression`] handle and evaluated
//! many times against an [`EvaluationContext`], typically once per feature
//! of a vector layer. Functions come from the process-wide
//! [`FunctionRegistry`], which holds the built-in catalog and accepts
//! host-registered functions.

pub mod ast;
pub mod core;
pub mod evaluator;
pub mod feature;
pub mod geometry;
pub mod layer;
pub mod parser;
pub mod quoting;
pub mod registry;

// Re-export main types
pub use crate::core::{EvalError, EvalResult, ExpressionError, Interval, Result, Value, ValueMap};
pub use evaluator::{ContextScope, EvaluationContext, Expression, ExpressionConfig};
pub use feature::{Feature, Field, FieldType, Fields};
pub use geometry::Geometry;
pub use layer::{LayerStore, MemoryLayer, Relation, VectorLayer};
pub use parser::{ParseError, parse};
pub use quoting::{quoted_column_ref, quoted_string, quoted_value};
pub use registry::{ExpressionFunction, FunctionBuilder, FunctionGroup, FunctionRegistry};
