//! Aggregate functions
//!
//! Every aggregate is lazy: the expression and filter arguments are never
//! evaluated against the current feature. Their source text is handed to
//! the layer, which evaluates it once per feature of its own. Results are
//! cached on the evaluation context, keyed by everything that can change
//! them, including the current feature when an argument refers to `@parent`.

use std::sync::Arc;

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use super::function::{ColumnSet, FunctionContext, Parameter, all_attributes};
use crate::ast::{ExpressionNode, FunctionCallNode};
use crate::core::{EvalError, EvalResult, Result, Value};
use crate::evaluator::{AggregateCacheKey, AggregateSource, CacheKey, ContextScope};
use crate::layer::{AggregateKind, AggregateParameters, VectorLayer};
use crate::quoting::quoted_value;

const GENERIC_AGGREGATES: &[(&str, AggregateKind, &str)] = &[
    ("count", AggregateKind::Count, "Returns the count of matching features."),
    ("count_distinct", AggregateKind::CountDistinct, "Returns the count of distinct values."),
    ("count_missing", AggregateKind::CountMissing, "Returns the count of missing (null) values."),
    ("minimum", AggregateKind::Min, "Returns the minimum value."),
    ("maximum", AggregateKind::Max, "Returns the maximum value."),
    ("sum", AggregateKind::Sum, "Returns the summed value."),
    ("mean", AggregateKind::Mean, "Returns the mean value."),
    ("median", AggregateKind::Median, "Returns the median value."),
    ("stdev", AggregateKind::StDev, "Returns the standard deviation."),
    ("range", AggregateKind::Range, "Returns the range (maximum - minimum)."),
    ("minority", AggregateKind::Minority, "Returns the least common value."),
    ("majority", AggregateKind::Majority, "Returns the most common value."),
    ("q1", AggregateKind::FirstQuartile, "Returns the first quartile."),
    ("q3", AggregateKind::ThirdQuartile, "Returns the third quartile."),
    ("iqr", AggregateKind::InterQuartileRange, "Returns the inter quartile range."),
    ("min_length", AggregateKind::StringMinimumLength, "Returns the minimum string length."),
    ("max_length", AggregateKind::StringMaximumLength, "Returns the maximum string length."),
    (
        "collect",
        AggregateKind::GeometryCollect,
        "Returns the multipart geometry of collected geometries.",
    ),
    ("array_agg", AggregateKind::ArrayAggregate, "Returns an array of the aggregated values."),
];

/// Everything a layer needs to compute one aggregate
struct AggregateRequest {
    layer: Arc<dyn VectorLayer>,
    kind: AggregateKind,
    sub_expression: String,
    parameters: AggregateParameters,
    source: AggregateSource,
    /// The expression or filter reads `@parent`
    depends_on_feature: bool,
}

impl FunctionRegistry {
    pub fn register_aggregate_functions(&self) -> Result<()> {
        self.register_layer_aggregate_function()?;
        self.register_relation_aggregate_function()?;
        for &(name, kind, help) in GENERIC_AGGREGATES {
            generic_aggregate_builder(name, kind, help).register_builtin(self)?;
        }
        generic_aggregate_builder(
            "concatenate",
            AggregateKind::StringConcatenate,
            "Returns all aggregated strings joined by a delimiter.",
        )
        .optional_parameter("concatenator", "")
        .register_builtin(self)
    }

    fn register_layer_aggregate_function(&self) -> Result<()> {
        FunctionBuilder::new("aggregate", FunctionGroup::Aggregates)
            .help("Returns an aggregate value calculated using features from another layer.")
            .parameter("layer")
            .parameter("aggregate")
            .sub_expression_parameter("expression")
            .param(Parameter::optional("filter", Value::Null).as_sub_expression())
            .optional_parameter("concatenator", "")
            .lazy()
            .is_static(false)
            .uses_geometry_with(references_parent)
            .referenced_columns_with(|node| {
                if references_parent(node) {
                    return all_attributes();
                }
                node.arguments
                    .iter()
                    .skip(2)
                    .take(2)
                    .flat_map(ExpressionNode::referenced_columns)
                    .collect::<ColumnSet>()
            })
            .implementation(|call| {
                let layer_value = call.eval_arg(0)?;
                let layer = call.context.resolve_layer(&layer_value).ok_or_else(|| {
                    EvalError::new(format!(
                        "Cannot find layer with name or ID '{}'",
                        layer_value.to_text()
                    ))
                })?;

                let name = call.eval_arg(1)?.to_text();
                let kind = AggregateKind::from_name(&name)
                    .ok_or_else(|| EvalError::new(format!("No such aggregate '{name}'")))?;

                let sub_expression = call.node(2).map(ExpressionNode::dump).unwrap_or_default();
                let filter = call
                    .node(3)
                    .filter(|node| !node.is_null_literal())
                    .map(ExpressionNode::dump);
                let delimiter = call.eval_arg(4)?.to_text();

                let depends_on_feature = references_parent(call.node);
                compute(
                    call,
                    AggregateRequest {
                        layer,
                        kind,
                        sub_expression,
                        parameters: AggregateParameters { filter, delimiter },
                        source: AggregateSource::Aggregate,
                        depends_on_feature,
                    },
                )
            })
            .register_builtin(self)
    }

    fn register_relation_aggregate_function(&self) -> Result<()> {
        FunctionBuilder::new("relation_aggregate", FunctionGroup::Aggregates)
            .help("Returns an aggregate value calculated using all matching child features from a layer relation.")
            .parameter("relation")
            .parameter("aggregate")
            .sub_expression_parameter("expression")
            .optional_parameter("concatenator", "")
            .lazy()
            .is_static(false)
            .uses_geometry(false)
            .referenced_columns(all_attributes())
            .implementation(|call| {
                let layer_value = call.context.variable("layer");
                let layer = call.context.resolve_layer(&layer_value).ok_or_else(|| {
                    EvalError::new("Cannot use relation aggregate function in this context")
                })?;

                let relation_id = call.eval_arg(0)?.to_text();
                let store = call.context.layer_store().cloned();
                let relation = store
                    .as_ref()
                    .and_then(|store| store.resolve_relation(&relation_id, layer.id()))
                    .ok_or_else(|| {
                        EvalError::new(format!("Cannot find relation with id '{relation_id}'"))
                    })?;
                let child = store
                    .as_ref()
                    .and_then(|store| store.layer(relation.referencing_layer()))
                    .ok_or_else(|| {
                        EvalError::new(format!(
                            "Cannot find layer with name or ID '{}'",
                            relation.referencing_layer()
                        ))
                    })?;

                let name = call.eval_arg(1)?.to_text();
                let kind = AggregateKind::from_name(&name)
                    .ok_or_else(|| EvalError::new(format!("No such aggregate '{name}'")))?;

                let sub_expression = call.node(2).map(ExpressionNode::dump).unwrap_or_default();
                let delimiter = call.eval_arg(3)?.to_text();
                let feature = call.context.feature();
                let filter = relation.related_features_filter(feature.as_deref());

                let depends_on_feature = arguments_reference_parent(call.node, &[2]);
                compute(
                    call,
                    AggregateRequest {
                        layer: child,
                        kind,
                        sub_expression,
                        parameters: AggregateParameters {
                            filter: Some(filter),
                            delimiter,
                        },
                        source: AggregateSource::Relation,
                        depends_on_feature,
                    },
                )
            })
            .register_builtin(self)
    }
}

/// Descriptor shared by the per-layer shorthands such as `sum()`
fn generic_aggregate_builder(name: &str, kind: AggregateKind, help: &str) -> FunctionBuilder {
    FunctionBuilder::new(name, FunctionGroup::Aggregates)
        .help(help)
        .sub_expression_parameter("expression")
        .optional_parameter("group_by", Value::Null)
        .param(Parameter::optional("filter", Value::Null).as_sub_expression())
        .lazy()
        .is_static(false)
        .implementation(move |call| {
            let layer_value = call.context.variable("layer");
            let layer = call
                .context
                .resolve_layer(&layer_value)
                .ok_or_else(|| EvalError::new("Cannot use aggregate function in this context"))?;

            let sub_expression = call.node(0).map(ExpressionNode::dump).unwrap_or_default();
            let mut filter = call
                .node(2)
                .filter(|node| !node.is_null_literal())
                .map(ExpressionNode::dump);

            if let Some(group_by) = call.node(1).filter(|node| !node.is_null_literal()) {
                let group_value = call.eval_arg(1)?;
                let clause = if group_value.is_null() {
                    format!("{} is NULL", group_by.dump())
                } else {
                    format!("{} = {}", group_by.dump(), quoted_value(&group_value))
                };
                filter = Some(match filter {
                    Some(filter) => format!("({filter}) AND ({clause})"),
                    None => clause,
                });
            }

            let delimiter = if call.arg_count() > 3 {
                call.eval_arg(3)?.to_text()
            } else {
                String::new()
            };

            let depends_on_feature = arguments_reference_parent(call.node, &[0, 2]);
            compute(
                call,
                AggregateRequest {
                    layer,
                    kind,
                    sub_expression,
                    parameters: AggregateParameters { filter, delimiter },
                    source: AggregateSource::Generic,
                    depends_on_feature,
                },
            )
        })
}

/// True when the expression or filter argument of `aggregate()` reads
/// `@parent`, or a variable that cannot be known until evaluation
fn references_parent(node: &FunctionCallNode) -> bool {
    arguments_reference_parent(node, &[2, 3])
}

fn arguments_reference_parent(node: &FunctionCallNode, indexes: &[usize]) -> bool {
    indexes
        .iter()
        .filter_map(|&index| node.arguments.get(index))
        .flat_map(ExpressionNode::referenced_variables)
        .any(|name| name.is_empty() || name == "parent")
}

/// Serve `request` from the context cache or compute it on the layer with
/// `@parent` bound to the current feature
fn compute(call: &mut FunctionContext<'_>, request: AggregateRequest) -> EvalResult<Value> {
    let AggregateRequest {
        layer,
        kind,
        sub_expression,
        parameters,
        source,
        depends_on_feature,
    } = request;

    let feature = call.context.feature();
    let key = CacheKey::Aggregate(AggregateCacheKey {
        source,
        layer_id: layer.id().to_string(),
        kind,
        sub_expression: sub_expression.clone(),
        filter: parameters.filter.clone(),
        delimiter: parameters.delimiter.clone(),
        feature_discriminator: if depends_on_feature {
            feature.as_ref().map(|f| f.content_hash())
        } else {
            None
        },
    });

    if call.context.has_cached_value(&key) {
        log::trace!("aggregate cache hit: {kind} of '{sub_expression}' on '{}'", layer.id());
        return Ok(call.context.cached_value(&key));
    }
    log::debug!("aggregate cache miss: {kind} of '{sub_expression}' on '{}'", layer.id());

    let mut scope = ContextScope::new("Parent");
    scope.set_variable("parent", feature.map(Value::Feature).unwrap_or_default(), false);
    let result = call.context.with_scope(scope, |context| {
        layer.aggregate(kind, &sub_expression, &parameters, Some(&*context))
    });

    let value = result.map_err(|error| {
        EvalError::new(format!(
            "Could not calculate aggregate for: {sub_expression} ({})",
            error.message()
        ))
    })?;
    call.context.set_cached_value(key, value.clone());
    Ok(value)
}
