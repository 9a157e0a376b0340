//! Expression benchmarks
//!
//! Parsing, evaluation without a feature, per-feature evaluation over a
//! memory layer and cached aggregates.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use feature_expression::evaluator::{global_scope, layer_scope};
use feature_expression::{
    EvaluationContext, Expression, Feature, Fields, LayerStore, MemoryLayer, Value, VectorLayer,
    parse,
};
use std::hint::black_box;
use std::sync::Arc;

const TEST_EXPRESSIONS: &[(&str, &str)] = &[
    ("simple", "1 + 2 * 3"),
    ("medium", "upper(left('expression', 4)) || '-' || to_string(round(2.345, 2))"),
    (
        "complex",
        "CASE WHEN array_contains(array(1, 2, 3), 2) THEN with_variable('x', 10, @x * @x) ELSE 0 END",
    ),
];

const FEATURE_EXPRESSIONS: &[(&str, &str)] = &[
    ("attribute", "\"pop\" > 1000"),
    ("string", "title(\"name\") || ' (' || \"region\" || ')'"),
    ("aggregate", "\"pop\" / sum(\"pop\")"),
];

fn towns(count: i64) -> (Arc<MemoryLayer>, Vec<Feature>) {
    let fields = Arc::new(Fields::from_names(["name", "pop", "region"]));
    let features: Vec<Feature> = (0..count)
        .map(|id| {
            Feature::new(id, fields.clone()).with_attributes(vec![
                Value::from(format!("town {id}")),
                Value::Int(id * 37 % 5000),
                Value::from(if id % 2 == 0 { "east" } else { "west" }),
            ])
        })
        .collect();
    let layer = Arc::new(
        MemoryLayer::new("towns_1", "towns", fields).with_features(features.clone()),
    );
    (layer, features)
}

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");
    group.throughput(Throughput::Elements(1));

    for (complexity, expression) in TEST_EXPRESSIONS {
        group.bench_with_input(BenchmarkId::new("parse", complexity), expression, |b, expr| {
            b.iter(|| black_box(parse(black_box(expr))))
        });
    }

    group.finish();
}

fn bench_evaluator(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator");
    group.throughput(Throughput::Elements(1));

    for (complexity, expression) in TEST_EXPRESSIONS {
        group.bench_with_input(BenchmarkId::new("evaluate", complexity), expression, |b, expr| {
            let mut expression = Expression::new(*expr);
            let mut context = EvaluationContext::from_scopes(vec![global_scope()]);
            b.iter(|| black_box(expression.evaluate(&mut context)))
        });
    }

    group.finish();
}

fn bench_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("features");
    let (layer, features) = towns(1_000);
    group.throughput(Throughput::Elements(features.len() as u64));

    for (name, text) in FEATURE_EXPRESSIONS {
        group.bench_with_input(BenchmarkId::new("prepared", name), text, |b, text| {
            let store = Arc::new(LayerStore::new());
            store.add_layer(layer.clone());
            let mut context =
                EvaluationContext::from_scopes(vec![global_scope(), layer_scope(layer.clone())]);
            context.set_layer_store(store);
            context.set_fields(layer.fields());

            let mut expression = Expression::new(*text);
            expression.prepare(&mut context);
            b.iter(|| {
                for feature in &features {
                    context.set_feature(feature.clone());
                    black_box(expression.evaluate(&mut context));
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parser, bench_evaluator, bench_features);
criterion_main!(benches);
