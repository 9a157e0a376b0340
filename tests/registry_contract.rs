//! Lookup, registration and immutability guarantees of the global registry

use std::sync::{Arc, Barrier};
use std::thread;

use feature_expression::{
    EvaluationContext, Expression, FunctionBuilder, FunctionGroup, FunctionRegistry, Value,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn evaluate(text: &str) -> Value {
    Expression::new(text).evaluate(&mut EvaluationContext::new())
}

#[test]
fn test_aliases_resolve_to_their_function() {
    let registry = FunctionRegistry::global();
    for function in registry.functions() {
        if !registry.is_builtin(function.name()) {
            continue;
        }
        let index = registry.lookup(function.name());
        assert!(index.is_some(), "{}", function.name());
        for alias in function.aliases() {
            assert_eq!(registry.lookup(alias), index, "{alias}");
            assert_eq!(registry.lookup(&alias.to_uppercase()), index, "{alias}");
        }
    }
}

#[rstest]
#[case("abs")]
#[case("ABS")]
#[case("Abs")]
fn test_lookup_ignores_case(#[case] name: &str) {
    let registry = FunctionRegistry::global();
    assert_eq!(registry.lookup(name), registry.lookup("abs"));
    assert!(registry.lookup(name).is_some());
}

#[rstest]
#[case("toint", "to_int")]
#[case("geomFromWKT", "geom_from_wkt")]
#[case("$uuid", "uuid")]
#[case("xmin", "x_min")]
fn test_known_aliases(#[case] alias: &str, #[case] name: &str) {
    let registry = FunctionRegistry::global();
    let found = registry.find(alias).expect("alias is registered");
    assert_eq!(found.name(), name);
}

#[test]
fn test_builtins_cannot_be_removed_or_shadowed() {
    let registry = FunctionRegistry::global();
    assert!(!registry.unregister("abs"));
    assert!(!registry.unregister("ABS"));
    assert_eq!(evaluate("abs(-3)"), Value::Int(3));

    let impostor = FunctionBuilder::new("abs", FunctionGroup::Custom)
        .parameter("value")
        .implementation(|_| Ok(Value::from("shadowed")))
        .build();
    assert!(!registry.register(Arc::new(impostor), true));
    assert_eq!(evaluate("abs(-3)"), Value::Int(3));
}

#[test]
fn test_custom_function_lifecycle() {
    let registry = FunctionRegistry::global();
    let triple = FunctionBuilder::new("registry_contract_triple", FunctionGroup::Custom)
        .help("Triples a number.")
        .parameter("value")
        .implementation(|call| Ok(Value::Double(call.double(0)? * 3.0)))
        .build();
    assert!(registry.register(Arc::new(triple), true));
    assert!(!registry.is_builtin("registry_contract_triple"));
    assert_eq!(evaluate("registry_contract_triple(1.5)"), Value::Double(4.5));
    assert!(
        registry
            .functions_by_group("Custom")
            .iter()
            .any(|function| function.name() == "registry_contract_triple")
    );

    assert!(registry.unregister("REGISTRY_CONTRACT_TRIPLE"));
    assert!(!registry.is_function_name("registry_contract_triple"));
    assert!(Expression::new("registry_contract_triple(1)").has_parser_error());
}

#[test]
fn test_builtin_catalog_groups() {
    let registry = FunctionRegistry::global();
    let groups = [
        "Math",
        "Conversions",
        "Conditionals",
        "Aggregates",
        "String",
        "Fuzzy Matching",
        "Date and Time",
        "Color",
        "GeometryGroup",
        "Record",
        "General",
        "Arrays",
        "Maps",
    ];
    for group in groups {
        assert!(!registry.functions_by_group(group).is_empty(), "{group}");
    }
}

#[test]
fn test_concurrent_first_access_sees_one_registry() {
    const THREADS: usize = 8;
    let barrier = Barrier::new(THREADS);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let index = FunctionRegistry::global().lookup("abs");
                    let mut expression = Expression::new("abs(-1)");
                    let value = expression.evaluate(&mut EvaluationContext::new());
                    (index, value.to_double().ok(), expression.has_eval_error())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("evaluation thread panicked"))
            .collect()
    });

    let expected = FunctionRegistry::global().lookup("abs");
    assert!(expected.is_some());
    assert_eq!(results.len(), THREADS);
    for result in results {
        assert_eq!(result, (expected, Some(1.0), false));
    }
}
