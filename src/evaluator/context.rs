//! Evaluation context: a stack of variable scopes plus a per-context cache
//!
//! Lookups walk the stack from the most recently appended scope downwards,
//! so later scopes shadow earlier ones. The cache lives for as long as the
//! context does and is shared by every expression evaluated against it.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::scopes::variable_help_text;
use crate::core::{EvalError, EvalResult, Value, ValueMap};
use crate::feature::{Feature, Fields};
use crate::layer::{AggregateKind, LayerStore, VectorLayer};
use crate::registry::ExpressionFunction;

/// Name of the variable holding the value being edited
pub const ORIGINAL_VALUE_VARIABLE: &str = "value";

/// A variable together with its flags
#[derive(Debug, Clone, PartialEq)]
pub struct StaticVariable {
    pub name: String,
    pub value: Value,
    /// Hosts should not let users override it
    pub read_only: bool,
    /// The value does not change between features
    pub is_static: bool,
    pub description: String,
}

impl StaticVariable {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            read_only: false,
            is_static: false,
            description: String::new(),
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One named layer of variables, functions and an optional feature
#[derive(Clone, Default)]
pub struct ContextScope {
    name: String,
    variables: IndexMap<String, StaticVariable>,
    functions: FxHashMap<String, Arc<dyn ExpressionFunction>>,
    feature: Option<Arc<Feature>>,
    fields: Option<Arc<Fields>>,
}

impl ContextScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a variable's value, keeping the flags of an existing entry
    pub fn set_variable(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        is_static: bool,
    ) {
        let name = name.into();
        let value = value.into();
        match self.variables.get_mut(&name) {
            Some(existing) => {
                existing.value = value;
                existing.is_static = is_static;
            }
            None => {
                let variable = StaticVariable::new(name.clone(), value).with_static(is_static);
                self.variables.insert(name, variable);
            }
        }
    }

    /// Insert or replace a variable with all its flags
    pub fn add_variable(&mut self, variable: StaticVariable) {
        self.variables.insert(variable.name.clone(), variable);
    }

    pub fn remove_variable(&mut self, name: &str) -> bool {
        self.variables.shift_remove(name).is_some()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Value of `name`, null when absent
    pub fn variable(&self, name: &str) -> Value {
        self.variables
            .get(name)
            .map(|v| v.value.clone())
            .unwrap_or_default()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    /// Names not starting with `_`, read-only ones first, then alphabetical
    pub fn filtered_variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .variables
            .keys()
            .filter(|name| !name.starts_with('_'))
            .cloned()
            .collect();
        names.sort_by(|a, b| {
            self.is_read_only(b)
                .cmp(&self.is_read_only(a))
                .then_with(|| a.cmp(b))
        });
        names
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.variables.get(name).is_some_and(|v| v.read_only)
    }

    pub fn is_static(&self, name: &str) -> bool {
        self.variables.get(name).is_some_and(|v| v.is_static)
    }

    pub fn description(&self, name: &str) -> String {
        self.variables
            .get(name)
            .map(|v| v.description.clone())
            .unwrap_or_default()
    }

    pub fn add_function(&mut self, name: impl Into<String>, function: Arc<dyn ExpressionFunction>) {
        self.functions.insert(name.into(), function);
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function(&self, name: &str) -> Option<Arc<dyn ExpressionFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn set_feature(&mut self, feature: impl Into<Arc<Feature>>) {
        self.feature = Some(feature.into());
    }

    pub fn remove_feature(&mut self) {
        self.feature = None;
    }

    pub fn has_feature(&self) -> bool {
        self.feature.is_some()
    }

    pub fn feature(&self) -> Option<Arc<Feature>> {
        self.feature.clone()
    }

    pub fn set_fields(&mut self, fields: impl Into<Arc<Fields>>) {
        self.fields = Some(fields.into());
    }

    pub fn fields(&self) -> Option<Arc<Fields>> {
        self.fields.clone()
    }
}

impl fmt::Debug for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("ContextScope")
            .field("name", &self.name)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("functions", &functions)
            .field("feature", &self.feature.as_ref().map(|f| f.id()))
            .finish()
    }
}

/// Which family of functions produced an aggregate cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateSource {
    /// `aggregate(layer, ...)`
    Aggregate,
    /// `sum(...)`, `count(...)` and the other per-layer shorthands
    Generic,
    /// `relation_aggregate(relation, ...)`
    Relation,
}

/// Identity of one computed aggregate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateCacheKey {
    pub source: AggregateSource,
    pub layer_id: String,
    pub kind: AggregateKind,
    pub sub_expression: String,
    pub filter: Option<String>,
    pub delimiter: String,
    /// Content hash of the current feature when the result depends on it
    pub feature_discriminator: Option<u64>,
}

/// Key of a per-context cached value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Aggregate(AggregateCacheKey),
    Custom(String),
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey::Custom(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey::Custom(key)
    }
}

impl From<AggregateCacheKey> for CacheKey {
    fn from(key: AggregateCacheKey) -> Self {
        CacheKey::Aggregate(key)
    }
}

/// Everything an expression can see while it evaluates
#[derive(Clone, Default)]
pub struct EvaluationContext {
    scopes: Vec<ContextScope>,
    highlighted_variables: Vec<String>,
    cache: FxHashMap<CacheKey, Value>,
    layer_store: Option<Arc<LayerStore>>,
    depth: usize,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scopes(scopes: Vec<ContextScope>) -> Self {
        Self {
            scopes,
            ..Self::default()
        }
    }

    // Scope stack

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn append_scope(&mut self, scope: ContextScope) {
        self.scopes.push(scope);
    }

    pub fn append_scopes(&mut self, scopes: impl IntoIterator<Item = ContextScope>) {
        self.scopes.extend(scopes);
    }

    pub fn pop_scope(&mut self) -> Option<ContextScope> {
        self.scopes.pop()
    }

    pub fn scope(&self, index: usize) -> Option<&ContextScope> {
        self.scopes.get(index)
    }

    pub fn scope_mut(&mut self, index: usize) -> Option<&mut ContextScope> {
        self.scopes.get_mut(index)
    }

    pub fn scopes(&self) -> &[ContextScope] {
        &self.scopes
    }

    pub fn last_scope_mut(&mut self) -> Option<&mut ContextScope> {
        self.scopes.last_mut()
    }

    /// Last scope, creating an unnamed one when the stack is empty
    fn ensure_last_scope(&mut self) -> &mut ContextScope {
        if self.scopes.is_empty() {
            self.scopes.push(ContextScope::default());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    pub fn index_of_scope(&self, name: &str) -> Option<usize> {
        self.scopes.iter().position(|scope| scope.name() == name)
    }

    /// Push `scope` for the lifetime of the returned guard
    pub fn push_scope(&mut self, scope: ContextScope) -> ScopeGuard<'_> {
        let depth = self.scopes.len();
        self.scopes.push(scope);
        ScopeGuard {
            context: self,
            depth,
        }
    }

    /// Run `f` with `scope` pushed; the scope is popped on every exit path
    pub fn with_scope<R>(&mut self, scope: ContextScope, f: impl FnOnce(&mut Self) -> R) -> R {
        let mut guard = self.push_scope(scope);
        f(&mut guard)
    }

    // Variables

    /// Innermost scope defining `name`
    pub fn active_scope_for_variable(&self, name: &str) -> Option<&ContextScope> {
        self.scopes.iter().rev().find(|scope| scope.has_variable(name))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.has_variable(name))
    }

    /// Value of `name` from its active scope, null when undefined
    pub fn variable(&self, name: &str) -> Value {
        self.active_scope_for_variable(name)
            .map(|scope| scope.variable(name))
            .unwrap_or_default()
    }

    pub fn variables_to_map(&self) -> ValueMap {
        self.variable_names()
            .into_iter()
            .map(|name| {
                let value = self.variable(&name);
                (name, value)
            })
            .collect()
    }

    /// Every defined variable name, once
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for scope in &self.scopes {
            for name in scope.variable_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Names not starting with `_`, sorted
    pub fn filtered_variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .variable_names()
            .into_iter()
            .filter(|name| !name.starts_with('_'))
            .collect();
        names.sort();
        names
    }

    /// True when any scope marks `name` read-only
    pub fn is_read_only(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.is_read_only(name))
    }

    /// Scope description, falling back to the built-in help text
    pub fn description(&self, name: &str) -> String {
        match self.active_scope_for_variable(name) {
            Some(scope) if !scope.description(name).is_empty() => scope.description(name),
            _ => variable_help_text(name).to_string(),
        }
    }

    pub fn is_highlighted_variable(&self, name: &str) -> bool {
        self.highlighted_variables.iter().any(|v| v == name)
    }

    pub fn set_highlighted_variables(&mut self, names: Vec<String>) {
        self.highlighted_variables = names;
    }

    pub fn highlighted_variables(&self) -> &[String] {
        &self.highlighted_variables
    }

    /// Store the value being edited as read-only variable `value` in the last scope
    pub fn set_original_value_variable(&mut self, value: impl Into<Value>) {
        self.ensure_last_scope()
            .add_variable(StaticVariable::new(ORIGINAL_VALUE_VARIABLE, value).read_only(true));
    }

    // Functions

    pub fn has_function(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.has_function(name))
    }

    /// Sorted, de-duplicated names of scope-provided functions
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .iter()
            .flat_map(ContextScope::function_names)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Innermost scope-provided function named `name`
    pub fn function(&self, name: &str) -> Option<Arc<dyn ExpressionFunction>> {
        self.scopes.iter().rev().find_map(|scope| scope.function(name))
    }

    // Feature and fields

    /// Set the feature on the last scope, creating one when the stack is empty
    pub fn set_feature(&mut self, feature: impl Into<Arc<Feature>>) {
        self.ensure_last_scope().set_feature(feature);
    }

    pub fn has_feature(&self) -> bool {
        self.scopes.iter().any(ContextScope::has_feature)
    }

    pub fn feature(&self) -> Option<Arc<Feature>> {
        self.scopes.iter().rev().find_map(ContextScope::feature)
    }

    pub fn set_fields(&mut self, fields: impl Into<Arc<Fields>>) {
        self.ensure_last_scope().set_fields(fields);
    }

    pub fn fields(&self) -> Option<Arc<Fields>> {
        self.scopes.iter().rev().find_map(ContextScope::fields)
    }

    // Cache

    pub fn set_cached_value(&mut self, key: impl Into<CacheKey>, value: Value) {
        self.cache.insert(key.into(), value);
    }

    pub fn has_cached_value(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Cached value, null when absent
    pub fn cached_value(&self, key: &CacheKey) -> Value {
        self.cache.get(key).cloned().unwrap_or_default()
    }

    pub fn clear_cached_values(&mut self) {
        self.cache.clear();
    }

    // Layers

    pub fn set_layer_store(&mut self, store: Arc<LayerStore>) {
        self.layer_store = Some(store);
    }

    pub fn layer_store(&self) -> Option<&Arc<LayerStore>> {
        self.layer_store.as_ref()
    }

    /// Layer from a layer value, or from an id or name looked up in the store
    pub fn resolve_layer(&self, value: &Value) -> Option<Arc<dyn VectorLayer>> {
        match value {
            Value::Layer(layer) => Some(layer.clone()),
            Value::String(text) => self.layer_store.as_ref()?.resolve(text),
            _ => None,
        }
    }

    // Nesting guard

    pub(crate) fn enter_evaluation(&mut self, limit: usize) -> EvalResult<()> {
        if self.depth >= limit {
            return Err(EvalError::new("Maximum expression depth exceeded"));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave_evaluation(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("scopes", &self.scopes)
            .field("cached_values", &self.cache.len())
            .finish()
    }
}

/// A pushed scope; popping happens when the guard is dropped
pub struct ScopeGuard<'a> {
    context: &'a mut EvaluationContext,
    depth: usize,
}

impl Deref for ScopeGuard<'_> {
    type Target = EvaluationContext;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.context.scopes.truncate(self.depth);
    }
}
