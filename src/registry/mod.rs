//! Function registry and the built-in function catalog
//!
//! The registry maps function names and aliases, case-insensitively, to
//! [`ExpressionFunction`] descriptors. A single process-wide instance is
//! built on first access by [`FunctionRegistry::global`]; it holds every
//! built-in for the lifetime of the process and accepts additional
//! functions at run time. Built-ins can neither be removed nor shadowed.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::Arc;

use crate::core::{EX0101, EX0102, EX0103, ExpressionError, Result};

pub mod builder;
pub mod function;

mod aggregate;
mod array;
mod color;
mod conditional;
mod conversion;
mod datetime;
mod defaults;
mod fuzzy;
mod general;
mod geometry;
mod map;
mod math;
mod record;
mod string;
mod utils;

pub use builder::{FunctionBuilder, FunctionGroup};
pub use function::{
    ALL_ATTRIBUTES, Argument, CallSiteHook, ColumnSet, ContextPredicate, ExpressionFunction,
    FunctionArgs, FunctionContext, FunctionImpl, Parameter, Signature, StaticFunction,
    StaticPolicy, all_attributes, all_params_static,
};

static GLOBAL_REGISTRY: Lazy<FunctionRegistry> = Lazy::new(|| {
    let registry = FunctionRegistry::with_builtins();
    log::debug!(
        "function registry initialised with {} built-in functions",
        registry.count()
    );
    registry
});

#[derive(Default)]
struct RegistryState {
    functions: Vec<Arc<dyn ExpressionFunction>>,
    /// Lowercased names and aliases to positions in `functions`
    index: FxHashMap<String, usize>,
    /// Lowercased names of the built-ins
    builtins: FxHashSet<String>,
    /// Lowercased names of functions registered with ownership
    owned: FxHashSet<String>,
}

impl RegistryState {
    fn lookup(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_lowercase()).copied()
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (position, function) in self.functions.iter().enumerate() {
            let aliases = function.aliases().iter().map(String::as_str);
            for key in std::iter::once(function.name()).chain(aliases) {
                self.index.entry(key.to_lowercase()).or_insert(position);
            }
        }
    }

    fn insert(&mut self, function: Arc<dyn ExpressionFunction>) {
        let position = self.functions.len();
        let aliases = function.aliases().iter().map(String::as_str);
        for key in std::iter::once(function.name()).chain(aliases) {
            self.index.entry(key.to_lowercase()).or_insert(position);
        }
        self.functions.push(function);
    }
}

/// Catalog of callable functions
pub struct FunctionRegistry {
    state: RwLock<RegistryState>,
}

impl FunctionRegistry {
    /// Registry without any function
    pub fn empty() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Registry holding the complete built-in catalog.
    ///
    /// The catalog is assembled in this local instance before it is ever
    /// published, so nothing built here can observe a half-initialised
    /// global registry.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        if let Err(error) = registry.register_default_functions() {
            log::error!("failed to register built-in functions: {error}");
        }
        registry
    }

    /// The process-wide registry, built on first access
    pub fn global() -> &'static FunctionRegistry {
        &GLOBAL_REGISTRY
    }

    /// Position of the function called `name` (or aliased so)
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.state.read().lookup(name)
    }

    /// Position of `name`, or -1 when unknown
    pub fn function_index(&self, name: &str) -> i32 {
        self.lookup(name).map_or(-1, |index| index as i32)
    }

    /// Function at `index` as returned by [`FunctionRegistry::lookup`]
    pub fn function(&self, index: usize) -> Option<Arc<dyn ExpressionFunction>> {
        self.state.read().functions.get(index).cloned()
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn ExpressionFunction>> {
        let state = self.state.read();
        state.lookup(name).map(|index| Arc::clone(&state.functions[index]))
    }

    pub fn is_function_name(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn count(&self) -> usize {
        self.state.read().functions.len()
    }

    /// Every registered function, built-ins first
    pub fn functions(&self) -> Vec<Arc<dyn ExpressionFunction>> {
        self.state.read().functions.clone()
    }

    /// Canonical names of the built-in functions, in registration order
    pub fn builtin_names(&self) -> Vec<String> {
        let state = self.state.read();
        state
            .functions
            .iter()
            .filter(|f| state.builtins.contains(&f.name().to_lowercase()))
            .map(|f| f.name().to_string())
            .collect()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        let state = self.state.read();
        match state.lookup(name) {
            Some(index) => state.builtins.contains(&state.functions[index].name().to_lowercase()),
            None => false,
        }
    }

    /// Functions documented in `group`
    pub fn functions_by_group(&self, group: &str) -> Vec<Arc<dyn ExpressionFunction>> {
        self.state
            .read()
            .functions
            .iter()
            .filter(|f| f.groups().iter().any(|g| g.eq_ignore_ascii_case(group)))
            .cloned()
            .collect()
    }

    /// Add `function`; fails without side effects when its name is taken.
    ///
    /// With `take_ownership` the registry keeps the function alive until it
    /// is unregistered or [`FunctionRegistry::clean_registered_functions`] runs.
    pub fn try_register(
        &self,
        function: Arc<dyn ExpressionFunction>,
        take_ownership: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        if state.lookup(function.name()).is_some() {
            log::debug!("function '{}' is already registered", function.name());
            return Err(ExpressionError::function_error(
                EX0101,
                format!("Function '{}' is already registered", function.name()),
                Some(function.name().to_string()),
            ));
        }
        if take_ownership {
            state.owned.insert(function.name().to_lowercase());
        }
        log::debug!("registered function '{}'", function.name());
        state.insert(function);
        Ok(())
    }

    /// Boolean form of [`FunctionRegistry::try_register`]
    pub fn register(&self, function: Arc<dyn ExpressionFunction>, take_ownership: bool) -> bool {
        self.try_register(function, take_ownership).is_ok()
    }

    /// Remove the non-built-in function called `name`
    pub fn try_unregister(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let Some(index) = state.lookup(name) else {
            return Err(ExpressionError::function_error(
                EX0103,
                format!("Function '{name}' is not registered"),
                Some(name.to_string()),
            ));
        };
        let canonical = state.functions[index].name().to_lowercase();
        if state.builtins.contains(&canonical) {
            log::debug!("refusing to unregister built-in function '{name}'");
            return Err(ExpressionError::function_error(
                EX0102,
                format!("Built-in function '{name}' cannot be unregistered"),
                Some(name.to_string()),
            ));
        }
        state.functions.remove(index);
        state.owned.remove(&canonical);
        state.rebuild_index();
        log::debug!("unregistered function '{name}'");
        Ok(())
    }

    /// Boolean form of [`FunctionRegistry::try_unregister`]
    pub fn unregister(&self, name: &str) -> bool {
        self.try_unregister(name).is_ok()
    }

    /// Drop every function that is not a built-in
    pub fn clean_registered_functions(&self) {
        let mut state = self.state.write();
        let before = state.functions.len();
        let builtins = std::mem::take(&mut state.builtins);
        state
            .functions
            .retain(|f| builtins.contains(&f.name().to_lowercase()));
        state.builtins = builtins;
        state.owned.clear();
        state.rebuild_index();
        log::debug!(
            "removed {} registered functions",
            before - state.functions.len()
        );
    }

    /// Add a built-in; used while the catalog is assembled
    pub(crate) fn register_builtin(&self, function: StaticFunction) -> Result<()> {
        let name = function.name().to_lowercase();
        self.try_register(Arc::new(function), false)?;
        self.state.write().builtins.insert(name);
        Ok(())
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("FunctionRegistry")
            .field("functions", &state.functions.len())
            .field("builtins", &state.builtins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn custom(name: &str) -> Arc<dyn ExpressionFunction> {
        Arc::new(
            FunctionBuilder::new(name, FunctionGroup::Custom)
                .arity(0)
                .implementation(|_| Ok(Value::Int(42)))
                .build(),
        )
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::global();
        let index = registry.lookup("abs");
        assert!(index.is_some());
        assert_eq!(registry.lookup("ABS"), index);
        assert_eq!(registry.lookup("Abs"), index);
        assert_eq!(registry.function_index("no_such_function"), -1);
    }

    #[test]
    fn test_aliases_share_the_descriptor() {
        let registry = FunctionRegistry::global();
        for function in registry.functions() {
            let index = registry.lookup(function.name());
            for alias in function.aliases() {
                assert_eq!(registry.lookup(alias), index, "alias {alias}");
                assert_eq!(registry.lookup(&alias.to_uppercase()), index, "alias {alias}");
            }
        }
    }

    #[test]
    fn test_builtins_are_protected() {
        let registry = FunctionRegistry::with_builtins();
        assert!(!registry.unregister("abs"));
        assert!(!registry.register(custom("ABS"), true));
        assert_eq!(
            registry.try_unregister("abs").unwrap_err().error_code(),
            EX0102
        );
        assert!(registry.is_builtin("abs"));
        assert_eq!(registry.find("abs").map(|f| f.lazy_eval()), Some(false));
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = FunctionRegistry::with_builtins();
        let count = registry.count();
        assert!(registry.register(custom("answer"), true));
        assert!(!registry.register(custom("Answer"), false));
        assert_eq!(registry.count(), count + 1);
        assert!(registry.is_function_name("ANSWER"));

        assert!(registry.unregister("answer"));
        assert!(!registry.unregister("answer"));
        assert_eq!(
            registry.try_unregister("answer").unwrap_err().error_code(),
            EX0103
        );
        assert_eq!(registry.count(), count);
        assert!(registry.is_function_name("abs"));
    }

    #[test]
    fn test_clean_registered_functions() {
        let registry = FunctionRegistry::with_builtins();
        let count = registry.count();
        registry.register(custom("first"), true);
        registry.register(custom("second"), false);
        registry.clean_registered_functions();
        assert_eq!(registry.count(), count);
        assert!(!registry.is_function_name("first"));
        assert!(!registry.is_function_name("second"));
        assert!(registry.is_function_name("coalesce"));
    }

    #[test]
    fn test_functions_by_group() {
        let registry = FunctionRegistry::global();
        let math = registry.functions_by_group("Math");
        assert!(math.iter().any(|f| f.name() == "sqrt"));
        assert!(math.iter().all(|f| f.name() != "upper"));
        assert!(registry.builtin_names().iter().any(|name| name == "upper"));
    }
}
