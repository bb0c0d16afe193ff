//! Graphite functions and the registry that names them.
//!
//! A function is a [`Function`] implementation registered under one or more
//! names in a [`FunctionRegistry`]. The registry is filled at startup and
//! then shared read-only between evaluators.

pub mod aggregate;
pub mod args;
pub mod filter;
pub mod transform;
pub mod window;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::FunctionsConfig;
use crate::error::{Error, Result};
use crate::evaluator::EvalContext;
use crate::expr::Call;
use crate::model::Series;

/// A Graphite function.
///
/// Implementations evaluate their own arguments through
/// [`EvalContext::eval`], in whatever order they need, and must not
/// attempt to modify the series they receive: outputs that differ from an
/// input are new series. Series names within one result must be unique.
pub trait Function: Send + Sync {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>>;
}

/// Function registry that maps function names to their implementations.
///
/// One implementation may be reachable under several names. Registration
/// takes `&mut self`, so every name is in place before the registry is
/// shared (usually behind an `Arc`) and lookups never contend with writes.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every builtin function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        aggregate::register(&mut registry);
        transform::register(&mut registry);
        window::register(&mut registry);
        filter::register(&mut registry);
        registry
    }

    /// Creates a registry of builtins, minus `config.disabled`, plus
    /// `config.aliases`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFunction`] if a disabled name or alias target
    /// is not registered, and [`Error::DuplicateFunction`] if an alias
    /// collides with a different function.
    pub fn from_config(config: &FunctionsConfig) -> Result<Self> {
        let mut registry = Self::with_builtins();
        for name in &config.disabled {
            if registry.functions.remove(name).is_none() {
                return Err(Error::UnknownFunction(name.clone()));
            }
            tracing::debug!(function = name.as_str(), "disabled function");
        }
        for (alias, target) in &config.aliases {
            registry.register_alias(alias, target)?;
        }
        Ok(registry)
    }

    /// Registers `function` under `name`.
    ///
    /// Registering the same implementation twice under one name is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateFunction`] if a different implementation is
    /// already registered under `name`.
    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn Function>) -> Result<()> {
        let name = name.into();
        if let Some(existing) = self.functions.get(&name) {
            if Arc::ptr_eq(existing, &function) {
                return Ok(());
            }
            return Err(Error::DuplicateFunction(name));
        }
        tracing::trace!(function = name.as_str(), "registered function");
        self.functions.insert(name, function);
        Ok(())
    }

    /// Makes the function registered as `target` reachable as `alias` too.
    pub fn register_alias(&mut self, alias: impl Into<String>, target: &str) -> Result<()> {
        let function = self
            .functions
            .get(target)
            .cloned()
            .ok_or_else(|| Error::UnknownFunction(target.to_string()))?;
        self.register(alias, function)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Inserts `function` under every name in `names`, replacing any
    /// previous entry.
    pub(crate) fn insert_builtin(&mut self, names: &[&str], function: Arc<dyn Function>) {
        for name in names {
            self.functions.insert(name.to_string(), Arc::clone(&function));
        }
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}
