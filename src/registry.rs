//! The action registry.
//!
//! Two independent tables behind one reader/writer lock: action name →
//! handler, and alias → canonical name. Writes (register, unregister,
//! mapping) take the exclusive side, lookups take the shared side. A lookup
//! clones the handler's `Arc` and drops the lock before anything calls it,
//! so a slow handler never blocks registry mutation or other lookups.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::handler::{Handler, Middleware, compose};

#[derive(Default)]
struct Tables {
    handlers: HashMap<String, Handler>,
    mappings: HashMap<String, String>,
}

/// Concurrency-safe action name → handler mapping with one-hop aliases.
#[derive(Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, wrapped by `middlewares` once, here.
    /// Re-registering a name replaces the previous handler.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn register(&self, name: &str, handler: Handler, middlewares: &[Middleware]) {
        if name.is_empty() {
            panic!("Registry::register: the action name must not be empty");
        }

        let handler = compose(middlewares, handler);
        self.tables.write().handlers.insert(name.to_owned(), handler);
        debug!(action = name, middlewares = middlewares.len(), "registered action");
    }

    /// Removes the handler registered under `name`, if any. Aliases pointing
    /// at `name` stay in place and resolve to nothing until it is registered
    /// again.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn unregister(&self, name: &str) {
        if name.is_empty() {
            panic!("Registry::unregister: the action name must not be empty");
        }

        if self.tables.write().handlers.remove(name).is_some() {
            debug!(action = name, "unregistered action");
        }
    }

    /// Makes `from` an alias of `to`. `to` does not have to be registered
    /// yet; it is looked up at call time.
    ///
    /// # Panics
    ///
    /// Panics if either name is empty.
    pub fn mapping(&self, from: &str, to: &str) {
        if from.is_empty() || to.is_empty() {
            panic!("Registry::mapping: the action name must not be empty");
        }

        self.tables.write().mappings.insert(from.to_owned(), to.to_owned());
        debug!(from, to, "mapped action");
    }

    /// Looks `name` up directly, then through at most one alias.
    pub fn resolve(&self, name: &str) -> Option<Handler> {
        let tables = self.tables.read();
        if let Some(handler) = tables.handlers.get(name) {
            return Some(Arc::clone(handler));
        }
        let target = tables.mappings.get(name)?;
        tables.handlers.get(target).map(Arc::clone)
    }

    /// Names of the registered actions. Aliases are not included.
    pub fn services(&self) -> Vec<String> {
        self.tables.read().handlers.keys().cloned().collect()
    }

    /// A copy of the alias table.
    pub fn mappings(&self) -> HashMap<String, String> {
        self.tables.read().mappings.clone()
    }
}
