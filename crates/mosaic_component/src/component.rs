//! Component type capability set and per-pass operation tables.

use indexmap::IndexMap;
use mosaic_core::{Component, Container, CoreResult, GlobalState, Translator};
use std::sync::Arc;

/// Operation handler over a typed model
pub type Handler<M> = Arc<dyn Fn(&mut M, &OperationContext<'_>) -> CoreResult<()> + Send + Sync>;

/// Execution context handed to every hook and handler
pub struct OperationContext<'a> {
    /// Component being rendered
    pub component: &'a str,
    /// Operation key being dispatched
    pub operation: &'a str,
    /// Event payload
    pub payload: &'a Container,
    /// Caller parameters
    pub params: &'a Container,
    /// Pass-scoped global state
    pub global: &'a GlobalState,
    /// Request locale
    pub locale: &'a str,
    /// Text lookup
    pub translator: &'a dyn Translator,
}

impl OperationContext<'_> {
    /// Translated text for `key` in the request locale, or the key itself
    #[must_use]
    pub fn text(&self, key: &str) -> String {
        self.translator.text_or_key(self.locale, key)
    }
}

impl std::fmt::Debug for OperationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("component", &self.component)
            .field("operation", &self.operation)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

/// Operation key to handler lookup, built fresh for each render
pub struct OperationTable<M> {
    handlers: IndexMap<String, Handler<M>>,
}

impl<M> OperationTable<M> {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: IndexMap::new(),
        }
    }

    /// Register a handler, returning the one it replaces
    pub fn register(&mut self, key: impl Into<String>, handler: Handler<M>) -> Option<Handler<M>> {
        self.handlers.insert(key.into(), handler)
    }

    /// Register a handler from a closure
    pub fn register_fn<F>(&mut self, key: impl Into<String>, f: F)
    where
        F: Fn(&mut M, &OperationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.register(key, Arc::new(f));
    }

    /// Builder form of [`OperationTable::register_fn`]
    #[must_use]
    pub fn with<F>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut M, &OperationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.register_fn(key, f);
        self
    }

    /// Register a reserved handler; it replaces any declared handler with the same key
    pub fn reserve<F>(&mut self, key: &str, f: F)
    where
        F: Fn(&mut M, &OperationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        if self.handlers.insert(key.to_string(), Arc::new(f)).is_some() {
            tracing::warn!(
                operation = %key,
                "declared handler shadowed by reserved operation"
            );
        }
    }

    /// Get a handler
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Handler<M>> {
        self.handlers.get(key)
    }

    /// Check if an operation is registered
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// Registered keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<M> Default for OperationTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for OperationTable<M> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

/// Capability set of one component type.
///
/// A type owns a typed model that is decoded from and encoded back into the
/// generic component containers around operation dispatch. Only `construct`,
/// `decode` and `encode` are required; every hook defaults to a no-op.
pub trait ComponentType: Send + Sync + 'static {
    /// Typed model of the component
    type Model: Send + 'static;

    /// Type name used for renderer lookup
    fn type_name(&self) -> &str;

    /// Fresh model for one render
    fn construct(&self) -> Self::Model;

    /// Fill the model from the generic containers and caller parameters
    ///
    /// # Errors
    ///
    /// Returns error if the containers do not match the model
    fn decode(&self, model: &mut Self::Model, component: &Component, params: &Container)
        -> CoreResult<()>;

    /// Write the model back into the generic containers
    ///
    /// # Errors
    ///
    /// Returns error if the model cannot be represented
    fn encode(&self, model: &Self::Model, component: &mut Component) -> CoreResult<()>;

    /// Visibility predicate; invisible components skip operation dispatch
    fn visible(&self, _model: &Self::Model, _ctx: &OperationContext<'_>) -> bool {
        true
    }

    /// Declared operations
    fn operations(&self) -> OperationTable<Self::Model> {
        OperationTable::new()
    }

    /// Handler of the reserved initialize operation
    ///
    /// # Errors
    ///
    /// Returns error if initialization fails
    fn initialize(&self, _model: &mut Self::Model, _ctx: &OperationContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    /// Handler of the reserved rendering operation
    ///
    /// # Errors
    ///
    /// Returns error if re-rendering fails
    fn rendering(&self, _model: &mut Self::Model, _ctx: &OperationContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    /// Hook run before the operation handler
    ///
    /// # Errors
    ///
    /// Returns error to abort the render
    fn before(&self, _model: &mut Self::Model, _ctx: &OperationContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    /// Hook run after the operation handler
    ///
    /// # Errors
    ///
    /// Returns error to abort the render
    fn after(&self, _model: &mut Self::Model, _ctx: &OperationContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    /// Hook run last on every render, visible or not
    ///
    /// # Errors
    ///
    /// Returns error to abort the render
    fn finalize(&self, _component: &mut Component, _ctx: &OperationContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    /// Always flatten `extra` objects, regardless of component options
    fn flatten_extra(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::NoopTranslator;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        hits: u32,
    }

    fn context<'a>(
        global: &'a GlobalState,
        empty: &'a Container,
        translator: &'a dyn Translator,
    ) -> OperationContext<'a> {
        OperationContext {
            component: "counter",
            operation: "hit",
            payload: empty,
            params: empty,
            global,
            locale: "en",
            translator,
        }
    }

    #[test]
    fn test_table_register_and_dispatch() {
        let table = OperationTable::<Counter>::new().with("hit", |m, ctx| {
            m.hits += 1;
            ctx.global.set("last", json!(ctx.component));
            Ok(())
        });
        assert!(table.contains("hit"));
        assert_eq!(table.len(), 1);

        let global = GlobalState::new();
        let empty = Container::new();
        let ctx = context(&global, &empty, &NoopTranslator);
        let mut model = Counter::default();
        (table.get("hit").unwrap())(&mut model, &ctx).unwrap();

        assert_eq!(model.hits, 1);
        assert_eq!(global.get("last"), Some(json!("counter")));
    }

    #[test]
    fn test_reserved_key_wins() {
        let mut table = OperationTable::<Counter>::new().with("__Initialize__", |m, _| {
            m.hits = 100;
            Ok(())
        });
        table.reserve("__Initialize__", |m, _| {
            m.hits = 1;
            Ok(())
        });

        let global = GlobalState::new();
        let empty = Container::new();
        let ctx = context(&global, &empty, &NoopTranslator);
        let mut model = Counter::default();
        (table.get("__Initialize__").unwrap())(&mut model, &ctx).unwrap();
        assert_eq!(model.hits, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_keys_keep_registration_order() {
        let table = OperationTable::<Counter>::new()
            .with("b", |_, _| Ok(()))
            .with("a", |_, _| Ok(()));
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(table.get("missing").is_none());
    }

    #[test]
    fn test_context_text_falls_back_to_key() {
        let global = GlobalState::new();
        let empty = Container::new();
        let ctx = context(&global, &empty, &NoopTranslator);
        assert_eq!(ctx.text("label.title"), "label.title");
    }
}
