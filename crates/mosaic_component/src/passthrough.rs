//! Pass-through component type.
//!
//! [`PassThrough`] keeps the generic containers as its model, so decode and
//! encode are exact copies. Behavior is attached with closures, which makes it
//! the type of choice for command-line rendering and for tests.

use crate::component::{ComponentType, Handler, OperationContext, OperationTable};
use mosaic_core::{Component, Container, CoreResult};
use serde_json::Value;
use std::sync::Arc;

/// Model of a pass-through component: its generic containers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericModel {
    /// Static properties
    pub props: Container,
    /// Rendered data
    pub data: Container,
    /// Interactive state
    pub state: Container,
}

type Visibility = Arc<dyn Fn(&GenericModel, &OperationContext<'_>) -> bool + Send + Sync>;

/// Component type whose model is the generic containers
#[derive(Clone)]
pub struct PassThrough {
    type_name: String,
    operations: OperationTable<GenericModel>,
    initialize: Option<Handler<GenericModel>>,
    rendering: Option<Handler<GenericModel>>,
    visibility: Option<Visibility>,
    flatten: bool,
}

impl PassThrough {
    /// Create a pass-through type without operations
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            operations: OperationTable::new(),
            initialize: None,
            rendering: None,
            visibility: None,
            flatten: false,
        }
    }

    /// Declare an operation
    #[must_use]
    pub fn with_operation<F>(mut self, key: &str, f: F) -> Self
    where
        F: Fn(&mut GenericModel, &OperationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.operations.register_fn(key, f);
        self
    }

    /// Set the initialize handler
    #[must_use]
    pub fn on_initialize<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut GenericModel, &OperationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.initialize = Some(Arc::new(f));
        self
    }

    /// Set the rendering handler
    #[must_use]
    pub fn on_rendering<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut GenericModel, &OperationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.rendering = Some(Arc::new(f));
        self
    }

    /// Set the visibility predicate
    #[must_use]
    pub fn with_visibility<F>(mut self, f: F) -> Self
    where
        F: Fn(&GenericModel, &OperationContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.visibility = Some(Arc::new(f));
        self
    }

    /// Always flatten `extra` objects
    #[must_use]
    pub fn flattening(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }
}

impl ComponentType for PassThrough {
    type Model = GenericModel;

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn construct(&self) -> GenericModel {
        GenericModel::default()
    }

    fn decode(&self, model: &mut GenericModel, component: &Component, _params: &Container) -> CoreResult<()> {
        model.props = component.props.clone().unwrap_or_default();
        model.data = component.data.clone().unwrap_or_default();
        model.state = component.state.clone().unwrap_or_default();
        Ok(())
    }

    fn encode(&self, model: &GenericModel, component: &mut Component) -> CoreResult<()> {
        component.props = Some(model.props.clone());
        component.data = Some(model.data.clone());
        component.state = Some(model.state.clone());
        Ok(())
    }

    /// Custom predicate if set, otherwise visible unless `props.hidden` is `true`
    fn visible(&self, model: &GenericModel, ctx: &OperationContext<'_>) -> bool {
        match &self.visibility {
            Some(predicate) => predicate(model, ctx),
            None => model.props.get("hidden").and_then(Value::as_bool) != Some(true),
        }
    }

    fn operations(&self) -> OperationTable<GenericModel> {
        self.operations.clone()
    }

    fn initialize(&self, model: &mut GenericModel, ctx: &OperationContext<'_>) -> CoreResult<()> {
        self.initialize.as_ref().map_or(Ok(()), |h| h(model, ctx))
    }

    fn rendering(&self, model: &mut GenericModel, ctx: &OperationContext<'_>) -> CoreResult<()> {
        self.rendering.as_ref().map_or(Ok(()), |h| h(model, ctx))
    }

    fn flatten_extra(&self) -> bool {
        self.flatten
    }
}
