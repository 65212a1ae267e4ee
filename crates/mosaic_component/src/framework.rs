//! Component framework: the per-render lifecycle.
//!
//! [`Framework`] drives one component through
//! `Uninitialized -> Decoded -> (Skipped | OperationHandled) -> Encoded -> Finalized`
//! and is erased to [`Renderer`] so the registry can hold any component type.

use crate::component::{ComponentType, OperationContext, OperationTable};
use mosaic_core::{
    Component, Container, CoreError, CoreResult, Event, GlobalState, Translator, EXTRA_KEY,
    INITIALIZE_OPERATION, RENDERING_OPERATION,
};
use serde::Serialize;
use std::sync::Arc;

/// Lifecycle state of one component render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LifecycleState {
    /// Nothing done yet
    Uninitialized,
    /// Model decoded from the generic containers
    Decoded,
    /// Visibility predicate was false, no operation dispatched
    Skipped,
    /// Operation handler completed
    OperationHandled,
    /// Model encoded back
    Encoded,
    /// Finalize hook ran and visibility persisted
    Finalized,
}

impl LifecycleState {
    /// States reachable from `self`
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [LifecycleState] {
        use LifecycleState::*;
        match self {
            Uninitialized => &[Decoded],
            Decoded => &[Skipped, OperationHandled],
            Skipped | OperationHandled => &[Encoded],
            Encoded => &[Finalized],
            Finalized => &[],
        }
    }

    /// Check a transition
    #[must_use]
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

/// Visited lifecycle states of one render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleTrace {
    states: Vec<LifecycleState>,
}

impl LifecycleTrace {
    /// Start a trace in [`LifecycleState::Uninitialized`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: vec![LifecycleState::Uninitialized],
        }
    }

    /// Current state
    #[must_use]
    pub fn current(&self) -> LifecycleState {
        self.states
            .last()
            .copied()
            .unwrap_or(LifecycleState::Uninitialized)
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on an illegal transition
    pub fn advance(&mut self, component: &str, next: LifecycleState) -> CoreResult<()> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(CoreError::internal(format!(
                "illegal lifecycle transition {from:?} -> {next:?} on component {component}"
            )));
        }
        tracing::trace!(component = %component, ?from, to = ?next, "lifecycle transition");
        self.states.push(next);
        Ok(())
    }

    /// Visited states in order
    #[must_use]
    pub fn states(&self) -> &[LifecycleState] {
        &self.states
    }
}

impl Default for LifecycleTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one successful component render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderReport {
    /// Component name
    pub component: String,
    /// Component type
    pub type_name: String,
    /// Dispatched operation key
    pub operation: String,
    /// Visibility predicate result
    pub visible: bool,
    /// Visited lifecycle states
    pub trace: LifecycleTrace,
}

/// Inputs shared by every render of a pass
pub struct RenderInput<'a> {
    /// Event dispatched to the component
    pub event: &'a Event,
    /// Caller parameters
    pub params: &'a Container,
    /// Pass-scoped global state
    pub global: &'a GlobalState,
    /// Request locale
    pub locale: &'a str,
    /// Text lookup
    pub translator: &'a dyn Translator,
}

/// Type-erased component renderer
pub trait Renderer: Send + Sync {
    /// Component type served by this renderer
    fn type_name(&self) -> &str;

    /// Run the full lifecycle over `component`
    ///
    /// # Errors
    ///
    /// Returns error if any lifecycle step fails; `component` may then be
    /// partially updated and must be discarded by the caller
    fn render(&self, component: &mut Component, input: &RenderInput<'_>) -> CoreResult<RenderReport>;
}

/// Lifecycle driver for one component type
pub struct Framework<C: ComponentType> {
    component_type: Arc<C>,
}

impl<C: ComponentType> Framework<C> {
    /// Create a new framework for a component type
    #[must_use]
    pub fn new(component_type: C) -> Self {
        Self {
            component_type: Arc::new(component_type),
        }
    }

    /// Erase into a shared renderer
    #[must_use]
    pub fn into_renderer(self) -> Arc<dyn Renderer> {
        Arc::new(self)
    }

    /// Build this render's operation table.
    ///
    /// Declared operations come first; the reserved keys are registered
    /// last so they always win.
    fn operation_table(&self) -> OperationTable<C::Model> {
        let mut table = self.component_type.operations();

        let ty = Arc::clone(&self.component_type);
        table.reserve(INITIALIZE_OPERATION, move |model, ctx| ty.initialize(model, ctx));
        let ty = Arc::clone(&self.component_type);
        table.reserve(RENDERING_OPERATION, move |model, ctx| ty.rendering(model, ctx));
        table
    }

    fn dispatch(
        &self,
        model: &mut C::Model,
        table: &OperationTable<C::Model>,
        ctx: &OperationContext<'_>,
    ) -> CoreResult<()> {
        let ty = &self.component_type;
        ty.before(model, ctx)?;

        let handler = table
            .get(ctx.operation)
            .ok_or_else(|| CoreError::OperationNotRegistered {
                component: ctx.component.to_string(),
                operation: ctx.operation.to_string(),
            })?;
        handler(model, ctx)?;

        ty.after(model, ctx)
    }
}

impl<C: ComponentType> Renderer for Framework<C> {
    fn type_name(&self) -> &str {
        self.component_type.type_name()
    }

    fn render(&self, component: &mut Component, input: &RenderInput<'_>) -> CoreResult<RenderReport> {
        let ty = &self.component_type;
        let name = component.name.clone();
        let mut trace = LifecycleTrace::new();

        component.normalize();
        let mut model = ty.construct();
        let table = self.operation_table();

        let ctx = OperationContext {
            component: &name,
            operation: &input.event.operation,
            payload: &input.event.payload,
            params: input.params,
            global: input.global,
            locale: input.locale,
            translator: input.translator,
        };

        let mut visible = None;
        let outcome = (|| -> CoreResult<()> {
            ty.decode(&mut model, component, input.params)
                .map_err(|e| codec_error(&name, e))?;
            trace.advance(&name, LifecycleState::Decoded)?;

            let shown = ty.visible(&model, &ctx);
            visible = Some(shown);
            if shown {
                self.dispatch(&mut model, &table, &ctx)?;
                trace.advance(&name, LifecycleState::OperationHandled)?;
            } else {
                tracing::debug!(component = %name, "component invisible, skipping operation");
                trace.advance(&name, LifecycleState::Skipped)?;
            }

            ty.encode(&model, component)
                .map_err(|e| codec_error(&name, e))?;
            let flat = ty.flatten_extra() || component.options.as_ref().is_some_and(|o| o.flat_extra);
            if flat {
                flatten_extra(component.data_mut());
                flatten_extra(component.props_mut());
            }
            trace.advance(&name, LifecycleState::Encoded)
        })();

        let finalized = ty.finalize(component, &ctx);
        if let Some(shown) = visible {
            component.options_mut().visible = shown;
        }
        outcome?;
        finalized?;
        let visible = visible.unwrap_or_default();
        trace.advance(&name, LifecycleState::Finalized)?;

        Ok(RenderReport {
            component: name,
            type_name: ty.type_name().to_string(),
            operation: input.event.operation.clone(),
            visible,
            trace,
        })
    }
}

fn codec_error(component: &str, err: CoreError) -> CoreError {
    match err {
        CoreError::Codec { .. } => err,
        other => CoreError::Codec {
            component: component.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Move the entries of a nested `extra` object into its parent.
///
/// Existing parent keys are kept. Returns the number of entries moved.
pub fn flatten_extra(container: &mut Container) -> usize {
    let Some(serde_json::Value::Object(extra)) = container.get(EXTRA_KEY) else {
        return 0;
    };
    let extra = extra.clone();
    container.shift_remove(EXTRA_KEY);

    let mut moved = 0;
    for (key, value) in extra {
        if container.contains_key(&key) {
            tracing::debug!(key = %key, "extra entry shadowed by existing key");
            continue;
        }
        container.insert(key, value);
        moved += 1;
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::OperationTable;
    use mosaic_core::{NoopTranslator, RenderOptions};
    use serde_json::{json, Value};

    /// Model mirroring the state container
    struct Form;

    #[derive(Default)]
    struct FormModel {
        state: Container,
        hidden: bool,
    }

    impl ComponentType for Form {
        type Model = FormModel;

        fn type_name(&self) -> &str {
            "Form"
        }

        fn construct(&self) -> FormModel {
            FormModel::default()
        }

        fn decode(&self, model: &mut FormModel, component: &Component, params: &Container) -> CoreResult<()> {
            model.state = component.state.clone().unwrap_or_default();
            model.hidden = params.get("hide").and_then(Value::as_bool).unwrap_or(false);
            if model.state.get("broken").is_some() {
                return Err(CoreError::internal("cannot decode broken state"));
            }
            Ok(())
        }

        fn encode(&self, model: &FormModel, component: &mut Component) -> CoreResult<()> {
            component.state = Some(model.state.clone());
            Ok(())
        }

        fn visible(&self, model: &FormModel, _ctx: &OperationContext<'_>) -> bool {
            !model.hidden
        }

        fn operations(&self) -> OperationTable<FormModel> {
            OperationTable::<FormModel>::new()
                .with("submit", |m, ctx| {
                    m.state.insert("submitted".to_string(), json!(true));
                    ctx.global.set("submitted_by", json!(ctx.component));
                    Ok(())
                })
                .with("fail", |_, ctx| Err(CoreError::handler(ctx.component, "rejected")))
                .with(INITIALIZE_OPERATION, |m, _| {
                    m.state.insert("shadowed".to_string(), json!(true));
                    Ok(())
                })
        }

        fn initialize(&self, model: &mut FormModel, _ctx: &OperationContext<'_>) -> CoreResult<()> {
            model.state.insert("ready".to_string(), json!(true));
            Ok(())
        }

        fn finalize(&self, _component: &mut Component, ctx: &OperationContext<'_>) -> CoreResult<()> {
            ctx.global.set("finalized", json!(ctx.component));
            Ok(())
        }
    }

    struct Harness {
        params: Container,
        global: GlobalState,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                params: Container::new(),
                global: GlobalState::new(),
            }
        }

        fn render(&self, component: &mut Component, event: &Event) -> CoreResult<RenderReport> {
            let input = RenderInput {
                event,
                params: &self.params,
                global: &self.global,
                locale: "en",
                translator: &NoopTranslator,
            };
            Framework::new(Form).render(component, &input)
        }
    }

    #[test]
    fn test_initialize_uses_reserved_handler() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form");
        let report = harness
            .render(&mut component, &Event::initialize("form"))
            .unwrap();

        assert_eq!(component.state_value("ready"), Some(&json!(true)));
        assert_eq!(component.state_value("shadowed"), None);
        assert!(report.visible);
        assert_eq!(
            report.trace.states(),
            &[
                LifecycleState::Uninitialized,
                LifecycleState::Decoded,
                LifecycleState::OperationHandled,
                LifecycleState::Encoded,
                LifecycleState::Finalized,
            ]
        );
    }

    #[test]
    fn test_declared_operation_dispatch() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form");
        harness
            .render(&mut component, &Event::new("form", "submit"))
            .unwrap();
        assert_eq!(component.state_value("submitted"), Some(&json!(true)));
        assert_eq!(harness.global.get("submitted_by"), Some(json!("form")));
    }

    #[test]
    fn test_unregistered_operation_is_fatal() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form");
        let err = harness
            .render(&mut component, &Event::new("form", "delete"))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, CoreError::OperationNotRegistered { ref operation, .. } if operation == "delete"));
    }

    #[test]
    fn test_handler_failure_propagates() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form");
        let err = harness
            .render(&mut component, &Event::new("form", "fail"))
            .unwrap_err();
        assert!(matches!(err, CoreError::HandlerFailed { .. }));
    }

    #[test]
    fn test_invisible_component_skips_dispatch() {
        let mut harness = Harness::new();
        harness.params.insert("hide".to_string(), json!(true));
        let mut component = Component::new("form", "Form");
        let report = harness
            .render(&mut component, &Event::new("form", "delete"))
            .unwrap();

        assert!(!report.visible);
        assert!(!component.is_visible());
        assert!(report.trace.states().contains(&LifecycleState::Skipped));
    }

    #[test]
    fn test_decode_error_becomes_codec_error() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form").with_state("broken", json!(1));
        let err = harness
            .render(&mut component, &Event::initialize("form"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Codec { ref component, .. } if component == "form"));
    }

    #[test]
    fn test_finalize_runs_after_decode_error() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form").with_state("broken", json!(1));
        component.options_mut().visible = false;
        harness
            .render(&mut component, &Event::initialize("form"))
            .unwrap_err();

        assert_eq!(harness.global.get("finalized"), Some(json!("form")));
        assert!(!component.is_visible());
    }

    #[test]
    fn test_finalize_runs_after_handler_error() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form");
        harness
            .render(&mut component, &Event::new("form", "fail"))
            .unwrap_err();

        assert_eq!(harness.global.get("finalized"), Some(json!("form")));
        assert!(component.is_visible());
    }

    #[test]
    fn test_decode_encode_round_trip() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form")
            .with_state("values", json!({"status": ["open"]}))
            .with_state("page", json!(2));
        let before = component.state.clone();
        harness
            .render(&mut component, &Event::rendering("form"))
            .unwrap();
        assert_eq!(component.state, before);
    }

    #[test]
    fn test_flat_extra_option() {
        let harness = Harness::new();
        let mut component = Component::new("form", "Form")
            .with_data("rows", json!([]))
            .with_data("extra", json!({"total": 3, "rows": "ignored"}));
        component.options = Some(RenderOptions {
            visible: true,
            flat_extra: true,
        });
        harness
            .render(&mut component, &Event::rendering("form"))
            .unwrap();

        let data = component.data.as_ref().unwrap();
        assert_eq!(data.get("total"), Some(&json!(3)));
        assert_eq!(data.get("rows"), Some(&json!([])));
        assert!(!data.contains_key("extra"));
    }

    #[test]
    fn test_flatten_extra_ignores_non_objects() {
        let mut container = Container::new();
        container.insert("extra".to_string(), json!("text"));
        assert_eq!(flatten_extra(&mut container), 0);
        assert!(container.contains_key("extra"));
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(LifecycleState::Uninitialized.can_transition_to(LifecycleState::Decoded));
        assert!(LifecycleState::Decoded.can_transition_to(LifecycleState::Skipped));
        assert!(!LifecycleState::Skipped.can_transition_to(LifecycleState::OperationHandled));
        assert!(LifecycleState::Finalized.allowed_transitions().is_empty());

        let mut trace = LifecycleTrace::new();
        let err = trace.advance("x", LifecycleState::Encoded).unwrap_err();
        assert!(matches!(err, CoreError::Internal { .. }));
        assert_eq!(trace.current(), LifecycleState::Uninitialized);
    }
}
