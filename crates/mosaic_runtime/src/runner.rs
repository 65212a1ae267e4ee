//! Per-node execution of one render pass.
//!
//! [`PassRunner`] owns the pass's component store. For each node it resolves
//! the node's bindings against components already rendered, copies the
//! component out, runs its renderer on a blocking worker and writes the copy
//! back only when the whole lifecycle succeeded.

use crate::monitor::PassMetrics;
use crate::scheduler::NodeRunner;
use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use mosaic_component::{RenderInput, RenderReport, Registry, Renderer};
use mosaic_core::{Component, Container, CoreError, CoreResult, Event, GlobalState, Translator};
use mosaic_plan::{apply_resolved, BindingResolver, GraphNode, RenderedStates};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::Arc;

/// Shared state of one render pass
pub struct PassRunner {
    scenario: String,
    registry: Arc<Registry>,
    components: RwLock<IndexMap<String, Component>>,
    rendered: RwLock<IndexSet<String>>,
    params: Arc<Container>,
    global: GlobalState,
    locale: String,
    translator: Arc<dyn Translator>,
    metrics: Mutex<PassMetrics>,
    reports: Mutex<Vec<RenderReport>>,
}

impl PassRunner {
    /// Create a runner over the pass's components
    #[must_use]
    pub fn new(
        scenario: impl Into<String>,
        registry: Arc<Registry>,
        components: IndexMap<String, Component>,
        global: GlobalState,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            registry,
            components: RwLock::new(components),
            rendered: RwLock::new(IndexSet::new()),
            params: Arc::new(Container::new()),
            global,
            locale: "en".to_string(),
            translator: Arc::new(mosaic_core::NoopTranslator),
            metrics: Mutex::new(PassMetrics::default()),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Set caller parameters
    #[must_use]
    pub fn with_params(mut self, params: Container) -> Self {
        self.params = Arc::new(params);
        self
    }

    /// Set locale and translator
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>, translator: Arc<dyn Translator>) -> Self {
        self.locale = locale.into();
        self.translator = translator;
        self
    }

    /// Set the planned item count reported in metrics
    #[must_use]
    pub fn with_planned(self, planned: usize) -> Self {
        *self.metrics.lock() = PassMetrics::new(planned);
        self
    }

    /// Take the components back out of the store
    #[must_use]
    pub fn take_components(&self) -> IndexMap<String, Component> {
        std::mem::take(&mut *self.components.write())
    }

    /// Components rendered so far, in completion order
    #[must_use]
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.read().iter().cloned().collect()
    }

    /// Metrics so far
    #[must_use]
    pub fn metrics(&self) -> PassMetrics {
        self.metrics.lock().clone()
    }

    /// Lifecycle reports so far, in completion order
    #[must_use]
    pub fn reports(&self) -> Vec<RenderReport> {
        self.reports.lock().clone()
    }

    /// Resolve bindings and copy the component out of the store
    fn prepare(&self, node: &GraphNode) -> CoreResult<(Component, usize)> {
        let name = node.item.name();
        let components = self.components.read();
        let rendered = self.rendered.read();

        let lookup = RenderedStates::new(&components, &rendered);
        let resolved = BindingResolver::new(&self.params).resolve(name, &node.item.bindings, &lookup)?;

        let mut component = components
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ComponentNotFound {
                scenario: self.scenario.clone(),
                component: name.to_string(),
            })?;
        let written = apply_resolved(&mut component, resolved);
        Ok((component, written))
    }

    async fn render(
        &self,
        renderer: Arc<dyn Renderer>,
        mut component: Component,
        event: Event,
    ) -> CoreResult<(Component, RenderReport)> {
        let name = component.name.clone();
        let params = Arc::clone(&self.params);
        let global = self.global.clone();
        let locale = self.locale.clone();
        let translator = Arc::clone(&self.translator);

        let joined = tokio::task::spawn_blocking(move || {
            let input = RenderInput {
                event: &event,
                params: &params,
                global: &global,
                locale: &locale,
                translator: translator.as_ref(),
            };
            let result = renderer.render(&mut component, &input);
            result.map(|report| (component, report))
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(CoreError::HandlerPanicked {
                component: name,
                message: panic_message(err.into_panic()),
            }),
            Err(err) => Err(CoreError::internal(format!(
                "render of {name} was cancelled: {err}"
            ))),
        }
    }
}

#[async_trait]
impl NodeRunner for PassRunner {
    async fn run(&self, node: &GraphNode) -> CoreResult<()> {
        let name = node.item.name().to_string();
        let operation = node.item.event.operation.clone();

        let outcome = async {
            let (component, written) = self.prepare(node)?;
            let renderer = self.registry.renderer(&self.scenario, &component.type_name)?;
            tracing::debug!(
                scenario = %self.scenario,
                component = %name,
                operation = %operation,
                bindings = written,
                "rendering component"
            );
            let rendered = self.render(renderer, component, node.item.event.clone()).await?;
            Ok::<_, CoreError>((rendered, written))
        }
        .await;

        match outcome {
            Ok(((component, report), written)) => {
                self.components.write().insert(name.clone(), component);
                self.rendered.write().insert(name);
                {
                    let mut metrics = self.metrics.lock();
                    metrics.record_bindings(written);
                    metrics.record_render(report.visible);
                }
                self.reports.lock().push(report);
                Ok(())
            }
            Err(err) => {
                self.metrics.lock().record_failure();
                tracing::error!(
                    scenario = %self.scenario,
                    component = %name,
                    operation = %operation,
                    error = %err,
                    fatal = err.is_fatal(),
                    "component render failed"
                );
                Err(err)
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "unknown panic".to_string(), |s| (*s).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_component::{PassThrough, ScenarioDefinition};
    use mosaic_core::{Protocol, RenderingItem};
    use mosaic_plan::{DependencyGraph, PlannedItem};
    use serde_json::json;

    fn registry(types: Vec<PassThrough>) -> Arc<Registry> {
        let protocol = Protocol::new("issues")
            .with_component(Component::new("filter", "Filter"))
            .with_component(Component::new("list", "Table"));
        let mut definition = ScenarioDefinition::new(protocol);
        for ty in types {
            definition = definition.with_type(ty);
        }
        let mut registry = Registry::new();
        registry.register_scenario(definition).unwrap();
        Arc::new(registry)
    }

    fn components() -> IndexMap<String, Component> {
        let mut map = IndexMap::new();
        map.insert("filter".to_string(), Component::new("filter", "Filter"));
        map.insert(
            "list".to_string(),
            Component::new("list", "Table").with_state("query", json!("stale")),
        );
        map
    }

    fn node(item: RenderingItem, event: Event) -> GraphNode {
        let graph = DependencyGraph::build(
            vec![PlannedItem::new(item, event).unwrap()],
            &IndexMap::new(),
        )
        .unwrap();
        graph.into_nodes().remove(0)
    }

    #[tokio::test]
    async fn test_binding_from_rendered_component() {
        let filter = PassThrough::new("Filter").on_initialize(|m, _| {
            m.state.insert("selectedValue".to_string(), json!("urgent"));
            Ok(())
        });
        let runner = PassRunner::new(
            "issues",
            registry(vec![filter, PassThrough::new("Table")]),
            components(),
            GlobalState::new(),
        );

        runner
            .run(&node(RenderingItem::new("filter"), Event::initialize("filter")))
            .await
            .unwrap();
        runner
            .run(&node(
                RenderingItem::new("list").bind("query", "{{ filter.selectedValue }}"),
                Event::initialize("list"),
            ))
            .await
            .unwrap();

        let components = runner.take_components();
        assert_eq!(components["list"].state_value("query"), Some(&json!("urgent")));
        assert_eq!(runner.rendered(), vec!["filter", "list"]);
        assert_eq!(runner.metrics().bindings_resolved, 1);
    }

    #[tokio::test]
    async fn test_binding_before_source_rendered() {
        let runner = PassRunner::new(
            "issues",
            registry(vec![PassThrough::new("Filter"), PassThrough::new("Table")]),
            components(),
            GlobalState::new(),
        );
        let err = runner
            .run(&node(
                RenderingItem::new("list").bind("query", "{{ filter.selectedValue }}"),
                Event::initialize("list"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UndeclaredDependency { .. }));
        assert_eq!(runner.metrics().failed, 1);
    }

    #[tokio::test]
    async fn test_unregistered_operation_leaves_component_untouched() {
        let runner = PassRunner::new(
            "issues",
            registry(vec![PassThrough::new("Table")]),
            components(),
            GlobalState::new(),
        )
        .with_params(
            [("q".to_string(), json!("fresh"))].into_iter().collect(),
        );
        let err = runner
            .run(&node(
                RenderingItem::new("list").bind("query", "{{ inParams.q }}"),
                Event::new("list", "delete"),
            ))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        let components = runner.take_components();
        assert_eq!(components["list"].state_value("query"), Some(&json!("stale")));
        assert!(components["list"].data.is_none());
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let table = PassThrough::new("Table").on_rendering(|_, _| panic!("table exploded"));
        let runner = PassRunner::new(
            "issues",
            registry(vec![table]),
            components(),
            GlobalState::new(),
        );
        let err = runner
            .run(&node(RenderingItem::new("list"), Event::rendering("list")))
            .await
            .unwrap_err();

        match err {
            CoreError::HandlerPanicked { component, message } => {
                assert_eq!(component, "list");
                assert_eq!(message, "table exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_renderer() {
        let runner = PassRunner::new("issues", registry(Vec::new()), components(), GlobalState::new());
        let err = runner
            .run(&node(RenderingItem::new("filter"), Event::initialize("filter")))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RendererNotFound { .. }));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(7)), "unknown panic");
    }
}
