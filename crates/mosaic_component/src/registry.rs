//! Scenario registry.
//!
//! Maps a scenario key to its default protocol and to the renderer bound to
//! each component type. The registry is filled once at startup, then
//! installed behind a process-wide barrier and only read afterwards.

use crate::component::ComponentType;
use crate::framework::{Framework, Renderer};
use indexmap::IndexMap;
use mosaic_core::{CoreError, CoreResult, Protocol};
use mosaic_plan::ProtocolValidator;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

/// Default protocol and renderers of one scenario
#[derive(Clone)]
pub struct ScenarioDefinition {
    /// Scenario key
    pub key: String,
    /// Default protocol document
    pub protocol: Protocol,
    renderers: IndexMap<String, Arc<dyn Renderer>>,
}

impl ScenarioDefinition {
    /// Create a definition keyed by the protocol's scenario
    #[must_use]
    pub fn new(mut protocol: Protocol) -> Self {
        protocol.sync_names();
        Self {
            key: protocol.scenario.clone(),
            protocol,
            renderers: IndexMap::new(),
        }
    }

    /// Bind a renderer to its component type within this scenario
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderers
            .insert(renderer.type_name().to_string(), renderer);
        self
    }

    /// Bind a component type within this scenario
    #[must_use]
    pub fn with_type<C: ComponentType>(self, component_type: C) -> Self {
        self.with_renderer(Framework::new(component_type).into_renderer())
    }

    /// Component types bound in this scenario
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.renderers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ScenarioDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioDefinition")
            .field("key", &self.key)
            .field("components", &self.protocol.components.len())
            .field("types", &self.renderers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registry of scenarios and component renderers
pub struct Registry {
    scenarios: IndexMap<String, ScenarioDefinition>,
    shared: IndexMap<String, Arc<dyn Renderer>>,
    validator: ProtocolValidator,
}

impl Registry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            scenarios: IndexMap::new(),
            shared: IndexMap::new(),
            validator: ProtocolValidator::new(),
        }
    }

    /// Use a custom validator for scenario registration
    #[must_use]
    pub fn with_validator(mut self, validator: ProtocolValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Register a scenario
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidProtocol`] if the scenario is already
    /// registered or its default protocol fails validation
    pub fn register_scenario(&mut self, definition: ScenarioDefinition) -> CoreResult<()> {
        if self.scenarios.contains_key(&definition.key) {
            return Err(CoreError::InvalidProtocol {
                scenario: definition.key,
                reason: "scenario already registered".to_string(),
            });
        }
        self.validator.check(&definition.protocol)?;

        tracing::debug!(
            scenario = %definition.key,
            components = definition.protocol.components.len(),
            types = definition.renderers.len(),
            "registered scenario"
        );
        self.scenarios.insert(definition.key.clone(), definition);
        Ok(())
    }

    /// Register a renderer available to every scenario
    pub fn register_shared(&mut self, renderer: Arc<dyn Renderer>) {
        let type_name = renderer.type_name().to_string();
        if self.shared.insert(type_name.clone(), renderer).is_some() {
            tracing::warn!(type_name = %type_name, "shared renderer replaced");
        }
    }

    /// Register a component type available to every scenario
    pub fn register_type<C: ComponentType>(&mut self, component_type: C) {
        self.register_shared(Framework::new(component_type).into_renderer());
    }

    /// Get a scenario
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownScenario`] if not registered
    pub fn scenario(&self, key: &str) -> CoreResult<&ScenarioDefinition> {
        self.scenarios
            .get(key)
            .ok_or_else(|| CoreError::UnknownScenario {
                scenario: key.to_string(),
            })
    }

    /// Default protocol of a scenario
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownScenario`] if not registered
    pub fn default_protocol(&self, key: &str) -> CoreResult<&Protocol> {
        self.scenario(key).map(|s| &s.protocol)
    }

    /// Renderer for a component type, scenario binding first
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RendererNotFound`] if neither the scenario nor
    /// the shared table binds the type
    pub fn renderer(&self, scenario: &str, type_name: &str) -> CoreResult<Arc<dyn Renderer>> {
        let definition = self.scenario(scenario)?;
        definition
            .renderers
            .get(type_name)
            .or_else(|| self.shared.get(type_name))
            .map(Arc::clone)
            .ok_or_else(|| CoreError::RendererNotFound {
                scenario: scenario.to_string(),
                type_name: type_name.to_string(),
            })
    }

    /// Registered scenario keys
    #[must_use]
    pub fn scenarios(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    /// Get the count of registered scenarios
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Install as the process-wide registry
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] if a registry is already installed
    pub fn install(self) -> CoreResult<Arc<Registry>> {
        let registry = Arc::new(self);
        GLOBAL
            .set(Arc::clone(&registry))
            .map_err(|_| CoreError::internal("registry already installed"))?;
        tracing::info!(scenarios = registry.len(), "registry installed");
        Ok(registry)
    }

    /// The process-wide registry
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] if no registry is installed
    pub fn global() -> CoreResult<Arc<Registry>> {
        GLOBAL
            .get()
            .cloned()
            .ok_or_else(|| CoreError::internal("registry not installed"))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
