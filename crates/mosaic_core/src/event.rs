//! Triggering events and render requests.

use crate::protocol::{Container, Protocol};
use serde::{Deserialize, Serialize};

/// Reserved operation dispatched to every component of a full render
pub const INITIALIZE_OPERATION: &str = "__Initialize__";

/// Reserved operation dispatched to downstream components of a partial render
pub const RENDERING_OPERATION: &str = "__Rendering__";

/// User interaction that triggers a pass
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Target component name; empty for first open
    #[serde(default)]
    pub component: String,
    /// Operation key on the target component
    #[serde(default)]
    pub operation: String,
    /// Operation payload
    #[serde(default, rename = "operationData")]
    pub payload: Container,
}

impl Event {
    /// Create an event without payload
    #[must_use]
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            payload: Container::new(),
        }
    }

    /// Event used for every component of a full render
    #[must_use]
    pub fn initialize(component: impl Into<String>) -> Self {
        Self::new(component, INITIALIZE_OPERATION)
    }

    /// Event used for downstream components of a partial render
    #[must_use]
    pub fn rendering(component: impl Into<String>) -> Self {
        Self::new(component, RENDERING_OPERATION)
    }

    /// Builder: set the payload
    #[must_use]
    pub fn with_payload(mut self, payload: Container) -> Self {
        self.payload = payload;
        self
    }

    /// Whether the event names a target component
    #[must_use]
    pub fn has_target(&self) -> bool {
        !self.component.is_empty()
    }
}

/// Inbound request for one render pass
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// Scenario key
    pub scenario: String,
    /// Triggering event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    /// Caller parameters, readable through `{{ inParams.key }}`
    #[serde(default, rename = "inParams")]
    pub params: Container,
    /// Snapshot returned by the previous pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    /// Render only this component of the plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_component: Option<String>,
    /// Locale for translated text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl RenderRequest {
    /// Create a first-open request for a scenario
    #[must_use]
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            ..Self::default()
        }
    }

    /// Builder: set the triggering event
    #[must_use]
    pub fn with_event(mut self, event: Event) -> Self {
        self.event = Some(event);
        self
    }

    /// Builder: set the previous snapshot
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Builder: add a caller parameter
    #[must_use]
    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// Builder: restrict the pass to one component
    #[must_use]
    pub fn with_debug_component(mut self, component: impl Into<String>) -> Self {
        self.debug_component = Some(component.into());
        self
    }

    /// Builder: set the locale
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Event target, when the request is an interaction on a component
    #[must_use]
    pub fn target(&self) -> Option<&Event> {
        self.event.as_ref().filter(|e| e.has_target())
    }
}
