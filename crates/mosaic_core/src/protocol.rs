//! Protocol documents.
//!
//! A [`Protocol`] is the whole server-driven page for one scenario: the
//! components, how they nest, which components re-render after which, and
//! the global state of the current pass. It is what clients send back as a
//! snapshot on the next interaction.

use crate::error::CoreResult;
use crate::state::GlobalState;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generic key/value container used for component data, state, props and operations
pub type Container = IndexMap<String, Value>;

/// Rendering key holding the scenario's default full-render list
pub const DEFAULT_RENDERING_KEY: &str = "__DefaultRendering__";

/// Key of the nested metadata object that may be flattened into its parent
pub const EXTRA_KEY: &str = "extra";

/// Per-component render options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// Result of the visibility predicate in the last pass
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Flatten `data.extra` / `props.extra` into their parent after encoding
    #[serde(default)]
    pub flat_extra: bool,
}

fn default_visible() -> bool {
    true
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            visible: true,
            flat_extra: false,
        }
    }
}

/// One named, typed component of a scenario
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component name, unique within a protocol
    #[serde(default)]
    pub name: String,
    /// Component type used to look up the renderer
    #[serde(rename = "type")]
    pub type_name: String,
    /// Component version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Static presentation properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Container>,
    /// Rendered data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Container>,
    /// Interactive state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Container>,
    /// Operations exposed to the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<Container>,
    /// Render options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RenderOptions>,
}

impl Component {
    /// Create a component with empty containers
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Make every container present so later steps never branch on absence
    pub fn normalize(&mut self) {
        self.props.get_or_insert_with(Container::new);
        self.data.get_or_insert_with(Container::new);
        self.state.get_or_insert_with(Container::new);
        self.operations.get_or_insert_with(Container::new);
        self.options.get_or_insert_with(RenderOptions::default);
    }

    /// Read a state value
    #[must_use]
    pub fn state_value(&self, key: &str) -> Option<&Value> {
        self.state.as_ref().and_then(|s| s.get(key))
    }

    /// Mutable state container, created if absent
    pub fn state_mut(&mut self) -> &mut Container {
        self.state.get_or_insert_with(Container::new)
    }

    /// Mutable data container, created if absent
    pub fn data_mut(&mut self) -> &mut Container {
        self.data.get_or_insert_with(Container::new)
    }

    /// Mutable props container, created if absent
    pub fn props_mut(&mut self) -> &mut Container {
        self.props.get_or_insert_with(Container::new)
    }

    /// Mutable render options, created if absent
    pub fn options_mut(&mut self) -> &mut RenderOptions {
        self.options.get_or_insert_with(RenderOptions::default)
    }

    /// Set a state value, returning the previous one
    pub fn set_state(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state_mut().insert(key.into(), value)
    }

    /// Visibility recorded by the last pass
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.options.as_ref().map_or(true, |o| o.visible)
    }

    /// Builder: add a state value
    #[must_use]
    pub fn with_state(mut self, key: &str, value: Value) -> Self {
        self.set_state(key, value);
        self
    }

    /// Builder: add a prop
    #[must_use]
    pub fn with_prop(mut self, key: &str, value: Value) -> Self {
        self.props_mut().insert(key.to_string(), value);
        self
    }

    /// Builder: add a data value
    #[must_use]
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data_mut().insert(key.to_string(), value);
        self
    }
}

/// Declared binding on a rendering item, in wire form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDecl {
    /// Target key in the rendering component's state
    pub name: String,
    /// Expression of the form `{{ source.key }}`
    pub value: String,
}

/// A scheduled render of one component, with bindings to resolve first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingItem {
    /// Component name
    pub name: String,
    /// State bindings
    #[serde(default, rename = "state", skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingDecl>,
}

impl RenderingItem {
    /// Create an item without bindings
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    /// Builder: add a binding
    #[must_use]
    pub fn bind(mut self, target: &str, expression: &str) -> Self {
        self.bindings.push(BindingDecl {
            name: target.to_string(),
            value: expression.to_string(),
        });
        self
    }
}

/// Component nesting and parallel-group declarations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hierarchy {
    /// Hierarchy version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Root component name
    #[serde(default)]
    pub root: String,
    /// Opaque nesting description consumed by clients
    #[serde(default)]
    pub structure: IndexMap<String, Value>,
    /// Parent component name -> children allowed to render concurrently after it
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parallel: IndexMap<String, Vec<String>>,
}

/// Root aggregate of one scenario instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// Protocol version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Scenario key
    #[serde(default)]
    pub scenario: String,
    /// Nesting and parallel groups
    #[serde(default)]
    pub hierarchy: Hierarchy,
    /// Components by name
    #[serde(default)]
    pub components: IndexMap<String, Component>,
    /// Component name -> downstream rendering items
    #[serde(default)]
    pub rendering: IndexMap<String, Vec<RenderingItem>>,
    /// Global state of the current pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_state: Option<GlobalState>,
}

impl Protocol {
    /// Create an empty protocol for a scenario
    #[must_use]
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            ..Self::default()
        }
    }

    /// Parse a protocol from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid protocol document
    pub fn from_json(text: &str) -> CoreResult<Self> {
        let mut protocol: Self = serde_json::from_str(text)?;
        protocol.sync_names();
        Ok(protocol)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Make every component's `name` match its key
    pub fn sync_names(&mut self) {
        for (key, component) in &mut self.components {
            if component.name != *key {
                component.name.clone_from(key);
            }
        }
    }

    /// Builder: add a component under its own name
    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.insert(component.name.clone(), component);
        self
    }

    /// Builder: declare the downstream items of a component
    #[must_use]
    pub fn with_rendering(mut self, key: &str, items: Vec<RenderingItem>) -> Self {
        self.rendering.insert(key.to_string(), items);
        self
    }

    /// Builder: declare the default full-render list
    #[must_use]
    pub fn with_default_rendering(self, items: Vec<RenderingItem>) -> Self {
        self.with_rendering(DEFAULT_RENDERING_KEY, items)
    }

    /// Builder: declare a parallel group
    #[must_use]
    pub fn with_parallel(mut self, parent: &str, children: &[&str]) -> Self {
        self.hierarchy.parallel.insert(
            parent.to_string(),
            children.iter().map(|c| (*c).to_string()).collect(),
        );
        self
    }

    /// Get a component
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Get a component mutably
    pub fn component_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.components.get_mut(name)
    }

    /// Default full-render list, if declared
    #[must_use]
    pub fn default_rendering(&self) -> Option<&[RenderingItem]> {
        self.rendering
            .get(DEFAULT_RENDERING_KEY)
            .map(Vec::as_slice)
    }

    /// Downstream items declared for a component
    #[must_use]
    pub fn downstream(&self, name: &str) -> Option<&[RenderingItem]> {
        self.rendering.get(name).map(Vec::as_slice)
    }

    /// Global state of this pass, created if absent
    pub fn ensure_global_state(&mut self) -> GlobalState {
        self.global_state.get_or_insert_with(GlobalState::new).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_json() -> &'static str {
        r#"{
            "scenario": "issue-manage",
            "hierarchy": {
                "root": "page",
                "structure": {"page": ["filter", "list"]},
                "parallel": {"filter": ["list", "chart"]}
            },
            "components": {
                "filter": {"type": "ContractiveFilter", "state": {"values": {}}},
                "list": {"type": "Table", "props": {"rowKey": "id"}}
            },
            "rendering": {
                "__DefaultRendering__": [{"name": "filter"}, {"name": "list"}],
                "filter": [
                    {"name": "list", "state": [{"name": "query", "value": "{{ filter.values }}"}]}
                ]
            }
        }"#
    }

    #[test]
    fn test_parse_protocol() {
        let protocol = Protocol::from_json(sample_json()).unwrap();
        assert_eq!(protocol.scenario, "issue-manage");
        assert_eq!(protocol.components.len(), 2);
        assert_eq!(protocol.component("list").unwrap().name, "list");
        assert_eq!(protocol.component("list").unwrap().type_name, "Table");
        assert_eq!(protocol.default_rendering().unwrap().len(), 2);
        let downstream = protocol.downstream("filter").unwrap();
        assert_eq!(downstream[0].bindings[0].name, "query");
        assert_eq!(protocol.hierarchy.parallel["filter"], vec!["list", "chart"]);
        assert!(protocol.global_state.is_none());
    }

    #[test]
    fn test_protocol_json_round_trip() {
        let protocol = Protocol::from_json(sample_json()).unwrap();
        let text = protocol.to_json().unwrap();
        assert_eq!(Protocol::from_json(&text).unwrap(), protocol);
    }

    #[test]
    fn test_component_normalize() {
        let mut component = Component::new("list", "Table");
        assert!(component.state.is_none());
        component.normalize();
        assert!(component.props.is_some());
        assert!(component.data.is_some());
        assert!(component.state.is_some());
        assert!(component.operations.is_some());
        assert!(component.is_visible());
    }

    #[test]
    fn test_component_state() {
        let mut component = Component::new("a", "T").with_state("x", json!(5));
        assert_eq!(component.state_value("x"), Some(&json!(5)));
        assert_eq!(component.set_state("x", json!(6)), Some(json!(5)));
        assert_eq!(component.state_value("missing"), None);
    }

    #[test]
    fn test_ensure_global_state_is_stable() {
        let mut protocol = Protocol::new("s");
        let first = protocol.ensure_global_state();
        let second = protocol.ensure_global_state();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_builders() {
        let protocol = Protocol::new("s")
            .with_component(Component::new("a", "T"))
            .with_default_rendering(vec![RenderingItem::new("a")])
            .with_parallel("a", &["b", "c"]);
        assert_eq!(protocol.default_rendering().unwrap()[0].name, "a");
        assert_eq!(protocol.hierarchy.parallel["a"].len(), 2);
    }
}
