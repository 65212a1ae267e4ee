//! State bindings.
//!
//! A binding copies one value into the rendering component's state before it
//! renders. Expressions have the form `{{ source.key }}`, where `source` is
//! either [`PARAMS_SOURCE`] (caller parameters) or the name of a component that
//! already rendered earlier in the same pass.

use indexmap::{IndexMap, IndexSet};
use mosaic_core::{BindingDecl, Component, Container, CoreError, CoreResult, RenderingItem};
use once_cell::sync::Lazy;
use serde_json::Value;

/// Reserved source token naming the caller parameters
pub const PARAMS_SOURCE: &str = "inParams";

/// Where a binding reads from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingSource {
    /// Caller parameters
    Params,
    /// State of another component
    Component(String),
}

/// Parsed state binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateBinding {
    /// Target key in the rendering component's state
    pub target: String,
    /// Source of the value
    pub source: BindingSource,
    /// Key read from the source
    pub key: String,
    /// Original expression
    pub expression: String,
}

impl StateBinding {
    /// Parse a binding expression
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBinding`] for missing or extra delimiters,
    /// a segment count other than two, or an empty segment
    pub fn parse(target: &str, expression: &str) -> CoreResult<Self> {
        let invalid = |reason: &str| CoreError::InvalidBinding {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let inner = expression
            .trim()
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .ok_or_else(|| invalid("missing `{{` or `}}` delimiter"))?;

        if inner.contains('{') || inner.contains('}') {
            return Err(invalid("unexpected extra delimiter"));
        }

        let segments: Vec<&str> = inner.trim().split('.').map(str::trim).collect();
        if segments.len() != 2 {
            return Err(invalid(&format!(
                "expected `source.key`, found {} segment(s)",
                segments.len()
            )));
        }
        if segments
            .iter()
            .any(|s| s.is_empty() || s.contains(char::is_whitespace))
        {
            return Err(invalid("empty or malformed segment"));
        }
        if target.trim().is_empty() {
            return Err(invalid("empty target key"));
        }

        let source = if segments[0] == PARAMS_SOURCE {
            BindingSource::Params
        } else {
            BindingSource::Component(segments[0].to_string())
        };

        Ok(Self {
            target: target.to_string(),
            source,
            key: segments[1].to_string(),
            expression: expression.to_string(),
        })
    }

    /// Parse a declared binding
    ///
    /// # Errors
    ///
    /// Returns error if the expression is malformed
    pub fn from_decl(decl: &BindingDecl) -> CoreResult<Self> {
        Self::parse(&decl.name, &decl.value)
    }

    /// Component this binding depends on, if any
    #[must_use]
    pub fn dependency(&self) -> Option<&str> {
        match &self.source {
            BindingSource::Params => None,
            BindingSource::Component(name) => Some(name),
        }
    }
}

/// Parse every binding of a rendering item
///
/// # Errors
///
/// Returns the first malformed expression
pub fn parse_item(item: &RenderingItem) -> CoreResult<Vec<StateBinding>> {
    item.bindings.iter().map(StateBinding::from_decl).collect()
}

/// Read access to components rendered so far in a pass
pub trait StateLookup {
    /// State of `component`, or `None` if it has not rendered in this pass
    fn rendered_state(&self, component: &str) -> Option<&Container>;
}

/// [`StateLookup`] over a component map and the set of rendered names
pub struct RenderedStates<'a> {
    components: &'a IndexMap<String, Component>,
    rendered: &'a IndexSet<String>,
}

impl<'a> RenderedStates<'a> {
    /// Create a view
    #[must_use]
    pub fn new(components: &'a IndexMap<String, Component>, rendered: &'a IndexSet<String>) -> Self {
        Self { components, rendered }
    }
}

static EMPTY_STATE: Lazy<Container> = Lazy::new(Container::new);

impl StateLookup for RenderedStates<'_> {
    fn rendered_state(&self, component: &str) -> Option<&Container> {
        if !self.rendered.contains(component) {
            return None;
        }
        self.components
            .get(component)
            .map(|c| c.state.as_ref().unwrap_or(&*EMPTY_STATE))
    }
}

/// Resolves bindings against caller parameters and rendered components
pub struct BindingResolver<'a> {
    params: &'a Container,
}

impl<'a> BindingResolver<'a> {
    /// Create a resolver over the caller parameters
    #[must_use]
    pub fn new(params: &'a Container) -> Self {
        Self { params }
    }

    /// Resolve the values of `bindings` for `component`, in declaration order
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UndeclaredDependency`] when the source component has
    /// not rendered in this pass and [`CoreError::StateNotFound`] when it lacks
    /// the key. Missing caller parameters resolve to `null`.
    pub fn resolve(
        &self,
        component: &str,
        bindings: &[StateBinding],
        lookup: &dyn StateLookup,
    ) -> CoreResult<Vec<(String, Value)>> {
        bindings
            .iter()
            .map(|binding| {
                let value = match &binding.source {
                    BindingSource::Params => {
                        self.params.get(&binding.key).cloned().unwrap_or(Value::Null)
                    }
                    BindingSource::Component(source) => {
                        let state = lookup.rendered_state(source).ok_or_else(|| {
                            CoreError::UndeclaredDependency {
                                component: component.to_string(),
                                dependency: source.clone(),
                            }
                        })?;
                        state
                            .get(&binding.key)
                            .cloned()
                            .ok_or_else(|| CoreError::StateNotFound {
                                component: source.clone(),
                                key: binding.key.clone(),
                            })?
                    }
                };
                Ok((binding.target.clone(), value))
            })
            .collect()
    }
}

/// Write resolved values into a component's state.
///
/// Later values overwrite earlier ones. A target written twice by the same
/// item is logged as a warning; replacing a value carried over from the
/// snapshot is routine and only logged at debug level.
/// Returns the number of values written.
pub fn apply_resolved(component: &mut Component, resolved: Vec<(String, Value)>) -> usize {
    let count = resolved.len();
    let mut written = IndexSet::with_capacity(count);
    for (key, value) in resolved {
        let Some(previous) = component.set_state(key.clone(), value) else {
            written.insert(key);
            continue;
        };
        if written.contains(&key) {
            tracing::warn!(
                component = %component.name,
                key = %key,
                "duplicate binding target, last value wins"
            );
        } else {
            tracing::debug!(
                component = %component.name,
                key = %key,
                previous = %previous,
                "binding replaced existing state"
            );
        }
        written.insert(key);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    struct Fixture {
        components: IndexMap<String, Component>,
        rendered: IndexSet<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut components = IndexMap::new();
            components.insert(
                "A".to_string(),
                Component::new("A", "T").with_state("x", json!(5)),
            );
            components.insert("B".to_string(), Component::new("B", "T"));
            Self {
                components,
                rendered: IndexSet::new(),
            }
        }

        fn view(&self) -> RenderedStates<'_> {
            RenderedStates::new(&self.components, &self.rendered)
        }
    }

    #[test]
    fn test_parse_component_source() {
        let binding = StateBinding::parse("y", "{{ A.x }}").unwrap();
        assert_eq!(binding.source, BindingSource::Component("A".to_string()));
        assert_eq!(binding.key, "x");
        assert_eq!(binding.target, "y");
        assert_eq!(binding.dependency(), Some("A"));
    }

    #[test]
    fn test_parse_params_source() {
        let binding = StateBinding::parse("pid", "{{inParams.projectId}}").unwrap();
        assert_eq!(binding.source, BindingSource::Params);
        assert_eq!(binding.dependency(), None);
    }

    #[test]
    fn test_parse_rejects_missing_delimiters() {
        for expr in ["A.x", "{{ A.x", "A.x }}", "{ A.x }"] {
            let err = StateBinding::parse("y", expr).unwrap_err();
            assert!(matches!(err, CoreError::InvalidBinding { .. }), "{expr}");
        }
    }

    #[test]
    fn test_parse_rejects_extra_delimiters() {
        let err = StateBinding::parse("y", "{{ {{A.x}} }}").unwrap_err();
        assert!(err.to_string().contains("extra delimiter"));
    }

    #[test]
    fn test_parse_rejects_wrong_segment_count() {
        for expr in ["{{ A }}", "{{ A.x.z }}", "{{}}"] {
            let err = StateBinding::parse("y", expr).unwrap_err();
            assert!(err.to_string().contains("segment"), "{expr}: {err}");
        }
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        let err = StateBinding::parse("y", "{{ A. }}").unwrap_err();
        assert!(matches!(err, CoreError::InvalidBinding { .. }));
    }

    #[test]
    fn test_resolve_from_rendered_component() {
        let mut fixture = Fixture::new();
        fixture.rendered.insert("A".to_string());
        let params = Container::new();
        let resolver = BindingResolver::new(&params);
        let bindings = vec![StateBinding::parse("y", "{{A.x}}").unwrap()];

        let resolved = resolver.resolve("B", &bindings, &fixture.view()).unwrap();
        assert_eq!(resolved, vec![("y".to_string(), json!(5))]);
    }

    #[test]
    fn test_resolve_unrendered_component_fails() {
        let fixture = Fixture::new();
        let params = Container::new();
        let resolver = BindingResolver::new(&params);
        let bindings = vec![StateBinding::parse("y", "{{A.x}}").unwrap()];

        let err = resolver.resolve("B", &bindings, &fixture.view()).unwrap_err();
        assert_eq!(
            err,
            CoreError::UndeclaredDependency {
                component: "B".to_string(),
                dependency: "A".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_missing_state_key_fails() {
        let mut fixture = Fixture::new();
        fixture.rendered.insert("A".to_string());
        let params = Container::new();
        let resolver = BindingResolver::new(&params);
        let bindings = vec![StateBinding::parse("y", "{{A.missing}}").unwrap()];

        let err = resolver.resolve("B", &bindings, &fixture.view()).unwrap_err();
        assert!(matches!(err, CoreError::StateNotFound { ref key, .. } if key == "missing"));
    }

    #[test]
    fn test_resolve_missing_param_is_null() {
        let fixture = Fixture::new();
        let mut params = Container::new();
        params.insert("projectId".to_string(), json!(7));
        let resolver = BindingResolver::new(&params);
        let bindings = vec![
            StateBinding::parse("pid", "{{inParams.projectId}}").unwrap(),
            StateBinding::parse("org", "{{inParams.orgId}}").unwrap(),
        ];

        let resolved = resolver.resolve("B", &bindings, &fixture.view()).unwrap();
        assert_eq!(resolved[0].1, json!(7));
        assert_eq!(resolved[1].1, Value::Null);
    }

    #[test]
    fn test_apply_last_writer_wins() {
        let mut component = Component::new("B", "T").with_state("y", json!("old"));
        let written = apply_resolved(
            &mut component,
            vec![
                ("y".to_string(), json!(1)),
                ("y".to_string(), json!(2)),
            ],
        );
        assert_eq!(written, 2);
        assert_eq!(component.state_value("y"), Some(&json!(2)));
    }

    #[test]
    fn test_parse_item() {
        let item = RenderingItem::new("list")
            .bind("query", "{{ filter.value }}")
            .bind("pid", "{{ inParams.projectId }}");
        let bindings = parse_item(&item).unwrap();
        assert_eq!(bindings.len(), 2);

        let bad = RenderingItem::new("list").bind("query", "filter.value");
        assert!(parse_item(&bad).is_err());
    }

    proptest! {
        #[test]
        fn prop_well_formed_expressions_parse(
            source in "[A-Za-z][A-Za-z0-9_-]{0,12}",
            key in "[A-Za-z][A-Za-z0-9_]{0,12}",
            pad in " {0,3}",
        ) {
            let expr = format!("{{{{{pad}{source}.{key}{pad}}}}}");
            let binding = StateBinding::parse("t", &expr).unwrap();
            prop_assert_eq!(binding.key, key);
            if source == PARAMS_SOURCE {
                prop_assert_eq!(binding.source, BindingSource::Params);
            } else {
                prop_assert_eq!(binding.source, BindingSource::Component(source));
            }
        }

        #[test]
        fn prop_parse_never_panics(expr in ".{0,40}") {
            let _ = StateBinding::parse("t", &expr);
        }
    }
}
