//! Render plan computation.
//!
//! A plan is the flat, ordered list of components a pass renders. Without a
//! snapshot or an event target the pass is a full render; otherwise it is a
//! partial render headed by the triggering component.

use crate::binding::{parse_item, StateBinding};
use indexmap::IndexSet;
use mosaic_core::{CoreError, CoreResult, Event, Protocol, RenderRequest, RenderingItem};
use serde::Serialize;

/// Full or partial render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// First open: every planned component initializes
    Full,
    /// Interaction: the event target and its downstream components
    Partial,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

/// One planned component render
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedItem {
    /// Declared rendering item
    pub item: RenderingItem,
    /// Parsed bindings of the item
    pub bindings: Vec<StateBinding>,
    /// Event dispatched to the component
    pub event: Event,
}

impl PlannedItem {
    /// Plan an item, parsing its bindings
    ///
    /// # Errors
    ///
    /// Returns error if a binding expression is malformed
    pub fn new(item: RenderingItem, event: Event) -> CoreResult<Self> {
        let bindings = parse_item(&item)?;
        Ok(Self {
            item,
            bindings,
            event,
        })
    }

    /// Component name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.item.name
    }
}

/// Ordered render plan of one pass
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    /// Full or partial
    pub mode: RenderMode,
    /// Items in declaration order
    pub items: Vec<PlannedItem>,
}

impl RenderPlan {
    /// Component names in plan order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(PlannedItem::name).collect()
    }

    /// Number of items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keep only the item rendering `component`
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInPlan`] if the plan does not contain it
    pub fn retain_only(&mut self, component: &str) -> CoreResult<()> {
        let position = self
            .items
            .iter()
            .position(|p| p.name() == component)
            .ok_or_else(|| CoreError::NotInPlan {
                component: component.to_string(),
            })?;
        let kept = self.items.swap_remove(position);
        self.items = vec![kept];
        Ok(())
    }
}

/// Computes render plans from a request and the scenario's default protocol
pub struct Planner<'a> {
    default: &'a Protocol,
}

impl<'a> Planner<'a> {
    /// Create a planner for a scenario default protocol
    #[must_use]
    pub fn new(default: &'a Protocol) -> Self {
        Self { default }
    }

    /// Compute the plan of a request.
    ///
    /// `live` is the protocol the pass runs on (snapshot or default copy);
    /// the request's own snapshot decides between full and partial render.
    ///
    /// # Errors
    ///
    /// Returns error on malformed bindings or when the debug filter names a
    /// component outside the plan
    pub fn plan(&self, request: &RenderRequest, live: &Protocol) -> CoreResult<RenderPlan> {
        let mut plan = match (request.protocol.is_some(), request.target()) {
            (true, Some(event)) => self.partial(event, live)?,
            _ => self.full(live)?,
        };

        if let Some(component) = &request.debug_component {
            plan.retain_only(component)?;
        }

        tracing::debug!(
            scenario = %request.scenario,
            mode = %plan.mode,
            items = ?plan.names(),
            "computed render plan"
        );
        Ok(plan)
    }

    fn full(&self, live: &Protocol) -> CoreResult<RenderPlan> {
        let declared = live
            .default_rendering()
            .or_else(|| self.default.default_rendering());

        let items: Vec<RenderingItem> = match declared {
            Some(items) => items.to_vec(),
            None => self
                .default
                .components
                .keys()
                .map(RenderingItem::new)
                .collect(),
        };

        let items = dedup(items)
            .into_iter()
            .map(|item| {
                let event = Event::initialize(item.name.clone());
                PlannedItem::new(item, event)
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(RenderPlan {
            mode: RenderMode::Full,
            items,
        })
    }

    fn partial(&self, event: &Event, live: &Protocol) -> CoreResult<RenderPlan> {
        let downstream = live
            .downstream(&event.component)
            .or_else(|| self.default.downstream(&event.component))
            .unwrap_or_default();

        let mut items = vec![PlannedItem::new(
            RenderingItem::new(event.component.clone()),
            event.clone(),
        )?];
        for item in dedup(std::iter::once(RenderingItem::new(event.component.clone()))
            .chain(downstream.iter().cloned())
            .collect())
        .into_iter()
        .skip(1)
        {
            let dispatched = Event::rendering(item.name.clone());
            items.push(PlannedItem::new(item, dispatched)?);
        }

        Ok(RenderPlan {
            mode: RenderMode::Partial,
            items,
        })
    }
}

/// Drop later items naming a component already planned
fn dedup(items: Vec<RenderingItem>) -> Vec<RenderingItem> {
    let mut seen = IndexSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.name.clone());
            if !fresh {
                tracing::warn!(component = %item.name, "dropping duplicate rendering item");
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{Component, INITIALIZE_OPERATION, RENDERING_OPERATION};

    fn scenario() -> Protocol {
        Protocol::new("issues")
            .with_component(Component::new("filter", "Filter"))
            .with_component(Component::new("list", "Table"))
            .with_component(Component::new("chart", "Chart"))
            .with_rendering(
                "filter",
                vec![
                    RenderingItem::new("list").bind("query", "{{ filter.value }}"),
                    RenderingItem::new("chart"),
                ],
            )
    }

    #[test]
    fn test_full_render_uses_default_list() {
        let default = scenario().with_default_rendering(vec![
            RenderingItem::new("filter"),
            RenderingItem::new("list"),
        ]);
        let planner = Planner::new(&default);
        let plan = planner
            .plan(&RenderRequest::new("issues"), &default)
            .unwrap();

        assert_eq!(plan.mode, RenderMode::Full);
        assert_eq!(plan.names(), vec!["filter", "list"]);
        assert!(plan
            .items
            .iter()
            .all(|p| p.event.operation == INITIALIZE_OPERATION));
    }

    #[test]
    fn test_full_render_falls_back_to_all_components() {
        let default = scenario();
        let planner = Planner::new(&default);
        let plan = planner
            .plan(&RenderRequest::new("issues"), &default)
            .unwrap();

        assert_eq!(plan.names(), vec!["filter", "list", "chart"]);
        assert!(plan.items.iter().all(|p| p.bindings.is_empty()));
    }

    #[test]
    fn test_event_without_snapshot_is_full_render() {
        let default = scenario();
        let planner = Planner::new(&default);
        let request = RenderRequest::new("issues").with_event(Event::new("filter", "submit"));
        let plan = planner.plan(&request, &default).unwrap();
        assert_eq!(plan.mode, RenderMode::Full);
    }

    #[test]
    fn test_partial_render_starts_with_target() {
        let default = scenario();
        let planner = Planner::new(&default);
        let request = RenderRequest::new("issues")
            .with_protocol(default.clone())
            .with_event(Event::new("filter", "submit"));
        let plan = planner.plan(&request, &default).unwrap();

        assert_eq!(plan.mode, RenderMode::Partial);
        assert_eq!(plan.names(), vec!["filter", "list", "chart"]);
        assert_eq!(plan.items[0].event.operation, "submit");
        assert_eq!(plan.items[1].event.operation, RENDERING_OPERATION);
        assert_eq!(plan.items[1].bindings.len(), 1);
    }

    #[test]
    fn test_partial_render_without_downstream() {
        let default = scenario();
        let planner = Planner::new(&default);
        let request = RenderRequest::new("issues")
            .with_protocol(default.clone())
            .with_event(Event::new("chart", "zoom"));
        let plan = planner.plan(&request, &default).unwrap();
        assert_eq!(plan.names(), vec!["chart"]);
    }

    #[test]
    fn test_partial_render_drops_self_reference() {
        let default = scenario().with_rendering(
            "list",
            vec![RenderingItem::new("list"), RenderingItem::new("chart")],
        );
        let planner = Planner::new(&default);
        let request = RenderRequest::new("issues")
            .with_protocol(default.clone())
            .with_event(Event::new("list", "changePage"));
        let plan = planner.plan(&request, &default).unwrap();
        assert_eq!(plan.names(), vec!["list", "chart"]);
        assert_eq!(plan.items[0].event.operation, "changePage");
    }

    #[test]
    fn test_debug_filter_prunes_plan() {
        let default = scenario();
        let planner = Planner::new(&default);
        let request = RenderRequest::new("issues").with_debug_component("list");
        let plan = planner.plan(&request, &default).unwrap();
        assert_eq!(plan.names(), vec!["list"]);
    }

    #[test]
    fn test_debug_filter_outside_plan_fails() {
        let default = scenario();
        let planner = Planner::new(&default);
        let request = RenderRequest::new("issues").with_debug_component("missing");
        let err = planner.plan(&request, &default).unwrap_err();
        assert!(matches!(err, CoreError::NotInPlan { .. }));
    }

    #[test]
    fn test_malformed_binding_aborts_planning() {
        let default = scenario().with_rendering(
            "filter",
            vec![RenderingItem::new("list").bind("query", "filter.value")],
        );
        let planner = Planner::new(&default);
        let request = RenderRequest::new("issues")
            .with_protocol(default.clone())
            .with_event(Event::new("filter", "submit"));
        let err = planner.plan(&request, &default).unwrap_err();
        assert!(matches!(err, CoreError::InvalidBinding { .. }));
    }
}
