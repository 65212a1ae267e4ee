//! MOSAIC Planner
//!
//! Turns a render request into an ordered plan of component renders, parses
//! and resolves state bindings, and links the plan into a dependency graph
//! honoring parallel-group declarations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod graph;
pub mod plan;
pub mod validate;

pub use binding::{
    apply_resolved, parse_item, BindingResolver, BindingSource, RenderedStates, StateBinding,
    StateLookup, PARAMS_SOURCE,
};
pub use graph::{DependencyGraph, Edge, GraphNode};
pub use plan::{PlannedItem, Planner, RenderMode, RenderPlan};
pub use validate::{ProtocolValidator, Severity, ValidationIssue, ValidationReport};
