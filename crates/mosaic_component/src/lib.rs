//! MOSAIC Component Framework
//!
//! The capability set every component type implements, the per-render
//! lifecycle that drives it, and the registry binding component types to
//! scenarios.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod component;
pub mod framework;
pub mod passthrough;
pub mod registry;

pub use component::{ComponentType, Handler, OperationContext, OperationTable};
pub use framework::{
    flatten_extra, Framework, LifecycleState, LifecycleTrace, RenderInput, RenderReport, Renderer,
};
pub use passthrough::{GenericModel, PassThrough};
pub use registry::{Registry, ScenarioDefinition};
