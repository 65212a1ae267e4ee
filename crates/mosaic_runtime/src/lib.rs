//! MOSAIC Runtime
//!
//! Render orchestration: plans a pass, walks its dependency graph with a
//! parallel scheduler and runs each component's lifecycle against the pass's
//! component store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod monitor;
pub mod runner;
pub mod scheduler;

pub use engine::{EngineConfig, Orchestrator, PlanPreview, RenderResponse};
pub use monitor::PassMetrics;
pub use runner::PassRunner;
pub use scheduler::{NodeRunner, ParallelScheduler, ScheduleOutcome};
