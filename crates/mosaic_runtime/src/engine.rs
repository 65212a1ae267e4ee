//! Render orchestrator.
//!
//! Entry point of a pass: computes the render plan, checks every planned
//! component before anything runs, builds the dependency graph, walks it with
//! the parallel scheduler and assembles the response. A business error placed
//! in global state by any handler is preferred over every other outcome.

use crate::monitor::PassMetrics;
use crate::runner::PassRunner;
use crate::scheduler::ParallelScheduler;
use chrono::{DateTime, Utc};
use mosaic_component::{RenderReport, Registry};
use mosaic_core::{
    CoreError, CoreResult, GlobalState, NoopTranslator, PassId, Protocol, RenderRequest,
    Translator,
};
use mosaic_plan::{DependencyGraph, Edge, Planner, RenderMode, RenderPlan};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum components rendering at the same time (`None` = unbounded)
    pub max_parallel_units: Option<usize>,
    /// Locale used when the request carries none
    pub default_locale: String,
    /// Fail passes whose plan is empty instead of returning the protocol unchanged
    pub reject_empty_plan: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_units: None,
            default_locale: "en".to_string(),
            reject_empty_plan: false,
        }
    }
}

impl EngineConfig {
    /// Set the concurrency bound
    #[must_use]
    pub fn with_max_parallel_units(mut self, max: usize) -> Self {
        self.max_parallel_units = Some(max);
        self
    }

    /// Set the default locale
    #[must_use]
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    /// Reject empty plans
    #[must_use]
    pub fn with_reject_empty_plan(mut self, reject: bool) -> Self {
        self.reject_empty_plan = reject;
        self
    }
}

/// Result of a successful pass
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    /// Updated protocol snapshot
    pub protocol: Protocol,
    /// Pass id
    pub pass_id: PassId,
    /// Completion time
    pub rendered_at: DateTime<Utc>,
    /// Full or partial render
    pub mode: RenderMode,
    /// Pass metrics
    pub metrics: PassMetrics,
    /// Lifecycle reports in completion order
    pub reports: Vec<RenderReport>,
}

/// Plan of a request, computed without rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanPreview {
    /// Scenario key
    pub scenario: String,
    /// Full or partial render
    pub mode: RenderMode,
    /// Planned components with their dispatched operation
    pub items: Vec<(String, String)>,
    /// Dependency edges
    pub edges: Vec<Edge>,
}

impl PlanPreview {
    /// Human-readable lines
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec![format!("{} render of {}", self.mode, self.scenario)];
        lines.extend(
            self.items
                .iter()
                .enumerate()
                .map(|(i, (name, operation))| format!("  {}. {} ({})", i + 1, name, operation)),
        );
        lines.extend(self.edges.iter().map(|e| {
            let arrow = if e.parallel { "=>" } else { "->" };
            format!("  {} {} {}", e.from, arrow, e.to)
        }));
        lines
    }
}

struct PreparedPass {
    live: Protocol,
    plan: RenderPlan,
    parallel: indexmap::IndexMap<String, Vec<String>>,
}

/// Render orchestrator
pub struct Orchestrator {
    registry: Arc<Registry>,
    config: EngineConfig,
    translator: Arc<dyn Translator>,
}

impl Orchestrator {
    /// Create an orchestrator over a registry
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            translator: Arc::new(NoopTranslator),
        }
    }

    /// Create an orchestrator over the installed process-wide registry
    ///
    /// # Errors
    ///
    /// Returns error if no registry is installed
    pub fn from_global() -> CoreResult<Self> {
        Ok(Self::new(Registry::global()?))
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the translator handed to handlers
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Get configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the registry
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Compute the plan and graph of a request without rendering
    ///
    /// # Errors
    ///
    /// Returns the same configuration and protocol errors a render would
    /// report before dispatching anything
    pub fn plan(&self, request: &RenderRequest) -> CoreResult<PlanPreview> {
        let prepared = self.prepare(request)?;
        let items = prepared
            .plan
            .items
            .iter()
            .map(|p| (p.name().to_string(), p.event.operation.clone()))
            .collect();
        let mode = prepared.plan.mode;
        let graph = DependencyGraph::build(prepared.plan.items, &prepared.parallel)?;
        Ok(PlanPreview {
            scenario: request.scenario.clone(),
            mode,
            items,
            edges: graph.edges(),
        })
    }

    /// Run one render pass
    ///
    /// # Errors
    ///
    /// Returns the business error from global state if one was set, otherwise
    /// the first configuration, protocol or handler error of the pass
    pub async fn render(&self, request: RenderRequest) -> CoreResult<RenderResponse> {
        let pass_id = PassId::new();
        let started = Instant::now();

        let result = self.run_pass(pass_id, &request, started).await;
        if let Err(err) = &result {
            tracing::error!(
                scenario = %request.scenario,
                pass_id = %pass_id,
                category = ?err.category(),
                error = %err,
                "render pass aborted"
            );
        }
        result
    }

    async fn run_pass(
        &self,
        pass_id: PassId,
        request: &RenderRequest,
        started: Instant,
    ) -> CoreResult<RenderResponse> {
        let PreparedPass {
            mut live,
            plan,
            parallel,
        } = self.prepare(request)?;
        let mode = plan.mode;
        let planned = plan.len();

        tracing::info!(
            scenario = %request.scenario,
            pass_id = %pass_id,
            mode = %mode,
            planned,
            "render pass started"
        );

        if plan.is_empty() {
            if self.config.reject_empty_plan {
                return Err(CoreError::InvalidProtocol {
                    scenario: request.scenario.clone(),
                    reason: "render plan is empty".to_string(),
                });
            }
            tracing::warn!(scenario = %request.scenario, "empty render plan, nothing to render");
        }

        let graph = DependencyGraph::build(plan.items, &parallel)?;

        let global = live.ensure_global_state();
        if let Some(stale) = global.clear_error() {
            tracing::debug!(stale = %stale, "cleared business error left by a previous pass");
        }

        let locale = request
            .locale
            .clone()
            .unwrap_or_else(|| self.config.default_locale.clone());
        let runner = Arc::new(
            PassRunner::new(
                request.scenario.clone(),
                Arc::clone(&self.registry),
                std::mem::take(&mut live.components),
                global.clone(),
            )
            .with_params(request.params.clone())
            .with_locale(locale, Arc::clone(&self.translator))
            .with_planned(planned),
        );

        let outcome = ParallelScheduler::new()
            .with_max_parallel(self.config.max_parallel_units)
            .execute(graph, runner.clone())
            .await;

        live.components = runner.take_components();
        let mut metrics = runner.metrics();
        metrics.record_elapsed(started.elapsed());

        if let Some(business) = global.error() {
            tracing::warn!(
                scenario = %request.scenario,
                pass_id = %pass_id,
                error = %business,
                "business error reported"
            );
            return Err(CoreError::Business(business));
        }
        outcome?;

        tracing::info!(
            scenario = %request.scenario,
            pass_id = %pass_id,
            rendered = metrics.rendered,
            skipped = metrics.skipped,
            bindings = metrics.bindings_resolved,
            elapsed_ms = metrics.elapsed_ms,
            "render pass finished"
        );

        Ok(RenderResponse {
            protocol: live,
            pass_id,
            rendered_at: Utc::now(),
            mode,
            metrics,
            reports: runner.reports(),
        })
    }

    /// Load the live protocol, compute the plan and check every planned
    /// component has a definition and a renderer
    fn prepare(&self, request: &RenderRequest) -> CoreResult<PreparedPass> {
        let definition = self.registry.scenario(&request.scenario)?;
        let default = &definition.protocol;

        let mut live = match &request.protocol {
            Some(snapshot) => {
                let mut snapshot = snapshot.clone();
                snapshot.sync_names();
                snapshot
            }
            None => default.clone(),
        };
        // detach from storage shared with the registry or the caller
        live.global_state = live
            .global_state
            .take()
            .map(|g| GlobalState::from_container(g.snapshot()));

        let plan = Planner::new(default).plan(request, &live)?;

        for item in &plan.items {
            let name = item.name();
            if !live.components.contains_key(name) {
                let fallback = default.component(name).cloned().ok_or_else(|| {
                    CoreError::ComponentNotFound {
                        scenario: request.scenario.clone(),
                        component: name.to_string(),
                    }
                })?;
                tracing::debug!(component = %name, "component restored from scenario default");
                live.components.insert(name.to_string(), fallback);
            }
            if let Some(component) = live.component(name) {
                self.registry
                    .renderer(&request.scenario, &component.type_name)?;
            }
        }

        let parallel = if live.hierarchy.parallel.is_empty() {
            default.hierarchy.parallel.clone()
        } else {
            live.hierarchy.parallel.clone()
        };

        Ok(PreparedPass {
            live,
            plan,
            parallel,
        })
    }
}
