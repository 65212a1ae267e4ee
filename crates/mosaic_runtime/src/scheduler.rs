//! Parallel scheduler for dependency graphs.
//!
//! Every node runs as its own tokio task. When a node completes it marks
//! itself done, collects the children that became renderable and spawns them
//! all at once, then waits for them. Only this bookkeeping is shared:
//! - done and scheduled sets behind one mutex
//! - the first error, kept once, which stops further dispatch
//! - an optional semaphore bounding how many nodes run at the same time

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use indexmap::IndexSet;
use mosaic_core::{CoreError, CoreResult};
use mosaic_plan::{DependencyGraph, GraphNode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Executes one node of the graph
#[async_trait]
pub trait NodeRunner: Send + Sync + 'static {
    /// Run a node
    ///
    /// # Errors
    ///
    /// Returns error to stop the walk; siblings already running finish
    async fn run(&self, node: &GraphNode) -> CoreResult<()>;
}

/// Result of a completed walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Node indices in completion order
    pub completed: Vec<usize>,
}

#[derive(Default)]
struct Bookkeeping {
    done: IndexSet<usize>,
    scheduled: IndexSet<usize>,
    order: Vec<usize>,
}

struct Walk {
    graph: DependencyGraph,
    runner: Arc<dyn NodeRunner>,
    permits: Option<Arc<Semaphore>>,
    book: Mutex<Bookkeeping>,
    first_error: Mutex<Option<CoreError>>,
    aborted: AtomicBool,
}

impl Walk {
    fn fail(&self, err: CoreError) {
        self.aborted.store(true, Ordering::SeqCst);
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        } else {
            tracing::debug!(error = %err, "additional failure after abort");
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Mark `idx` done and claim its renderable children
    fn complete(&self, idx: usize) -> Vec<usize> {
        let mut book = self.book.lock();
        book.done.insert(idx);
        book.order.push(idx);
        if self.is_aborted() {
            return Vec::new();
        }
        let next = self.graph.renderable(idx, &book.done, &book.scheduled);
        book.scheduled.extend(next.iter().copied());
        next
    }
}

/// Walks a dependency graph, running independent branches concurrently
#[derive(Debug, Clone, Default)]
pub struct ParallelScheduler {
    max_parallel: Option<usize>,
}

impl ParallelScheduler {
    /// Create a new scheduler without a concurrency bound
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound how many nodes run at once
    #[must_use]
    pub fn with_max_parallel(mut self, max: Option<usize>) -> Self {
        self.max_parallel = max.filter(|m| *m > 0);
        self
    }

    /// Run every node of `graph`, parents strictly before children
    ///
    /// # Errors
    ///
    /// Returns the first node error; nodes already dispatched complete
    /// before it is returned and no new node starts after it
    pub async fn execute(
        &self,
        graph: DependencyGraph,
        runner: Arc<dyn NodeRunner>,
    ) -> CoreResult<ScheduleOutcome> {
        let Some(root) = graph.root() else {
            return Ok(ScheduleOutcome::default());
        };

        let walk = Arc::new(Walk {
            graph,
            runner,
            permits: self.max_parallel.map(|m| Arc::new(Semaphore::new(m))),
            book: Mutex::new(Bookkeeping::default()),
            first_error: Mutex::new(None),
            aborted: AtomicBool::new(false),
        });
        walk.book.lock().scheduled.insert(root);

        if let Err(join_err) = tokio::spawn(unit(Arc::clone(&walk), root)).await {
            walk.fail(CoreError::internal(format!("render unit failed: {join_err}")));
        }

        if let Some(err) = walk.first_error.lock().take() {
            return Err(err);
        }
        let completed = std::mem::take(&mut walk.book.lock().order);
        Ok(ScheduleOutcome { completed })
    }
}

fn unit(walk: Arc<Walk>, idx: usize) -> BoxFuture<'static, ()> {
    async move {
        let Some(node) = walk.graph.node(idx) else {
            walk.fail(CoreError::internal(format!("node {idx} missing from graph")));
            return;
        };

        let result = match &walk.permits {
            Some(permits) => match Arc::clone(permits).acquire_owned().await {
                Ok(_permit) => walk.runner.run(node).await,
                Err(err) => Err(CoreError::internal(format!("scheduler closed: {err}"))),
            },
            None => walk.runner.run(node).await,
        };
        if let Err(err) = result {
            walk.fail(err);
            return;
        }

        let next = walk.complete(idx);
        if next.is_empty() {
            return;
        }
        tracing::debug!(
            component = %node.item.name(),
            children = next.len(),
            "dispatching renderable children"
        );

        let handles: Vec<_> = next
            .into_iter()
            .map(|child| tokio::spawn(unit(Arc::clone(&walk), child)))
            .collect();
        for joined in join_all(handles).await {
            if let Err(join_err) = joined {
                walk.fail(CoreError::internal(format!("render unit failed: {join_err}")));
            }
        }
    }
    .boxed()
}
