//! Dependency graph of one render pass.
//!
//! The graph is an arena of nodes addressed by index. Every plan item becomes
//! a node, linked serially in plan order; parallel-group declarations then
//! reattach named nodes under a shared parent. A node has at most one parent,
//! so the graph is always a tree rooted at the first plan item.

use crate::plan::PlannedItem;
use indexmap::{IndexMap, IndexSet};
use mosaic_core::{CoreError, CoreResult};
use serde::Serialize;

/// A node in the dependency graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Planned render wrapped by this node
    pub item: PlannedItem,
    /// Current parent, `None` for the root
    pub parent: Option<usize>,
    /// Nodes waiting on this one
    pub children: Vec<usize>,
    /// Whether the node was attached by a parallel-group declaration
    pub parallel: bool,
}

/// An edge between nodes, for inspection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    /// Parent component
    pub from: String,
    /// Child component
    pub to: String,
    /// Edge comes from a parallel-group declaration
    pub parallel: bool,
}

/// Arena of dependency nodes built fresh for each pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: IndexMap<String, usize>,
}

impl DependencyGraph {
    /// Build the graph of a plan.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidGraph`] if a parallel declaration would
    /// make a node wait on itself
    pub fn build(
        items: Vec<PlannedItem>,
        parallel: &IndexMap<String, Vec<String>>,
    ) -> CoreResult<Self> {
        let mut graph = Self::serial(items);

        for (parent, children) in parallel {
            let Some(&parent_idx) = graph.index.get(parent) else {
                tracing::debug!(parent = %parent, "parallel group parent not planned, skipping");
                continue;
            };
            let mut attached = IndexSet::new();
            for child in children {
                let Some(&child_idx) = graph.index.get(child) else {
                    tracing::debug!(parent = %parent, child = %child, "parallel child not planned, skipping");
                    continue;
                };
                if !attached.insert(child_idx) {
                    continue;
                }
                graph.attach(parent_idx, child_idx)?;
            }
        }

        Ok(graph)
    }

    fn serial(items: Vec<PlannedItem>) -> Self {
        let mut graph = Self::default();
        for (idx, item) in items.into_iter().enumerate() {
            graph.index.insert(item.name().to_string(), idx);
            let parent = idx.checked_sub(1);
            if let Some(p) = parent {
                graph.nodes[p].children.push(idx);
            }
            graph.nodes.push(GraphNode {
                item,
                parent,
                children: Vec::new(),
                parallel: false,
            });
        }
        graph
    }

    /// Attach `child` under `parent`, detaching it from its current parent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidGraph`] if either index is out of range,
    /// or if `child` is `parent` or one of its ancestors
    pub fn attach(&mut self, parent: usize, child: usize) -> CoreResult<()> {
        let len = self.nodes.len();
        if parent >= len || child >= len {
            return Err(CoreError::InvalidGraph {
                reason: format!("cannot attach node {child} under {parent}: graph has {len} nodes"),
            });
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(CoreError::InvalidGraph {
                reason: format!(
                    "'{}' cannot render after '{}': it is already upstream of it",
                    self.nodes[child].item.name(),
                    self.nodes[parent].item.name()
                ),
            });
        }

        if let Some(previous) = self.nodes[child].parent {
            if self.nodes[child].parallel && previous != parent {
                tracing::warn!(
                    component = %self.nodes[child].item.name(),
                    previous = %self.nodes[previous].item.name(),
                    parent = %self.nodes[parent].item.name(),
                    "component listed in several parallel groups, last declaration wins"
                );
            }
            self.nodes[previous].children.retain(|&c| c != child);
        }

        self.nodes[child].parent = Some(parent);
        self.nodes[child].parallel = true;
        self.nodes[parent].children.push(child);
        Ok(())
    }

    /// Check if `ancestor` is on the parent chain of `node`
    #[must_use]
    pub fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(idx) = current {
            if idx == ancestor {
                return true;
            }
            current = self.nodes[idx].parent;
        }
        false
    }

    /// Root node index, `None` for an empty graph
    #[must_use]
    pub fn root(&self) -> Option<usize> {
        self.nodes.iter().position(|n| n.parent.is_none())
    }

    /// Get node by index
    #[must_use]
    pub fn node(&self, idx: usize) -> Option<&GraphNode> {
        self.nodes.get(idx)
    }

    /// Index of the node rendering `component`
    #[must_use]
    pub fn index_of(&self, component: &str) -> Option<usize> {
        self.index.get(component).copied()
    }

    /// Children of a node
    #[must_use]
    pub fn children(&self, idx: usize) -> &[usize] {
        self.nodes.get(idx).map_or(&[], |n| n.children.as_slice())
    }

    /// Children of `idx` that may start given the completed set.
    ///
    /// A child is renderable once its parent is done and it has not been
    /// scheduled yet.
    #[must_use]
    pub fn renderable(
        &self,
        idx: usize,
        done: &IndexSet<usize>,
        scheduled: &IndexSet<usize>,
    ) -> Vec<usize> {
        self.children(idx)
            .iter()
            .copied()
            .filter(|c| !scheduled.contains(c))
            .filter(|c| self.nodes[*c].parent.is_none_or(|p| done.contains(&p)))
            .collect()
    }

    /// All edges in node order
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.nodes
            .iter()
            .filter_map(|n| {
                n.parent.map(|p| Edge {
                    from: self.nodes[p].item.name().to_string(),
                    to: n.item.name().to_string(),
                    parallel: n.parallel,
                })
            })
            .collect()
    }

    /// Human-readable lines, one per edge
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.edges()
            .into_iter()
            .map(|e| {
                let arrow = if e.parallel { "=>" } else { "->" };
                format!("{} {} {}", e.from, arrow, e.to)
            })
            .collect()
    }

    /// Get total node count
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if graph is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Consume the graph, returning its nodes
    #[must_use]
    pub fn into_nodes(self) -> Vec<GraphNode> {
        self.nodes
    }
}
