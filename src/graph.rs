//! Rendering the job registry as nodes and edges.
//!
//! Edges may point at jobs that are not in the registry (a parent or
//! dependency defined in a repository that is not loaded). They are kept so
//! the gap is visible to whoever renders the graph.

use std::sync::Arc;

use crate::inherit::walk_ancestors;
use crate::models::{EdgeKind, Graph, GraphEdge, GraphNode, NodeData, NodeDetails};
use crate::registry::JobRegistry;

pub const DEPENDS_ON_LABEL: &str = "depends on";

/// Builds the full graph for `registry`.
pub fn build_graph(registry: &JobRegistry) -> Graph {
    let mut graph = Graph::default();

    for job in registry.iter() {
        let walk = walk_ancestors(registry, &job.name);
        if let Some(chain) = &walk.cycle {
            tracing::warn!(job = %job.name, chain = %chain.join(" -> "), "cyclic parent chain");
        }

        graph.nodes.push(GraphNode {
            id: job.name.clone(),
            data: NodeData {
                label: job.name.clone(),
                details: NodeDetails {
                    job: job.clone(),
                    inherited_vars: walk.records,
                    inheritance_cycle: walk.cycle,
                },
            },
        });

        if let Some(parent) = &job.parent {
            graph.edges.push(GraphEdge {
                id: format!("{}-{}", parent, job.name),
                source: parent.clone(),
                target: job.name.clone(),
                kind: EdgeKind::Inheritance,
                animated: false,
                label: None,
            });
        }

        for dep in job.dependency_names() {
            graph.edges.push(GraphEdge {
                id: format!("{}-{}", dep, job.name),
                source: dep.to_string(),
                target: job.name.clone(),
                kind: EdgeKind::Dependency,
                animated: true,
                label: Some(DEPENDS_ON_LABEL.to_string()),
            });
        }
    }

    graph
}

/// Memoized [`build_graph`] output, dropped wholesale on invalidation.
#[derive(Debug, Default)]
pub struct GraphCache {
    cached: Option<Arc<Graph>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached graph, building it from `registry` if needed.
    pub fn get_or_build(&mut self, registry: &JobRegistry) -> Arc<Graph> {
        if let Some(graph) = &self.cached {
            return Arc::clone(graph);
        }
        let graph = Arc::new(build_graph(registry));
        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "graph rebuilt"
        );
        self.cached = Some(Arc::clone(&graph));
        graph
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }
}
