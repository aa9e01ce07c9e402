//! Causal graph engine over rule-referenced study variables.
//!
//! Nodes are variable names, edges are asserted cause → effect links extracted
//! from rule text. Edges are unique per ordered pair; re-adding one overwrites
//! its metadata. Confounder detection is structural (in-degree > 1) and is only
//! a flag for deeper semantic review.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use formalizer_types::{FormalizerError, Result};

/// Scalar metadata attached to an edge (confidence, rule of origin, ...).
pub type EdgeMetadata = BTreeMap<String, serde_json::Value>;

/// An ordered cause → effect pair plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalEdge {
    pub cause: String,
    pub effect: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: EdgeMetadata,
}

/// Result of a simulated hard intervention `do(node = value)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervention {
    pub intervened_node: String,
    pub value: serde_json::Value,
    /// Every edge that survives the intervention.
    pub remaining_edges: Vec<CausalEdge>,
    /// The incoming edges of `intervened_node` that were severed.
    pub severed_edges: Vec<CausalEdge>,
}

type VariableGraph = StableGraph<String, EdgeMetadata, Directed>;

/// Directed graph of cause → effect relations between study variables.
#[derive(Debug, Clone, Default)]
pub struct CausalGraphEngine {
    graph: VariableGraph,
    /// Map from variable name → NodeIndex for O(1) lookup.
    index: HashMap<String, NodeIndex>,
}

impl CausalGraphEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Insert the edge `cause → effect`, or overwrite its metadata if it already exists.
    pub fn add_causal_relation(
        &mut self,
        cause: &str,
        effect: &str,
        metadata: Option<EdgeMetadata>,
    ) {
        let from = self.ensure_node(cause);
        let to = self.ensure_node(effect);
        self.graph.update_edge(from, to, metadata.unwrap_or_default());
        tracing::debug!(cause, effect, "Causal relation recorded");
    }

    /// Remove the edge `cause → effect`. Returns `false` when no such edge exists.
    /// Nodes are kept.
    pub fn remove_causal_relation(&mut self, cause: &str, effect: &str) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(cause), self.index.get(effect)) else {
            return false;
        };
        match self.graph.find_edge(from, to) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    /// Every variable with more than one distinct cause, computed from the current edges.
    pub fn detect_confounders(&self) -> BTreeSet<String> {
        self.graph
            .node_indices()
            .filter(|&n| self.graph.edges_directed(n, Direction::Incoming).count() > 1)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Model `do(node = value)`: report the edge set with every edge into `node`
    /// severed. The engine's own graph is not modified.
    pub fn simulate_intervention(
        &self,
        node: &str,
        value: serde_json::Value,
    ) -> Result<Intervention> {
        let idx = self
            .index
            .get(node)
            .copied()
            .filter(|&idx| self.degree(idx) > 0)
            .ok_or_else(|| FormalizerError::UnknownNode {
                node: node.to_string(),
            })?;

        let (severed_edges, remaining_edges): (Vec<_>, Vec<_>) = self
            .edges()
            .into_iter()
            .partition(|e| e.effect == self.graph[idx]);

        Ok(Intervention {
            intervened_node: node.to_string(),
            value,
            remaining_edges,
            severed_edges,
        })
    }

    /// All edges, ordered by (cause, effect).
    pub fn edges(&self) -> Vec<CausalEdge> {
        let mut edges: Vec<CausalEdge> = self
            .graph
            .edge_references()
            .map(|e| CausalEdge {
                cause: self.graph[e.source()].clone(),
                effect: self.graph[e.target()].clone(),
                metadata: e.weight().clone(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.cause, &a.effect).cmp(&(&b.cause, &b.effect)));
        edges
    }

    /// Direct causes of `node`.
    pub fn parents(&self, node: &str) -> BTreeSet<String> {
        match self.index.get(node) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => BTreeSet::new(),
        }
    }

    pub fn edge_metadata(&self, cause: &str, effect: &str) -> Option<&EdgeMetadata> {
        let from = *self.index.get(cause)?;
        let to = *self.index.get(effect)?;
        self.graph.find_edge(from, to).and_then(|e| self.graph.edge_weight(e))
    }

    pub fn contains_node(&self, node: &str) -> bool {
        self.index.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Incoming).count()
            + self.graph.edges_directed(idx, Direction::Outgoing).count()
    }
}
