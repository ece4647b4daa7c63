//! Path — a sequence of alternating nodes and relationships.

use serde::{Deserialize, Serialize};

use super::{Node, NodeId, RelId, Relationship};

/// A path in the graph: node -[edge]-> node -[edge]-> node ...
///
/// Generic over the payloads so that the identifier-only cactus tree can
/// render paths without materializing full nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path<N = Node, E = Relationship> {
    /// Nodes along the path. Always has one more element than `edges`.
    pub nodes: Vec<N>,
    /// Edges connecting consecutive nodes.
    pub edges: Vec<E>,
}

/// A path of identifiers only.
pub type IdPath = Path<NodeId, RelId>;

impl<N, E> Path<N, E> {
    pub fn single(node: N) -> Self {
        Self { nodes: vec![node], edges: Vec::new() }
    }

    pub fn with_capacity(depth: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(depth + 1),
            edges: Vec::with_capacity(depth),
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn root(&self) -> Option<&N> {
        self.nodes.first()
    }

    pub fn terminal(&self) -> Option<&N> {
        self.nodes.last()
    }

    /// Extend path with an edge and its target node.
    pub fn append(&mut self, edge: E, node: N) {
        self.edges.push(edge);
        self.nodes.push(node);
    }

    /// Visit each hop as `(start, end, edge)` from root to terminal. The
    /// delegate returns false to stop early.
    pub fn walk(&self, mut delegate: impl FnMut(&N, &N, &E) -> bool) {
        for idx in 1..self.nodes.len() {
            if !delegate(&self.nodes[idx - 1], &self.nodes[idx], &self.edges[idx - 1]) {
                break;
            }
        }
    }
}

impl<E> Path<Node, E> {
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|node| node.id == id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }
}

impl<E> Path<NodeId, E> {
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }
}
