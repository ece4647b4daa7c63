//! # Storage Backend Trait
//!
//! The contract between the traversal engine and the transactional store
//! that holds the graph. The engine never persists anything itself; it opens
//! transactions, asks one-hop questions, fetches nodes by id and writes in
//! batches.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | In-memory store for tests and embedding |

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::query::{NodeQuery, RelationshipQuery};
use crate::size::Size;
use crate::tx::{Transaction, TxMode};
use crate::Result;

pub use memory::MemoryBackend;

// ============================================================================
// Configuration
// ============================================================================

/// Store-side settings a backend reports through its transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Largest path tree a traversal may hold while bound to one transaction.
    pub traversal_memory_limit: Size,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            traversal_memory_limit: Size::from_gibibytes(2),
        }
    }
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The store capability consumed by operations and traversals.
///
/// Relationship criteria are opaque to callers of this trait; the backend is
/// the only place they are evaluated.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch the nodes with the given ids. Unknown ids are skipped.
    async fn get_nodes(&self, tx: &Self::Tx, ids: &[NodeId]) -> Result<Vec<Node>>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>> {
        Ok(self.get_nodes(tx, &[id]).await?.into_iter().next())
    }

    /// Like [`get_nodes`](Self::get_nodes) but with properties omitted.
    async fn shallow_get_nodes(&self, tx: &Self::Tx, ids: &[NodeId]) -> Result<Vec<Node>> {
        Ok(self
            .get_nodes(tx, ids)
            .await?
            .iter()
            .map(Node::shallow)
            .collect())
    }

    /// Every relationship matching one hop of `query`.
    async fn fetch_relationships(
        &self,
        tx: &Self::Tx,
        query: &RelationshipQuery,
    ) -> Result<Vec<Relationship>>;

    /// Ids, endpoints and kinds only.
    async fn shallow_fetch_relationships(
        &self,
        tx: &Self::Tx,
        query: &RelationshipQuery,
    ) -> Result<Vec<Relationship>> {
        Ok(self
            .fetch_relationships(tx, query)
            .await?
            .iter()
            .map(Relationship::shallow)
            .collect())
    }

    /// Each matching relationship paired with the node at its far end.
    ///
    /// Default: fetch relationships, then fetch their targets in one call.
    async fn fetch_directional(
        &self,
        tx: &Self::Tx,
        query: &RelationshipQuery,
    ) -> Result<Vec<(Relationship, Node)>> {
        let relationships = self.fetch_relationships(tx, query).await?;
        let mut target_ids = Vec::with_capacity(relationships.len());

        for rel in &relationships {
            target_ids.push(query.direction.pick_target(rel)?);
        }

        let targets: NodeSet = self.get_nodes(tx, &target_ids).await?.into_iter().collect();
        let mut pairs = Vec::with_capacity(relationships.len());

        for (rel, target_id) in relationships.into_iter().zip(target_ids) {
            if let Some(target) = targets.get(target_id) {
                pairs.push((rel, target.clone()));
            }
        }

        Ok(pairs)
    }

    /// Nodes selected by an id range plus optional criteria, ascending by id.
    async fn fetch_nodes(&self, tx: &Self::Tx, query: &NodeQuery) -> Result<Vec<Node>>;

    /// Largest node id in the store, or `None` when it is empty.
    async fn largest_node_id(&self, tx: &Self::Tx) -> Result<Option<NodeId>>;

    // ========================================================================
    // Batch writes
    // ========================================================================

    /// Create a node. The id is assigned immediately; the node becomes
    /// visible when the transaction commits.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        kinds: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId>;

    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        kind: &str,
        props: PropertyMap,
    ) -> Result<RelId>;
}
