//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! It uses simple HashMaps protected by RwLock.
//!
//! ## Transactions
//!
//! - Read transactions see committed data only.
//! - Batch transactions buffer their writes; `commit_tx()` applies them in
//!   order and `rollback_tx()` discards them. Ids are handed out at write
//!   time, so a rolled back batch leaves gaps in the id space.
//!
//! ## Fault injection
//!
//! [`MemoryBackend::fail_expansion_of`] makes every relationship query
//! anchored at a node fail, which lets tests drive the error paths of the
//! parallel machinery without a real store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{StorageBackend, StorageConfig};
use crate::model::*;
use crate::query::{Criteria, NodeQuery, RelationshipQuery};
use crate::size::Size;
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    config: StorageConfig,
    nodes: RwLock<HashMap<NodeId, Node>>,
    relationships: RwLock<HashMap<RelId, Relationship>>,
    /// node_id → outgoing relationship IDs, in insertion order
    outgoing: RwLock<HashMap<NodeId, Vec<RelId>>>,
    /// node_id → incoming relationship IDs, in insertion order
    incoming: RwLock<HashMap<NodeId, Vec<RelId>>>,
    faults: RwLock<HashMap<NodeId, Fault>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

/// Failure returned by relationship queries anchored at a faulted node.
#[derive(Debug, Clone)]
pub enum Fault {
    Storage(String),
    TimedOut,
}

impl Fault {
    fn to_error(&self) -> Error {
        match self {
            Fault::Storage(message) => Error::Storage(message.clone()),
            Fault::TimedOut => Error::TimedOut,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_config(StorageConfig::default())
    }

    pub fn with_config(config: StorageConfig) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                config,
                nodes: RwLock::new(HashMap::new()),
                relationships: RwLock::new(HashMap::new()),
                outgoing: RwLock::new(HashMap::new()),
                incoming: RwLock::new(HashMap::new()),
                faults: RwLock::new(HashMap::new()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    /// Insert a node with a caller-chosen id, outside any transaction.
    pub fn seed_node(&self, node: Node) -> NodeId {
        let id = node.id;
        self.inner.next_node_id.fetch_max(id.0 + 1, Ordering::Relaxed);
        self.apply_node(node);
        id
    }

    /// Insert a relationship with a caller-chosen id, outside any transaction.
    pub fn seed_relationship(&self, rel: Relationship) -> RelId {
        let id = rel.id;
        self.inner.next_rel_id.fetch_max(id.0 + 1, Ordering::Relaxed);
        self.apply_relationship(rel);
        id
    }

    /// Make every relationship query anchored at `node` fail with `fault`.
    pub fn fail_expansion_of(&self, node: NodeId, fault: Fault) {
        self.inner.faults.write().insert(node, fault);
    }

    pub fn node_count(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.relationships.read().len()
    }

    fn apply_node(&self, node: Node) {
        self.inner.nodes.write().insert(node.id, node);
    }

    fn apply_relationship(&self, rel: Relationship) {
        self.inner.outgoing.write().entry(rel.src).or_default().push(rel.id);
        self.inner.incoming.write().entry(rel.dst).or_default().push(rel.id);
        self.inner.relationships.write().insert(rel.id, rel);
    }

    fn adjacent_ids(&self, node: NodeId, direction: Direction) -> Vec<RelId> {
        let from = |index: &RwLock<HashMap<NodeId, Vec<RelId>>>| {
            index.read().get(&node).cloned().unwrap_or_default()
        };

        match direction {
            Direction::Outgoing => from(&self.inner.outgoing),
            Direction::Incoming => from(&self.inner.incoming),
            Direction::Both => {
                let mut ids = from(&self.inner.outgoing);
                ids.extend(from(&self.inner.incoming));
                ids
            }
        }
    }
}

// ============================================================================
// Criteria evaluation
// ============================================================================

/// Node predicates do not constrain relationship queries.
fn matches_relationship(criteria: &Criteria, rel: &Relationship) -> bool {
    match criteria {
        Criteria::Kinds(kinds) => kinds.contains(&rel.kind),
        Criteria::Relationship(predicate) => predicate(rel),
        Criteria::Node(_) => true,
        Criteria::And(all) => all.iter().all(|c| matches_relationship(c, rel)),
        Criteria::Or(any) => any.iter().any(|c| matches_relationship(c, rel)),
        Criteria::Not(inner) => !matches_relationship(inner, rel),
    }
}

/// Relationship predicates do not constrain node queries.
fn matches_node(criteria: &Criteria, node: &Node) -> bool {
    match criteria {
        Criteria::Kinds(kinds) => contains_any(&node.kinds, kinds),
        Criteria::Relationship(_) => true,
        Criteria::Node(predicate) => predicate(node),
        Criteria::And(all) => all.iter().all(|c| matches_node(c, node)),
        Criteria::Or(any) => any.iter().any(|c| matches_node(c, node)),
        Criteria::Not(inner) => !matches_node(inner, node),
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

enum PendingWrite {
    Node(Node),
    Relationship(Relationship),
}

/// In-memory transaction. Batch transactions carry their unapplied writes.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    memory_limit: Size,
    pending: Vec<PendingWrite>,
}

impl MemoryTx {
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    fn require_batch(&self) -> Result<()> {
        match self.mode {
            TxMode::Batch => Ok(()),
            TxMode::ReadOnly => Err(Error::TxError(format!(
                "{} is read-only and cannot accept writes",
                self.id
            ))),
        }
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
    fn traversal_memory_limit(&self) -> Size { self.memory_limit }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx {
            id,
            mode,
            memory_limit: self.inner.config.traversal_memory_limit,
            pending: Vec::new(),
        })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        if !tx.pending.is_empty() {
            debug!(tx = %tx.id, writes = tx.pending.len(), "committing batch");
        }

        for write in tx.pending {
            match write {
                PendingWrite::Node(node) => self.apply_node(node),
                PendingWrite::Relationship(rel) => self.apply_relationship(rel),
            }
        }
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        if !tx.pending.is_empty() {
            debug!(tx = %tx.id, writes = tx.pending.len(), "discarding batch");
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    async fn get_nodes(&self, _tx: &MemoryTx, ids: &[NodeId]) -> Result<Vec<Node>> {
        let nodes = self.inner.nodes.read();
        Ok(ids.iter().filter_map(|id| nodes.get(id).cloned()).collect())
    }

    async fn fetch_relationships(
        &self,
        _tx: &MemoryTx,
        query: &RelationshipQuery,
    ) -> Result<Vec<Relationship>> {
        if let Some(fault) = self.inner.faults.read().get(&query.node) {
            return Err(fault.to_error());
        }

        let mut ids = self.adjacent_ids(query.node, query.direction);
        if query.order_by_id {
            ids.sort_unstable();
        }

        let relationships = self.inner.relationships.read();
        Ok(ids
            .iter()
            .filter_map(|id| relationships.get(id))
            .filter(|rel| {
                query
                    .criteria
                    .as_ref()
                    .is_none_or(|criteria| matches_relationship(criteria, rel))
            })
            .cloned()
            .collect())
    }

    async fn fetch_nodes(&self, _tx: &MemoryTx, query: &NodeQuery) -> Result<Vec<Node>> {
        let nodes = self.inner.nodes.read();
        let mut matched: Vec<Node> = nodes
            .values()
            .filter(|node| node.id >= query.floor && node.id < query.ceiling)
            .filter(|node| {
                query
                    .criteria
                    .as_ref()
                    .is_none_or(|criteria| matches_node(criteria, node))
            })
            .cloned()
            .collect();

        matched.sort_unstable_by_key(|node| node.id);
        Ok(matched)
    }

    async fn largest_node_id(&self, _tx: &MemoryTx) -> Result<Option<NodeId>> {
        Ok(self.inner.nodes.read().keys().max().copied())
    }

    // ========================================================================
    // Batch writes
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        kinds: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        tx.require_batch()?;

        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let mut node = Node::new(id).with_kinds(kinds.iter().copied());
        node.properties = props;

        tx.pending.push(PendingWrite::Node(node));
        Ok(id)
    }

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        kind: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        tx.require_batch()?;

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        let mut rel = Relationship::new(id, src, dst, kind);
        rel.properties = props;

        tx.pending.push(PendingWrite::Relationship(rel));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> MemoryBackend {
        let db = MemoryBackend::new();
        for id in 1..=4 {
            db.seed_node(Node::new(NodeId(id)).with_kinds(["Group"]));
        }
        db.seed_relationship(Relationship::new(RelId(12), NodeId(1), NodeId(3), "MemberOf"));
        db.seed_relationship(Relationship::new(RelId(11), NodeId(1), NodeId(2), "MemberOf"));
        db.seed_relationship(Relationship::new(RelId(13), NodeId(2), NodeId(4), "AdminTo"));
        db
    }

    #[tokio::test]
    async fn test_ordered_relationship_fetch() {
        let db = fixture();
        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();

        let unordered = db.fetch_relationships(&tx, &RelationshipQuery::outbound(NodeId(1))).await.unwrap();
        let ordered = db
            .fetch_relationships(&tx, &RelationshipQuery::outbound(NodeId(1)).ordered(true))
            .await
            .unwrap();

        assert_eq!(unordered.iter().map(|r| r.id).collect::<Vec<_>>(), vec![RelId(12), RelId(11)]);
        assert_eq!(ordered.iter().map(|r| r.id).collect::<Vec<_>>(), vec![RelId(11), RelId(12)]);
    }

    #[tokio::test]
    async fn test_criteria_filters_relationships() {
        let db = fixture();
        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();

        let query = RelationshipQuery::inbound(NodeId(4)).filter(Some(Criteria::kinds(["MemberOf"])));
        assert!(db.fetch_relationships(&tx, &query).await.unwrap().is_empty());

        let query = RelationshipQuery::inbound(NodeId(4)).filter(Some(Criteria::kinds(["AdminTo"])));
        let pairs = db.fetch_directional(&tx, &query).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1.id, NodeId(2));
    }

    #[tokio::test]
    async fn test_batch_writes_apply_on_commit_only() {
        let db = fixture();

        let mut tx = db.begin_tx(TxMode::Batch).await.unwrap();
        let id = db.create_node(&mut tx, &["User"], PropertyMap::new()).await.unwrap();
        assert_eq!(id, NodeId(5));
        assert_eq!(db.node_count(), 4);
        db.commit_tx(tx).await.unwrap();
        assert_eq!(db.node_count(), 5);

        let mut tx = db.begin_tx(TxMode::Batch).await.unwrap();
        db.create_relationship(&mut tx, NodeId(5), NodeId(1), "MemberOf", PropertyMap::new())
            .await
            .unwrap();
        db.rollback_tx(tx).await.unwrap();
        assert_eq!(db.relationship_count(), 3);
    }

    #[tokio::test]
    async fn test_read_only_tx_rejects_writes() {
        let db = fixture();
        let mut tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();

        let err = db.create_node(&mut tx, &["User"], PropertyMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::TxError(_)));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let db = fixture();
        db.fail_expansion_of(NodeId(2), Fault::TimedOut);
        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();

        let err = db
            .fetch_relationships(&tx, &RelationshipQuery::outbound(NodeId(2)))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }
}
