//! Shared node cache used by traversal drivers.
//!
//! Nodes reached through many edges are fetched from the store once. A miss
//! is never a failure: [`shallow_fetch_nodes_by_id`] fetches whatever the
//! cache lacks just in time and populates the cache with it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::model::{Node, NodeId};
use crate::storage::StorageBackend;
use crate::Result;

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    #[inline]
    fn record(&self, hits: usize, misses: usize) {
        self.hits.fetch_add(hits as u64, Ordering::Relaxed);
        self.misses.fetch_add(misses as u64, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Node cache shared across workers. Cloning shares the same storage.
///
/// Entries are never evicted. An unbounded cache is meant to live for one
/// traversal and be dropped with it; use [`Cache::bounded`] when a cache is
/// kept across sweeps.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    nodes: RwLock<HashMap<NodeId, Node>>,
    max_entries: Option<usize>,
    stats: CacheStats,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that stops admitting new nodes once it holds `max_entries`.
    /// Lookups past that point fall through to the store.
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                max_entries: Some(max_entries),
                ..CacheInner::default()
            }),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<Node> {
        self.inner.nodes.read().get(&id).cloned()
    }

    /// Insert `node` unless one with the same id is already cached or the
    /// cache is full.
    pub fn put(&self, node: Node) {
        self.put_many([node]);
    }

    /// Cached nodes for `ids`, plus the ids that were not cached.
    pub fn get_many(&self, ids: &[NodeId]) -> (Vec<Node>, Vec<NodeId>) {
        let nodes = self.inner.nodes.read();
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        for id in ids {
            match nodes.get(id) {
                Some(node) => found.push(node.clone()),
                None => missing.push(*id),
            }
        }

        self.inner.stats.record(found.len(), missing.len());
        (found, missing)
    }

    pub fn put_many(&self, fetched: impl IntoIterator<Item = Node>) {
        let mut nodes = self.inner.nodes.write();
        let max_entries = self.inner.max_entries.unwrap_or(usize::MAX);

        for node in fetched {
            if nodes.len() >= max_entries {
                trace!(max_entries, "node cache full, not admitting further nodes");
                break;
            }
            nodes.entry(node.id).or_insert(node);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.read().is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }
}

/// Shallow nodes for `ids`, served from `cache` where possible. Misses are
/// fetched in one store call and written back to the cache.
pub async fn shallow_fetch_nodes_by_id<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    cache: &Cache,
    ids: &[NodeId],
) -> Result<Vec<Node>> {
    let (mut nodes, missing) = cache.get_many(ids);

    if !missing.is_empty() {
        trace!(cached = nodes.len(), missing = missing.len(), "fetching uncached nodes");

        let fetched = backend.shallow_get_nodes(tx, &missing).await?;
        cache.put_many(fetched.iter().cloned());
        nodes.extend(fetched);
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use crate::tx::TxMode;

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let db = MemoryBackend::new();
        db.seed_node(Node::new(NodeId(1)).with_kinds(["User"]).with_property("name", "alice"));
        db.seed_node(Node::new(NodeId(2)).with_kinds(["Group"]));

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let cache = Cache::new();

        let first = shallow_fetch_nodes_by_id(&db, &tx, &cache, &[NodeId(1), NodeId(2)]).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|node| node.properties.is_empty()));
        assert_eq!(cache.stats().misses(), 2);

        let second = shallow_fetch_nodes_by_id(&db, &tx, &cache, &[NodeId(2)]).await.unwrap();
        assert_eq!(second[0].id, NodeId(2));
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_bounded_cache_stops_growing() {
        let db = MemoryBackend::new();
        for id in 1..=5 {
            db.seed_node(Node::new(NodeId(id)));
        }

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let cache = Cache::bounded(2);
        let ids: Vec<NodeId> = (1..=5).map(NodeId).collect();

        let first = shallow_fetch_nodes_by_id(&db, &tx, &cache, &ids).await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(cache.len(), 2);

        // Nodes that were not admitted are still served, from the store.
        let second = shallow_fetch_nodes_by_id(&db, &tx, &cache, &ids).await.unwrap();
        assert_eq!(second.len(), 5);
        assert_eq!(cache.stats().hits(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_put_keeps_first_copy() {
        let cache = Cache::new();
        cache.put(Node::new(NodeId(1)).with_kinds(["User"]));
        cache.put(Node::new(NodeId(1)).with_kinds(["Computer"]));

        assert!(cache.get(NodeId(1)).unwrap().has_kind("User"));
    }
}
