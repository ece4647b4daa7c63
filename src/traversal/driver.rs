//! Lightweight one-hop drivers.
//!
//! These fetch relationship ids, endpoints and kinds only, never property
//! payloads, which keeps per-hop transfer small for sweeps that touch most
//! of a graph.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cardinality::{Bitmap64, Duplex};
use crate::graphcache::{self, Cache};
use crate::model::{Direction, NodeId, NodeSet, RelId};
use crate::query::{Criteria, RelationshipQuery};
use crate::segment::{IdSegment, PathSegment};
use crate::storage::StorageBackend;
use crate::{Error, Result};

use super::filter::{SegmentFilter, SegmentVisitor};
use super::Driver;

/// Expands one hop in a fixed direction, resolving endpoints through a
/// shared node [`Cache`].
pub struct LightweightDriver {
    direction: Direction,
    cache: Cache,
    criteria: Option<Criteria>,
    filter: SegmentFilter,
    terminal_visitors: Vec<SegmentVisitor>,
    ordered: bool,
}

impl LightweightDriver {
    pub fn new(direction: Direction, cache: Cache, criteria: Option<Criteria>, filter: SegmentFilter) -> Self {
        Self {
            direction,
            cache,
            criteria,
            filter,
            terminal_visitors: Vec::new(),
            ordered: false,
        }
    }

    /// Called with every segment that ends up with no accepted children.
    pub fn with_terminal_visitor(mut self, visitor: impl Fn(&Arc<PathSegment>) + Send + Sync + 'static) -> Self {
        self.terminal_visitors.push(Arc::new(visitor));
        self
    }

    /// Fetch each hop ordered by relationship id. Required for repeatable
    /// skip/limit windows.
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }
}

#[async_trait]
impl<B: StorageBackend> Driver<B> for LightweightDriver {
    async fn expand(
        &self,
        cancel: &CancellationToken,
        backend: &B,
        tx: &B::Tx,
        segment: &Arc<PathSegment>,
    ) -> Result<Vec<Arc<PathSegment>>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let query = RelationshipQuery::new(segment.node_id(), self.direction)
            .filter(self.criteria.clone())
            .ordered(self.ordered);

        let relationships = backend.shallow_fetch_relationships(tx, &query).await?;
        let mut targets = Vec::with_capacity(relationships.len());
        let mut to_fetch = Bitmap64::new();

        for rel in &relationships {
            let target = self.direction.pick_target(rel)?;
            to_fetch.checked_add(target.uint64());
            targets.push(target);
        }

        let ids: Vec<NodeId> = to_fetch.slice().into_iter().map(NodeId).collect();
        let nodes: NodeSet = graphcache::shallow_fetch_nodes_by_id(backend, tx, &self.cache, &ids)
            .await?
            .into_iter()
            .collect();

        let mut children = Vec::with_capacity(relationships.len());
        for (rel, target) in relationships.into_iter().zip(targets) {
            let Some(node) = nodes.get(target) else {
                continue;
            };

            let child = segment.descend(node.clone(), rel);
            if (self.filter)(&child) {
                children.push(child);
            } else {
                child.detach();
            }
        }

        if children.is_empty() {
            for visitor in &self.terminal_visitors {
                visitor(segment);
            }
        }

        Ok(children)
    }

    fn validate(&self) -> Result<()> {
        require_single_direction(self.direction)
    }
}

/// Identifier-only variant of [`LightweightDriver`] for sweeps where the
/// frontier can reach millions of live segments.
pub struct LightweightIdDriver {
    direction: Direction,
    criteria: Option<Criteria>,
    filter: SegmentFilter<NodeId, RelId>,
    terminal_visitors: Vec<SegmentVisitor<NodeId, RelId>>,
    ordered: bool,
}

impl LightweightIdDriver {
    pub fn new(direction: Direction, criteria: Option<Criteria>, filter: SegmentFilter<NodeId, RelId>) -> Self {
        Self {
            direction,
            criteria,
            filter,
            terminal_visitors: Vec::new(),
            ordered: false,
        }
    }

    pub fn with_terminal_visitor(mut self, visitor: impl Fn(&Arc<IdSegment>) + Send + Sync + 'static) -> Self {
        self.terminal_visitors.push(Arc::new(visitor));
        self
    }

    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }
}

#[async_trait]
impl<B: StorageBackend> Driver<B, NodeId, RelId> for LightweightIdDriver {
    async fn expand(
        &self,
        cancel: &CancellationToken,
        backend: &B,
        tx: &B::Tx,
        segment: &Arc<IdSegment>,
    ) -> Result<Vec<Arc<IdSegment>>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let query = RelationshipQuery::new(*segment.node(), self.direction)
            .filter(self.criteria.clone())
            .ordered(self.ordered);

        let mut children = Vec::new();
        for rel in backend.shallow_fetch_relationships(tx, &query).await? {
            let child = segment.descend(self.direction.pick_target(&rel)?, rel.id);
            if (self.filter)(&child) {
                children.push(child);
            } else {
                child.detach();
            }
        }

        if children.is_empty() {
            for visitor in &self.terminal_visitors {
                visitor(segment);
            }
        }

        Ok(children)
    }

    fn validate(&self) -> Result<()> {
        require_single_direction(self.direction)
    }
}

fn require_single_direction(direction: Direction) -> Result<()> {
    match direction {
        Direction::Both => Err(Error::InvalidDirection),
        _ => Ok(()),
    }
}
