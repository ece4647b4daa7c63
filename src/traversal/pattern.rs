//! Fluent chained expansions.
//!
//! ```text
//! Pattern::new()
//!     .outbound([Criteria::kinds(["MemberOf"])])          // one or more hops
//!     .inbound_with_depth(0, 1, [Criteria::kinds(["HasSession"])]) // optional single hop
//!     .on_match(|terminal| { ... })
//! ```
//!
//! Each expansion step has a direction, criteria and a depth window. A
//! `max_depth` of zero expands without bound; a `min_depth` of zero makes the
//! step optional. The resulting [`PatternDriver`] plugs into
//! [`Traversal::breadth_first`](super::Traversal::breadth_first) like any
//! other driver.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::{Direction, Node, Relationship};
use crate::query::{Criteria, RelationshipQuery};
use crate::segment::PathSegment;
use crate::storage::StorageBackend;
use crate::{Error, Result};

use super::Driver;

/// Receives each path that satisfied every expansion step.
pub type PatternMatchDelegate = Arc<dyn Fn(&Arc<PathSegment>) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone)]
struct Expansion {
    criteria: Option<Criteria>,
    direction: Direction,
    min_depth: usize,
    max_depth: usize,
}

impl Expansion {
    fn can_descend(&self, depth: usize) -> bool {
        self.max_depth == 0 || depth < self.max_depth
    }

    fn query(&self, segment: &PathSegment) -> RelationshipQuery {
        RelationshipQuery::new(segment.node_id(), self.direction).filter(self.criteria.clone())
    }
}

/// Position of a frontier segment within the pattern. Lives in the segment's
/// tag slot until the driver pops it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PatternTag {
    index: usize,
    depth: usize,
}

fn pop_tag(segment: &PathSegment) -> PatternTag {
    segment
        .take_tag()
        .and_then(|tag| tag.downcast::<PatternTag>().ok())
        .map(|tag| *tag)
        .unwrap_or_default()
}

/// Builder for a [`PatternDriver`].
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    expansions: Vec<Expansion>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Required outbound step of unbounded depth.
    pub fn outbound(self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.outbound_with_depth(1, 0, criteria)
    }

    pub fn outbound_with_depth(self, min_depth: usize, max_depth: usize, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.push(Direction::Outgoing, min_depth, max_depth, criteria)
    }

    /// Required inbound step of unbounded depth.
    pub fn inbound(self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.inbound_with_depth(1, 0, criteria)
    }

    pub fn inbound_with_depth(self, min_depth: usize, max_depth: usize, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.push(Direction::Incoming, min_depth, max_depth, criteria)
    }

    /// Finish the pattern with the delegate that receives matching paths.
    pub fn on_match(self, delegate: impl Fn(&Arc<PathSegment>) -> Result<()> + Send + Sync + 'static) -> PatternDriver {
        PatternDriver {
            expansions: self.expansions,
            delegate: Arc::new(delegate),
        }
    }

    fn push(mut self, direction: Direction, min_depth: usize, max_depth: usize, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        let criteria: Vec<Criteria> = criteria.into_iter().collect();

        self.expansions.push(Expansion {
            criteria: (!criteria.is_empty()).then(|| Criteria::and(criteria)),
            direction,
            min_depth,
            max_depth,
        });
        self
    }
}

/// Driver produced by [`Pattern::on_match`].
pub struct PatternDriver {
    expansions: Vec<Expansion>,
    delegate: PatternMatchDelegate,
}

impl PatternDriver {
    /// Fetch one hop of `expansion` from `segment`. Cycles are dropped and
    /// every surviving child is tagged with `next`.
    async fn fetch<B: StorageBackend>(
        &self,
        backend: &B,
        tx: &B::Tx,
        segment: &Arc<PathSegment>,
        expansion: &Expansion,
        next: PatternTag,
        children: &mut Vec<Arc<PathSegment>>,
    ) -> Result<()> {
        for (rel, node) in backend.fetch_directional(tx, &expansion.query(segment)).await? {
            let child = segment.descend(node, rel);

            if child.is_cycle() {
                child.detach();
                continue;
            }

            child.set_tag(Box::new(next));
            children.push(child);
        }

        Ok(())
    }
}

#[async_trait]
impl<B: StorageBackend> Driver<B, Node, Relationship> for PatternDriver {
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

        let tag = pop_tag(segment);
        let Some(current) = self.expansions.get(tag.index) else {
            return Err(Error::Config(format!("pattern has no expansion step {}", tag.index)));
        };

        let mut children = Vec::new();

        if current.can_descend(tag.depth) {
            let next = PatternTag {
                index: tag.index,
                depth: tag.depth + 1,
            };
            self.fetch(backend, tx, segment, current, next, &mut children).await?;
        }

        // Reaching here at or past the step's minimum depth completes it.
        if tag.depth < current.min_depth {
            return Ok(children);
        }

        let next_index = tag.index + 1;
        match self.expansions.get(next_index) {
            // An optional step is entered by re-queueing this segment at
            // depth zero of that step; its own expansion happens then.
            Some(next) if next.min_depth == 0 => {
                segment.set_tag(Box::new(PatternTag {
                    index: next_index,
                    depth: 0,
                }));
                children.push(segment.clone());
            }
            Some(next) => {
                let tag = PatternTag {
                    index: next_index,
                    depth: 1,
                };
                self.fetch(backend, tx, segment, next, tag, &mut children).await?;
            }
            None if children.is_empty() => (self.delegate)(segment)?,
            None => {}
        }

        Ok(children)
    }
}
