//! Single-task, stack-driven traversal for bounded pathfinding.
//!
//! Frontier segments are popped last-in-first-out, so exploration is depth
//! first even when a skip/limit window is used to answer breadth-style
//! questions. Unlike the concurrent sweep, exceeding the transaction's memory
//! ceiling aborts the whole call.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cardinality::{Bitmap64, Duplex};
use crate::model::{Direction, Node, NodeSet, PathSet};
use crate::query::{Criteria, RelationshipQuery};
use crate::segment::PathSegment;
use crate::storage::StorageBackend;
use crate::tx::Transaction;
use crate::{Error, Result};

/// Decides whether the traversal may continue past a candidate segment.
pub type DescentFilter<'a> =
    Box<dyn FnMut(&mut TraversalContext, &Arc<PathSegment>) -> Result<bool> + Send + 'a>;

/// Gates whether a terminal segment is handed to the path visitor.
pub type PathFilter<'a> = Box<dyn FnMut(&mut TraversalContext, &Arc<PathSegment>) -> bool + Send + 'a>;

/// Receives terminal segments.
pub type PathVisitor<'a> =
    Box<dyn FnMut(&mut TraversalContext, &Arc<PathSegment>) -> Result<()> + Send + 'a>;

type ExpansionFilter<'a> = Box<dyn FnMut(&Arc<PathSegment>) -> bool + Send + 'a>;

// ============================================================================
// Limit / skip tracking
// ============================================================================

/// Skip-then-limit window over collected results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitSkipTracker {
    pub limit: usize,
    pub skip: usize,
    seen: usize,
}

impl LimitSkipTracker {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self { limit, skip, seen: 0 }
    }

    /// A limit of zero means unlimited.
    pub fn at_limit(&self) -> bool {
        self.limit > 0 && self.seen >= self.limit
    }

    /// Consume one result: false while skipping or once at the limit.
    pub fn should_collect(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }

        if !self.at_limit() {
            self.seen += 1;
            return true;
        }

        false
    }

    pub fn seen(&self) -> usize {
        self.seen
    }
}

/// Mutable state threaded through filters and visitors.
#[derive(Debug, Default)]
pub struct TraversalContext {
    pub limit_skip_tracker: LimitSkipTracker,
}

// ============================================================================
// Plan
// ============================================================================

/// Settings for one stack traversal.
pub struct TraversalPlan<'a> {
    pub root: Node,
    pub direction: Direction,
    /// Extra criteria for every one-hop relationship query.
    pub branch_query: Option<Criteria>,
    pub descent_filter: Option<DescentFilter<'a>>,
    pub path_filter: Option<PathFilter<'a>>,
    pub skip: usize,
    pub limit: usize,
    expansion_filter: Option<ExpansionFilter<'a>>,
}

impl<'a> TraversalPlan<'a> {
    pub fn new(root: Node, direction: Direction) -> Self {
        Self {
            root,
            direction,
            branch_query: None,
            descent_filter: None,
            path_filter: None,
            skip: 0,
            limit: 0,
            expansion_filter: None,
        }
    }

    pub fn with_branch_query(mut self, criteria: Criteria) -> Self {
        self.branch_query = Some(criteria);
        self
    }

    pub fn with_descent_filter(
        mut self,
        filter: impl FnMut(&mut TraversalContext, &Arc<PathSegment>) -> Result<bool> + Send + 'a,
    ) -> Self {
        self.descent_filter = Some(Box::new(filter));
        self
    }

    pub fn with_path_filter(
        mut self,
        filter: impl FnMut(&mut TraversalContext, &Arc<PathSegment>) -> bool + Send + 'a,
    ) -> Self {
        self.path_filter = Some(Box::new(filter));
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn require_order(&self) -> bool {
        self.limit > 0 || self.skip > 0
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// Walk the graph from `plan.root` one hop per popped segment.
///
/// At most one path visitor may be given; more is a configuration error
/// raised before any store access. `cancel` is checked before every hop.
/// [`Error::HaltTraversal`] from a filter or the visitor ends the walk with
/// `Ok(())`.
pub async fn traverse<'a, B: StorageBackend>(
    cancel: &CancellationToken,
    backend: &B,
    tx: &B::Tx,
    plan: TraversalPlan<'a>,
    path_visitors: Vec<PathVisitor<'a>>,
) -> Result<()> {
    if path_visitors.len() > 1 {
        return Err(Error::Config("specifying more than 1 path visitor is not supported".into()));
    }
    if plan.direction == Direction::Both {
        return Err(Error::InvalidDirection);
    }

    let started = Instant::now();
    let root_id = plan.root.id;
    let require_order = plan.require_order();
    let memory_limit = tx.traversal_memory_limit();

    let TraversalPlan {
        root,
        direction,
        branch_query,
        mut descent_filter,
        mut path_filter,
        skip,
        limit,
        mut expansion_filter,
    } = plan;

    let mut path_visitor = path_visitors.into_iter().next();
    let mut ctx = TraversalContext {
        limit_skip_tracker: LimitSkipTracker::new(skip, limit),
    };

    let root_segment = PathSegment::new_root(root);
    let mut stack = vec![root_segment.clone()];

    'traversal: while let Some(next) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let in_use = root_segment.size_of();
        if in_use > memory_limit {
            return Err(Error::TraversalMemoryLimit {
                limit: memory_limit,
                in_use,
            });
        }

        let expand = expansion_filter.as_mut().is_none_or(|filter| filter(&next));
        let descendants = if expand {
            let query = RelationshipQuery::new(next.node_id(), direction)
                .filter(branch_query.clone())
                .ordered(require_order);

            backend
                .fetch_directional(tx, &query)
                .await?
                .into_iter()
                .map(|(rel, node)| next.descend(node, rel))
                .collect()
        } else {
            Vec::new()
        };

        let stack_len_before = stack.len();

        match descent_filter.as_mut() {
            Some(filter) => {
                for descendant in descendants {
                    match filter(&mut ctx, &descendant) {
                        Ok(true) => stack.push(descendant),
                        Ok(false) => descendant.detach(),
                        Err(err) if err.is_halt() => break 'traversal,
                        Err(err) => return Err(err),
                    }
                }
            }
            None => stack.extend(descendants),
        }

        if stack.len() == stack_len_before && !next.is_root() {
            if let Some(visitor) = path_visitor.as_mut() {
                let accepted = path_filter.as_mut().is_none_or(|filter| filter(&mut ctx, &next));

                if accepted {
                    match visitor(&mut ctx, &next) {
                        Ok(()) => {}
                        Err(err) if err.is_halt() => break 'traversal,
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        if ctx.limit_skip_tracker.at_limit() {
            debug!(root = %root_id, limit, "traversal reached its collection limit");
            break;
        }
    }

    info!(
        root = %root_id,
        collected = ctx.limit_skip_tracker.seen(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "node traversal complete"
    );

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Every cycle-free terminal path, subject to the plan's skip/limit window.
pub async fn traverse_paths<'a, B: StorageBackend>(
    cancel: &CancellationToken,
    backend: &B,
    tx: &B::Tx,
    mut plan: TraversalPlan<'a>,
) -> Result<PathSet> {
    let mut paths = PathSet::new();
    let mut inner = plan.descent_filter.take();

    plan.descent_filter = Some(Box::new(
        move |ctx: &mut TraversalContext, segment: &Arc<PathSegment>| -> Result<bool> {
            if let Some(filter) = inner.as_mut() {
                if !filter(ctx, segment)? {
                    return Ok(false);
                }
            }
            Ok(!segment.is_cycle())
        },
    ));

    let collected = &mut paths;
    let visitor: PathVisitor<'_> = Box::new(move |ctx: &mut TraversalContext, segment: &Arc<PathSegment>| {
        if ctx.limit_skip_tracker.should_collect() {
            collected.add_path(segment.path());
        }
        Ok(())
    });

    traverse(cancel, backend, tx, plan, vec![visitor]).await?;

    Ok(paths)
}

/// Every path (not only terminal ones) ending at a node accepted by
/// `node_filter`.
pub async fn traverse_intermediary_paths<'a, B: StorageBackend>(
    cancel: &CancellationToken,
    backend: &B,
    tx: &B::Tx,
    mut plan: TraversalPlan<'a>,
    mut node_filter: impl FnMut(&Node) -> bool + Send,
) -> Result<PathSet> {
    let mut paths = PathSet::new();
    let mut inner = plan.descent_filter.take();
    let collected = &mut paths;

    let plan = TraversalPlan {
        descent_filter: Some(Box::new(
            move |ctx: &mut TraversalContext, segment: &Arc<PathSegment>| -> Result<bool> {
                if let Some(filter) = inner.as_mut() {
                    if !filter(ctx, segment)? {
                        return Ok(false);
                    }
                }

                if node_filter(segment.node()) && ctx.limit_skip_tracker.should_collect() {
                    collected.add_path(segment.path());
                }
                Ok(true)
            },
        )),
        ..plan
    };

    traverse(cancel, backend, tx, plan, Vec::new()).await?;
    Ok(paths)
}

/// Every node reachable from the root (root included) accepted by
/// `node_filter`, expanding each node at most once.
pub async fn acyclic_traverse_nodes<'a, B: StorageBackend>(
    cancel: &CancellationToken,
    backend: &B,
    tx: &B::Tx,
    mut plan: TraversalPlan<'a>,
    mut node_filter: impl FnMut(&Node) -> bool + Send,
) -> Result<NodeSet> {
    let mut nodes = NodeSet::new();

    if node_filter(&plan.root) {
        nodes.add(plan.root.clone());
    }

    let mut inner = plan.descent_filter.take();
    let collected = &mut nodes;

    let plan = TraversalPlan {
        expansion_filter: Some(expand_each_node_once()),
        descent_filter: Some(Box::new(
            move |ctx: &mut TraversalContext, segment: &Arc<PathSegment>| -> Result<bool> {
                if let Some(filter) = inner.as_mut() {
                    if !filter(ctx, segment)? {
                        return Ok(false);
                    }
                }

                if node_filter(segment.node()) && ctx.limit_skip_tracker.should_collect() {
                    collected.add(segment.node().clone());
                }
                Ok(true)
            },
        )),
        ..plan
    };

    traverse(cancel, backend, tx, plan, Vec::new()).await?;
    Ok(nodes)
}

/// The terminal node of every path, expanding each node at most once.
pub async fn acyclic_traverse_terminals<'a, B: StorageBackend>(
    cancel: &CancellationToken,
    backend: &B,
    tx: &B::Tx,
    mut plan: TraversalPlan<'a>,
) -> Result<NodeSet> {
    let mut terminals = NodeSet::new();
    plan.expansion_filter = Some(expand_each_node_once());

    let collected = &mut terminals;
    let visitor: PathVisitor<'_> = Box::new(move |ctx: &mut TraversalContext, segment: &Arc<PathSegment>| {
        if ctx.limit_skip_tracker.should_collect() {
            collected.add(segment.node().clone());
        }
        Ok(())
    });

    traverse(cancel, backend, tx, plan, vec![visitor]).await?;

    Ok(terminals)
}

fn expand_each_node_once<'a>() -> ExpansionFilter<'a> {
    let mut visited = Bitmap64::new();
    Box::new(move |segment: &Arc<PathSegment>| visited.checked_add(segment.node_id().uint64()))
}
