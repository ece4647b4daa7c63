//! Descent filters for the concurrent sweep.
//!
//! Every filter here may be called from many workers at once. Shared state
//! lives behind [`ThreadSafeDuplex`] or lock-free counters and is only
//! touched through their atomic entry points.

use std::sync::Arc;

use tracing::debug;

use crate::cardinality::{Bitmap64, ThreadSafeDuplex};
use crate::model::{Node, NodeId, RelId, Relationship};
use crate::segment::{format_segment, Segment, SegmentPayload};
use crate::util::atomics::Counter;

/// Returns true if descent past the given segment is allowed.
pub type SegmentFilter<N = Node, E = Relationship> = Arc<dyn Fn(&Arc<Segment<N, E>>) -> bool + Send + Sync>;

/// Receives segments chosen by a filter or driver.
pub type SegmentVisitor<N = Node, E = Relationship> = Arc<dyn Fn(&Arc<Segment<N, E>>) + Send + Sync>;

/// Allow each node to be reached once. Cycles are rejected, then the first
/// path to arrive at a node wins and every later arrival is rejected.
/// Surviving segments are handed to `delegate`.
pub fn acyclic_node_filter<N, E>(
    delegate: impl Fn(&Arc<Segment<N, E>>) -> bool + Send + Sync + 'static,
) -> SegmentFilter<N, E>
where
    N: SegmentPayload<Id = NodeId>,
    E: SegmentPayload,
{
    let visited = ThreadSafeDuplex::new(Bitmap64::new());

    Arc::new(move |next: &Arc<Segment<N, E>>| {
        if next.is_cycle() {
            return false;
        }

        if !visited.checked_add(next.node_id().uint64()) {
            return false;
        }

        delegate(next)
    })
}

/// Allow each edge to be traversed once. A node may still be reached through
/// any number of distinct edges.
pub fn unique_path_filter<N, E>(
    delegate: impl Fn(&Arc<Segment<N, E>>) -> bool + Send + Sync + 'static,
) -> SegmentFilter<N, E>
where
    N: SegmentPayload,
    E: SegmentPayload<Id = RelId>,
{
    let traversed = ThreadSafeDuplex::new(Bitmap64::new());

    Arc::new(move |next: &Arc<Segment<N, E>>| {
        if next.is_cycle() {
            return false;
        }

        if let Some(edge_id) = next.edge_id() {
            if !traversed.checked_add(edge_id.uint64()) {
                return false;
            }
        }

        delegate(next)
    })
}

/// Collect a skip/limit window of segments.
///
/// `filter` returns `(collectible, descend)`. Collectible segments are
/// skipped while `skip` remains, then handed to `visitor` until `limit` is
/// spent. After that every collectible segment is rejected outright, so no
/// branch descends past a result that can no longer be collected. A limit of
/// zero means unlimited.
///
/// Results are only repeatable if the driver produces children in a stable
/// order.
pub fn filtered_skip_limit<N, E>(
    filter: impl Fn(&Arc<Segment<N, E>>) -> (bool, bool) + Send + Sync + 'static,
    visitor: impl Fn(&Arc<Segment<N, E>>) + Send + Sync + 'static,
    skip: usize,
    limit: usize,
) -> SegmentFilter<N, E>
where
    N: SegmentPayload,
    E: SegmentPayload,
{
    let skipped = Counter::new(skip as u64);
    let collected = Counter::new(limit as u64);

    Arc::new(move |next: &Arc<Segment<N, E>>| {
        let (collectible, descend) = filter(next);

        if collectible {
            if skip == 0 || skipped.tick() {
                if limit > 0 && collected.tick() {
                    debug!(path = %format_segment(next), "at collection limit, rejecting path");
                    return false;
                }

                debug!(path = %format_segment(next), "collected path");
                visitor(next);
            } else {
                debug!(path = %format_segment(next), "skipping path visit");
            }
        }

        if descend {
            debug!(path = %format_segment(next), "descending into path");
        } else {
            debug!(path = %format_segment(next), "rejecting further descent into path");
        }

        descend
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::PathSegment;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn node(id: u64) -> Node {
        Node::new(NodeId(id))
    }

    fn rel(id: u64, src: u64, dst: u64) -> Relationship {
        Relationship::new(RelId(id), NodeId(src), NodeId(dst), "MemberOf")
    }

    #[test]
    fn test_acyclic_filter_rejects_return_to_root() {
        let filter = acyclic_node_filter(|_| true);
        let root = PathSegment::new_root(node(1));
        let a = root.descend(node(2), rel(10, 1, 2));
        let back = a.descend(node(1), rel(11, 2, 1));

        assert!(filter(&a));
        assert!(!filter(&back));
    }

    #[test]
    fn test_acyclic_filter_accepts_first_arrival_only() {
        let filter = acyclic_node_filter(|_| true);
        let root = PathSegment::new_root(node(1));
        let a = root.descend(node(2), rel(10, 1, 2));
        let b = root.descend(node(3), rel(11, 1, 3));
        let via_a = a.descend(node(4), rel(12, 2, 4));
        let via_b = b.descend(node(4), rel(13, 3, 4));

        assert!(filter(&a));
        assert!(filter(&b));
        assert!(filter(&via_a));
        assert!(!filter(&via_b));
    }

    #[test]
    fn test_acyclic_filter_consults_delegate_last() {
        let filter = acyclic_node_filter(|segment: &Arc<PathSegment>| segment.node_id() != NodeId(2));
        let root = PathSegment::new_root(node(1));

        assert!(!filter(&root.descend(node(2), rel(10, 1, 2))));
        assert!(filter(&root.descend(node(3), rel(11, 1, 3))));
    }

    #[test]
    fn test_unique_path_filter() {
        let filter = unique_path_filter(|_| true);
        let root = PathSegment::new_root(node(1));
        let a = root.descend(node(2), rel(10, 1, 2));
        let b = root.descend(node(3), rel(11, 1, 3));
        let via_a = a.descend(node(4), rel(12, 2, 4));
        let via_b = b.descend(node(4), rel(13, 3, 4));
        let again = root.descend(node(2), rel(10, 1, 2));

        assert!(filter(&a));
        assert!(filter(&b));
        assert!(filter(&via_a));
        assert!(filter(&via_b));
        assert!(!filter(&again));
    }

    #[test]
    fn test_filtered_skip_limit_collects_middle_candidate() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();

        let filter = filtered_skip_limit(
            |_: &Arc<PathSegment>| (true, true),
            move |segment: &Arc<PathSegment>| sink.lock().push(segment.node_id()),
            1,
            1,
        );

        let root = PathSegment::new_root(node(1));
        let verdicts: Vec<bool> = (2..=4)
            .map(|id| filter(&root.descend(node(id), rel(id + 10, 1, id))))
            .collect();

        assert_eq!(*collected.lock(), vec![NodeId(3)]);
        assert_eq!(verdicts, vec![true, true, false]);
    }

    #[test]
    fn test_filtered_skip_limit_ignores_non_collectible() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();

        let filter = filtered_skip_limit(
            |segment: &Arc<PathSegment>| (segment.node().has_kind("User"), true),
            move |segment: &Arc<PathSegment>| sink.lock().push(segment.node_id()),
            0,
            1,
        );

        let root = PathSegment::new_root(node(1));
        assert!(filter(&root.descend(node(2), rel(12, 1, 2))));
        assert!(filter(&root.descend(Node::new(NodeId(3)).with_kinds(["User"]), rel(13, 1, 3))));
        assert!(filter(&root.descend(node(4), rel(14, 1, 4))));
        assert!(!filter(&root.descend(Node::new(NodeId(5)).with_kinds(["User"]), rel(15, 1, 5))));

        assert_eq!(*collected.lock(), vec![NodeId(3)]);
    }
}
