//! # Path Segment Tree
//!
//! The cactus tree: every path discovered from a root, with shared prefixes
//! stored once. A segment owns its children; its link to the parent
//! ("trunk") is a `Weak` back-reference used only for ancestry walks. The
//! tree stays alive as long as its root does, which is the lifetime of one
//! traversal call.
//!
//! Children are appended through [`Segment::descend`], the only mutation
//! concurrent workers perform on shared segments.
//!
//! ```text
//! root ─┬─ a ─── c
//!       └─ b ─┬─ c
//!             └─ d
//! ```

use std::any::Any;
use std::fmt::{self, Write as _};
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::model::{Node, NodeId, Path, RelId, Relationship};
use crate::size::{Size, SizeOf};

/// Payload stored at a segment: a node or edge, full or identifier-only.
pub trait SegmentPayload: Clone + SizeOf + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + fmt::Display + Send + Sync;

    fn payload_id(&self) -> Self::Id;
}

impl SegmentPayload for Node {
    type Id = NodeId;

    fn payload_id(&self) -> NodeId {
        self.id
    }
}

impl SegmentPayload for NodeId {
    type Id = NodeId;

    fn payload_id(&self) -> NodeId {
        *self
    }
}

impl SegmentPayload for Relationship {
    type Id = RelId;

    fn payload_id(&self) -> RelId {
        self.id
    }
}

impl SegmentPayload for RelId {
    type Id = RelId;

    fn payload_id(&self) -> RelId {
        *self
    }
}

/// Opaque per-segment annotation owned by whichever driver set it.
pub type Tag = Box<dyn Any + Send + Sync>;

/// One hop of a path: the node reached and the edge used to reach it.
pub struct Segment<N, E> {
    node: N,
    edge: Option<E>,
    trunk: Weak<Segment<N, E>>,
    depth: usize,
    branches: Mutex<Vec<Arc<Segment<N, E>>>>,
    tag: Mutex<Option<Tag>>,
}

/// Segment carrying full (or shallow) nodes and relationships.
pub type PathSegment = Segment<Node, Relationship>;

/// Segment carrying identifiers only.
pub type IdSegment = Segment<NodeId, RelId>;

impl<N: SegmentPayload, E: SegmentPayload> Segment<N, E> {
    /// A depth-0 segment with no trunk and no edge.
    pub fn new_root(node: N) -> Arc<Self> {
        Arc::new(Self {
            node,
            edge: None,
            trunk: Weak::new(),
            depth: 0,
            branches: Mutex::new(Vec::new()),
            tag: Mutex::new(None),
        })
    }

    /// Create a child of this segment reached via `edge` and append it to
    /// this segment's branches.
    pub fn descend(self: &Arc<Self>, node: N, edge: E) -> Arc<Self> {
        let child = Arc::new(Self {
            node,
            edge: Some(edge),
            trunk: Arc::downgrade(self),
            depth: self.depth + 1,
            branches: Mutex::new(Vec::new()),
            tag: Mutex::new(None),
        });

        self.branches.lock().push(child.clone());
        child
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn node_id(&self) -> N::Id {
        self.node.payload_id()
    }

    /// The edge used to reach this segment. `None` at the root.
    pub fn edge(&self) -> Option<&E> {
        self.edge.as_ref()
    }

    pub fn edge_id(&self) -> Option<E::Id> {
        self.edge.as_ref().map(SegmentPayload::payload_id)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn trunk(&self) -> Option<Arc<Self>> {
        self.trunk.upgrade()
    }

    /// Snapshot of the children discovered so far.
    pub fn branches(&self) -> Vec<Arc<Self>> {
        self.branches.lock().clone()
    }

    pub fn num_branches(&self) -> usize {
        self.branches.lock().len()
    }

    /// Visit this segment and then each ancestor up to the root, stopping
    /// early when the delegate returns false.
    pub fn walk_reverse(self: &Arc<Self>, mut delegate: impl FnMut(&Arc<Self>) -> bool) {
        let mut cursor = Some(self.clone());

        while let Some(segment) = cursor {
            if !delegate(&segment) {
                break;
            }
            cursor = segment.trunk();
        }
    }

    /// True if this segment's node also appears at any ancestor, root included.
    pub fn is_cycle(&self) -> bool {
        let id = self.node_id();
        let mut cursor = self.trunk();

        while let Some(ancestor) = cursor {
            if ancestor.node_id() == id {
                return true;
            }
            cursor = ancestor.trunk();
        }

        false
    }

    /// Remove this segment from its trunk's branches.
    pub fn detach(self: &Arc<Self>) {
        if let Some(trunk) = self.trunk() {
            trunk.branches.lock().retain(|branch| !Arc::ptr_eq(branch, self));
        }
    }

    /// Estimated bytes held by this segment, its payloads and every segment
    /// below it. Recomputed on every call because other workers keep
    /// appending while a traversal runs.
    pub fn size_of(&self) -> Size {
        let mut total = self.own_size();
        let mut pending = self.branches();

        while let Some(next) = pending.pop() {
            total += next.own_size();
            pending.extend(next.branches.lock().iter().cloned());
        }

        total
    }

    fn own_size(&self) -> Size {
        let branches = self.branches.lock();

        Size::of::<Self>()
            + self.node.size_of()
            + self.edge.as_ref().map(SizeOf::size_of).unwrap_or_default()
            + Size::of_slots::<Arc<Self>>(branches.capacity())
    }

    /// The root-to-here sequence of nodes and edges.
    pub fn path(self: &Arc<Self>) -> Path<N, E> {
        let mut nodes = Vec::with_capacity(self.depth + 1);
        let mut edges = Vec::with_capacity(self.depth);

        self.walk_reverse(|segment| {
            nodes.push(segment.node.clone());
            if let Some(edge) = &segment.edge {
                edges.push(edge.clone());
            }
            true
        });

        nodes.reverse();
        edges.reverse();
        Path { nodes, edges }
    }

    pub fn set_tag(&self, tag: Tag) {
        *self.tag.lock() = Some(tag);
    }

    /// Remove and return this segment's tag.
    pub fn take_tag(&self) -> Option<Tag> {
        self.tag.lock().take()
    }
}

impl<N: SegmentPayload, E: SegmentPayload> fmt::Debug for Segment<N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("node", &self.node_id().to_string())
            .field("edge", &self.edge_id().map(|id| id.to_string()))
            .field("depth", &self.depth)
            .finish()
    }
}

// Arc-owned children would otherwise drop recursively, one stack frame per
// level of depth.
impl<N, E> Drop for Segment<N, E> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(self.branches.get_mut());

        while let Some(branch) = pending.pop() {
            if let Some(mut segment) = Arc::into_inner(branch) {
                pending.append(segment.branches.get_mut());
            }
        }
    }
}

/// Compact rendering of the path ending at `segment`: `(1)-[10]->(2)-[11]->(3)`.
pub fn format_segment<N: SegmentPayload, E: SegmentPayload>(segment: &Arc<Segment<N, E>>) -> String {
    let path = segment.path();
    let mut out = String::new();

    for (idx, node) in path.nodes.iter().enumerate() {
        if idx > 0 {
            let _ = write!(out, "-[{}]->", path.edges[idx - 1].payload_id());
        }
        let _ = write!(out, "({})", node.payload_id());
    }

    out
}

/// The root of a cactus tree, held for the lifetime of one traversal.
pub struct Tree<N, E> {
    pub root: Arc<Segment<N, E>>,
}

impl<N: SegmentPayload, E: SegmentPayload> Tree<N, E> {
    pub fn new(root: N) -> Self {
        Self {
            root: Segment::new_root(root),
        }
    }

    pub fn from_segment(root: Arc<Segment<N, E>>) -> Self {
        Self { root }
    }

    pub fn size_of(&self) -> Size {
        Size::of::<Self>() + self.root.size_of()
    }
}

impl<N: SegmentPayload, E: SegmentPayload> fmt::Debug for Tree<N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree").field("root", &self.root).finish()
    }
}

impl<N, E> Clone for Tree<N, E> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}
