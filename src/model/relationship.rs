//! Relationship (edge) in the property graph.

use serde::{Deserialize, Serialize};

use super::{Kind, NodeId, PropertyMap, Value};
use crate::size::{Size, SizeOf};
use crate::{Error, Result};

/// Opaque relationship identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u64);

impl RelId {
    pub fn uint32(self) -> u32 {
        self.0 as u32
    }

    pub fn uint64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction.
///
/// `Outgoing` expands from a relationship's start node to its end node,
/// `Incoming` from the end node back to the start node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    pub fn reverse(self) -> Result<Direction> {
        match self {
            Direction::Outgoing => Ok(Direction::Incoming),
            Direction::Incoming => Ok(Direction::Outgoing),
            Direction::Both => Err(Error::InvalidDirection),
        }
    }

    /// The node a traversal arrives at when crossing `rel` in this direction.
    pub fn pick_target(self, rel: &Relationship) -> Result<NodeId> {
        match self {
            Direction::Outgoing => Ok(rel.dst),
            Direction::Incoming => Ok(rel.src),
            Direction::Both => Err(Error::InvalidDirection),
        }
    }

    /// The node a traversal departs from when crossing `rel` in this direction.
    pub fn pick_source(self, rel: &Relationship) -> Result<NodeId> {
        match self {
            Direction::Outgoing => Ok(rel.src),
            Direction::Incoming => Ok(rel.dst),
            Direction::Both => Err(Error::InvalidDirection),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Outgoing => write!(f, "outbound"),
            Direction::Incoming => write!(f, "inbound"),
            Direction::Both => write!(f, "both"),
        }
    }
}

/// A relationship (directed edge) in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub src: NodeId,
    pub dst: NodeId,
    pub kind: Kind,
    pub properties: PropertyMap,
}

impl Relationship {
    pub fn new(id: RelId, src: NodeId, dst: NodeId, kind: impl Into<Kind>) -> Self {
        Self {
            id,
            src,
            dst,
            kind: kind.into(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The "other" end of the relationship from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.src { Some(self.dst) }
        else if from == self.dst { Some(self.src) }
        else { None }
    }

    pub fn shallow(&self) -> Relationship {
        Relationship::new(self.id, self.src, self.dst, self.kind.clone())
    }
}

impl SizeOf for Relationship {
    fn size_of(&self) -> Size {
        Size::of::<Relationship>() + self.properties.size_of()
    }
}

impl SizeOf for RelId {
    fn size_of(&self) -> Size {
        Size::of::<RelId>()
    }
}
