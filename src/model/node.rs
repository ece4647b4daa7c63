//! Node in the property graph.

use serde::{Deserialize, Serialize};

use super::{Kind, Kinds, PropertyMap, Value};
use crate::size::{Size, SizeOf};

/// Opaque node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Truncating conversion for 32-bit id bitmaps.
    pub fn uint32(self) -> u32 {
        self.0 as u32
    }

    pub fn uint64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id as u64)
    }
}

/// A node in the property graph.
///
/// A "shallow" node carries only its id and kinds; properties are left empty
/// so traversal frontiers stay small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kinds: Kinds,
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            kinds: Kinds::new(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = impl Into<Kind>>) -> Self {
        self.kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k.as_str() == kind)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Copy of this node without its properties.
    pub fn shallow(&self) -> Node {
        Node {
            id: self.id,
            kinds: self.kinds.clone(),
            properties: PropertyMap::new(),
        }
    }
}

impl SizeOf for Node {
    fn size_of(&self) -> Size {
        let spilled = if self.kinds.spilled() {
            Size::of_slots::<Kind>(self.kinds.capacity())
        } else {
            Size::default()
        };

        Size::of::<Node>() + spilled + self.properties.size_of()
    }
}

impl SizeOf for NodeId {
    fn size_of(&self) -> Size {
        Size::of::<NodeId>()
    }
}
