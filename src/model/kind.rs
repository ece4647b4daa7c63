//! Kind tags for nodes and relationships.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::size::{Size, SizeOf};

/// A node label or relationship type, e.g. `User` or `MemberOf`.
///
/// Kinds are interned behind an `Arc<str>` so the millions of shallow nodes a
/// sweep can hold share one allocation per distinct kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Kind(Arc<str>);

impl Kind {
    pub fn new(name: impl AsRef<str>) -> Self {
        Kind(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Kind {
    fn from(name: &str) -> Self {
        Kind::new(name)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kinds attached to a node. Most nodes carry one or two.
pub type Kinds = SmallVec<[Kind; 2]>;

impl SizeOf for Kind {
    fn size_of(&self) -> Size {
        Size::of::<Kind>()
    }
}

/// Returns true if any kind in `kinds` is one of `wanted`.
pub fn contains_any(kinds: &[Kind], wanted: &[Kind]) -> bool {
    kinds.iter().any(|kind| wanted.contains(kind))
}
