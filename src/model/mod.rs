//! # Property Graph Model
//!
//! Plain data carried through traversals: nodes, relationships, kinds,
//! directions and the rendered paths and sets handed back to callers.
//!
//! Design rule: no I/O, no locks, no async in this module.

pub mod node;
pub mod relationship;
pub mod path;
pub mod value;
pub mod property_map;
pub mod kind;
pub mod set;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use path::{Path, IdPath};
pub use value::Value;
pub use property_map::PropertyMap;
pub use kind::{contains_any, Kind, Kinds};
pub use set::{NodeSet, PathSet};
