//! Relationship and node queries handed to a [`StorageBackend`](crate::StorageBackend).
//!
//! [`Criteria`] is built by the caller and passed through traversal code
//! untouched; only a backend evaluates it.

use std::fmt;
use std::sync::Arc;

use crate::model::{Direction, Kind, Node, NodeId, Relationship};

/// Caller-supplied filter evaluated by the store.
#[derive(Clone)]
pub enum Criteria {
    /// Relationship kind (or, on node queries, any node kind) is one of these.
    Kinds(Vec<Kind>),
    /// Arbitrary relationship predicate.
    Relationship(Arc<dyn Fn(&Relationship) -> bool + Send + Sync>),
    /// Arbitrary node predicate.
    Node(Arc<dyn Fn(&Node) -> bool + Send + Sync>),
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    Not(Box<Criteria>),
}

impl Criteria {
    pub fn kinds(kinds: impl IntoIterator<Item = impl Into<Kind>>) -> Self {
        Criteria::Kinds(kinds.into_iter().map(Into::into).collect())
    }

    pub fn relationship(predicate: impl Fn(&Relationship) -> bool + Send + Sync + 'static) -> Self {
        Criteria::Relationship(Arc::new(predicate))
    }

    pub fn node(predicate: impl Fn(&Node) -> bool + Send + Sync + 'static) -> Self {
        Criteria::Node(Arc::new(predicate))
    }

    /// Conjunction of every criteria given. A single element is returned as-is.
    pub fn and(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        let mut all: Vec<Criteria> = criteria.into_iter().collect();

        if all.len() == 1 {
            all.remove(0)
        } else {
            Criteria::And(all)
        }
    }

    pub fn or(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Criteria::Or(criteria.into_iter().collect())
    }

    pub fn negate(self) -> Self {
        Criteria::Not(Box::new(self))
    }
}

impl fmt::Debug for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criteria::Kinds(kinds) => f.debug_tuple("Kinds").field(kinds).finish(),
            Criteria::Relationship(_) => f.write_str("Relationship(<predicate>)"),
            Criteria::Node(_) => f.write_str("Node(<predicate>)"),
            Criteria::And(all) => f.debug_tuple("And").field(all).finish(),
            Criteria::Or(any) => f.debug_tuple("Or").field(any).finish(),
            Criteria::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
        }
    }
}

// ============================================================================
// Relationship query
// ============================================================================

/// One hop of relationships touching `node` in `direction`.
///
/// `Outgoing` selects relationships whose start is `node`, `Incoming` those
/// whose end is `node`.
#[derive(Debug, Clone)]
pub struct RelationshipQuery {
    pub node: NodeId,
    pub direction: Direction,
    pub criteria: Option<Criteria>,
    /// Return results in ascending relationship id order.
    pub order_by_id: bool,
}

impl RelationshipQuery {
    pub fn new(node: NodeId, direction: Direction) -> Self {
        Self {
            node,
            direction,
            criteria: None,
            order_by_id: false,
        }
    }

    pub fn outbound(node: NodeId) -> Self {
        Self::new(node, Direction::Outgoing)
    }

    pub fn inbound(node: NodeId) -> Self {
        Self::new(node, Direction::Incoming)
    }

    pub fn filter(mut self, criteria: Option<Criteria>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn ordered(mut self, order_by_id: bool) -> Self {
        self.order_by_id = order_by_id;
        self
    }
}

// ============================================================================
// Node query
// ============================================================================

/// Nodes with ids in `[floor, ceiling)` that match the optional criteria.
#[derive(Debug, Clone)]
pub struct NodeQuery {
    pub floor: NodeId,
    pub ceiling: NodeId,
    pub criteria: Option<Criteria>,
}

impl NodeQuery {
    pub fn id_range(floor: NodeId, ceiling: NodeId) -> Self {
        Self {
            floor,
            ceiling,
            criteria: None,
        }
    }

    pub fn filter(mut self, criteria: Option<Criteria>) -> Self {
        self.criteria = criteria;
        self
    }
}
