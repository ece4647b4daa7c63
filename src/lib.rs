//! # dawgs — Concurrent Graph Traversal and Bulk I/O
//!
//! The execution engine underneath attack-path analysis: explores a graph
//! that lives behind a transactional store, collects paths and nodes under
//! caller-defined acceptance rules, and moves bulk read/write workloads
//! through the same store with bounded concurrency and bounded memory.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the engine and the store
//! 2. **Opaque criteria**: relationship filters are passed through, never introspected
//! 3. **Shared cactus tree**: in-flight path space is one tree of `Arc` segments
//! 4. **Cancellation everywhere**: every blocking queue operation races a `CancellationToken`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dawgs::{Direction, MemoryBackend, Node, NodeId};
//! use dawgs::graphcache::Cache;
//! use dawgs::traversal::{self, LightweightDriver, Plan, Traversal};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> dawgs::Result<()> {
//! let db = Arc::new(MemoryBackend::new());
//! let driver = LightweightDriver::new(
//!     Direction::Outgoing,
//!     Cache::new(),
//!     None,
//!     traversal::acyclic_node_filter(|_| true),
//! );
//!
//! Traversal::new(db, 4)
//!     .breadth_first(&CancellationToken::new(), Plan::from_root(Node::new(NodeId(1)), driver))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `cardinality` | Exact bitmaps and approximate sketches over integer id spaces |
//! | `segment` | The path segment ("cactus") tree |
//! | `ops` | Parallel reader/writer operations and the stack traversal |
//! | `traversal` | Drivers, filters and the concurrent breadth-first sweep |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod size;
pub mod cardinality;
pub mod segment;
pub mod storage;
pub mod tx;
pub mod query;
pub mod graphcache;
pub mod ops;
pub mod traversal;
pub mod util;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    Node, NodeId, Relationship, RelId, Direction, Kind, Kinds,
    Value, PropertyMap, Path, IdPath, NodeSet, PathSet,
};
pub use size::{Size, SizeOf};
pub use segment::{Segment, PathSegment, IdSegment, Tree};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{StorageBackend, StorageConfig, MemoryBackend};
pub use tx::{Transaction, TxMode, TxId};
pub use query::{Criteria, RelationshipQuery};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("operation cancelled")]
    Cancelled,

    #[error("transaction timed out")]
    TimedOut,

    #[error(
        "traversal required more memory than allowed - Limit: {:.2} MB - Memory In-Use: {:.2} MB",
        .limit.mebibytes(),
        .in_use.mebibytes()
    )]
    TraversalMemoryLimit { limit: Size, in_use: Size },

    #[error("parallel operation context has expired")]
    OperationDone,

    #[error("halt traversal")]
    HaltTraversal,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("must be called with either an inbound or outbound direction")]
    InvalidDirection,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{role} {worker_id} failed: {source}")]
    Worker {
        role: &'static str,
        worker_id: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("worker task aborted: {0}")]
    Aborted(String),

    #[error("{}", join_messages(.0))]
    Joined(Vec<Error>),
}

fn join_messages(errors: &[Error]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

impl Error {
    /// True when this error, or any error it wraps, is a cancellation or an
    /// expired transaction rather than an application failure.
    pub fn is_cancellation(&self) -> bool {
        self.any(&|err| matches!(err, Error::Cancelled | Error::TimedOut))
    }

    /// True when some unit of work aborted on the traversal memory ceiling.
    pub fn is_memory_limit(&self) -> bool {
        self.any(&|err| matches!(err, Error::TraversalMemoryLimit { .. }))
    }

    /// True when some unit of work asked the traversal to stop early.
    pub fn is_halt(&self) -> bool {
        self.any(&|err| matches!(err, Error::HaltTraversal))
    }

    fn any(&self, predicate: &dyn Fn(&Error) -> bool) -> bool {
        match self {
            Error::Worker { source, .. } => predicate(self) || source.any(predicate),
            Error::Joined(errors) => errors.iter().any(|err| err.any(predicate)),
            _ => predicate(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
