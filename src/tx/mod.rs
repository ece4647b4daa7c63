//! Transaction handles.
//!
//! Every worker in a parallel operation or traversal holds one transaction
//! for its whole lifetime. Readers open [`TxMode::ReadOnly`], writers open
//! [`TxMode::Batch`].

use serde::{Deserialize, Serialize};

use crate::size::Size;

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    /// Write transaction that buffers its mutations until commit.
    Batch,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Transaction trait that all backends must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;

    /// Ceiling on the in-flight path tree a traversal may hold while bound
    /// to this transaction.
    fn traversal_memory_limit(&self) -> Size;
}
