//! # Operations
//!
//! | Submodule | Description |
//! |-----------|-------------|
//! | `parallel` | N-reader / M-writer pipelines and the striped node query |
//! | `traversal` | Single-task stack traversal with skip/limit windows |

pub mod parallel;
pub mod traversal;

pub use parallel::{
    parallel_node_query, JobFuture, Operation, OperationConfig, ReaderScope, WriterScope, NODE_QUERY_STRIDE,
};
pub use traversal::{
    acyclic_traverse_nodes, acyclic_traverse_terminals, traverse, traverse_intermediary_paths, traverse_paths,
    DescentFilter, LimitSkipTracker, PathFilter, PathVisitor, TraversalContext, TraversalPlan,
};
