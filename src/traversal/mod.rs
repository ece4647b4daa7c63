//! # Concurrent Breadth-First Traversal
//!
//! A [`Driver`] turns one frontier segment into the child segments reachable
//! by one more hop. [`Traversal::breadth_first`] runs a driver over a shared
//! cactus tree with a fixed pool of workers, each bound to one read
//! transaction.
//!
//! ```text
//!              ┌──────────── children (in_flight += n) ◄───────────┐
//!              ▼                                                    │
//!   root ──► [segments] ──► worker 0..N ──► size check ──► driver ──┘
//!                                │
//!                                └──► in_flight -= 1 ──► [completions] ──► controller
//! ```
//!
//! The controller stops once a completion signal arrives with the in-flight
//! count at zero. An empty segment queue alone says nothing: every worker is
//! also a producer.
//!
//! Exceeding the transaction's memory ceiling records
//! [`Error::TraversalMemoryLimit`] and skips that one segment; the rest of the
//! sweep continues.

mod driver;
mod filter;
mod pattern;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{Node, Relationship};
use crate::segment::{Segment, SegmentPayload, Tree};
use crate::storage::StorageBackend;
use crate::tx::{Transaction, TxMode};
use crate::util::channels::{self, SharedReceiver};
use crate::util::ErrorCollector;
use crate::{Error, Result};

pub use driver::{LightweightDriver, LightweightIdDriver};
pub use filter::{acyclic_node_filter, filtered_skip_limit, unique_path_filter, SegmentFilter, SegmentVisitor};
pub use pattern::{Pattern, PatternDriver, PatternMatchDelegate};

/// Produces the next hop of path space below a frontier segment.
///
/// Returned segments are treated as needing further expansion. Returning no
/// segments marks `segment` as terminal. Returning
/// [`Error::HaltTraversal`] ends the whole sweep without an error.
#[async_trait]
pub trait Driver<B, N = Node, E = Relationship>: Send + Sync
where
    B: StorageBackend,
    N: SegmentPayload,
    E: SegmentPayload,
{
    async fn expand(
        &self,
        cancel: &CancellationToken,
        backend: &B,
        tx: &B::Tx,
        segment: &Arc<Segment<N, E>>,
    ) -> Result<Vec<Arc<Segment<N, E>>>>;

    /// Reject a misconfigured driver before any worker starts.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Where a sweep starts and how it expands.
pub struct Plan<D, N = Node, E = Relationship> {
    pub root: Arc<Segment<N, E>>,
    pub driver: D,
}

impl<D, N: SegmentPayload, E: SegmentPayload> Plan<D, N, E> {
    pub fn from_root(root: N, driver: D) -> Self {
        Self {
            root: Segment::new_root(root),
            driver,
        }
    }

    /// Resume from an existing segment, typically one kept from an earlier
    /// sweep.
    pub fn from_segment(root: Arc<Segment<N, E>>, driver: D) -> Self {
        Self { root, driver }
    }
}

/// Concurrent sweep configuration.
pub struct Traversal<B> {
    backend: Arc<B>,
    num_workers: usize,
}

impl<B> Clone for Traversal<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            num_workers: self.num_workers,
        }
    }
}

impl<B: StorageBackend> Traversal<B> {
    pub fn new(backend: Arc<B>, num_workers: usize) -> Self {
        Self { backend, num_workers }
    }

    /// Expand `plan.root` until no segment is left in flight.
    ///
    /// Returns every recorded worker error joined together. Memory limit
    /// breaches are among them but do not stop other branches. A store
    /// timeout drops that worker's current segment silently. If `cancel`
    /// fired and nothing else failed, returns [`Error::Cancelled`].
    pub async fn breadth_first<D, N, E>(&self, cancel: &CancellationToken, plan: Plan<D, N, E>) -> Result<()>
    where
        D: Driver<B, N, E> + 'static,
        N: SegmentPayload,
        E: SegmentPayload,
    {
        if self.num_workers == 0 {
            return Err(Error::Config("traversal requires at least one worker".into()));
        }
        plan.driver.validate()?;

        let started = Instant::now();
        let scope = cancel.child_token();
        let errors = Arc::new(ErrorCollector::new());
        let tree = Tree::from_segment(plan.root);
        let driver = Arc::new(plan.driver);
        let in_flight = Arc::new(AtomicI64::new(0));

        let (segments, segment_rx) = mpsc::unbounded_channel::<Arc<Segment<N, E>>>();
        let segment_inbox = SharedReceiver::new(segment_rx);
        let (completions, mut completion_rx) = mpsc::channel::<()>(self.num_workers * 2);

        let workers: Vec<JoinHandle<()>> = (0..self.num_workers)
            .map(|worker_id| {
                let sweep = Sweep {
                    backend: self.backend.clone(),
                    driver: driver.clone(),
                    tree: tree.clone(),
                    inbox: segment_inbox.clone(),
                    segments: segments.clone(),
                    completions: completions.clone(),
                    in_flight: in_flight.clone(),
                    scope: scope.clone(),
                    errors: errors.clone(),
                };

                tokio::spawn(sweep.run(worker_id))
            })
            .collect();

        // Workers hold their own senders; the controller keeps none so that a
        // pool that exits early closes the completion queue.
        drop(completions);

        in_flight.fetch_add(1, Ordering::SeqCst);
        channels::submit_unbounded(&scope, &segments, tree.root.clone());
        drop(segments);

        loop {
            match channels::receive(&scope, &mut completion_rx).await {
                None => break,
                Some(()) if in_flight.load(Ordering::SeqCst) == 0 => break,
                Some(()) => {}
            }
        }

        scope.cancel();

        for (worker_id, handle) in workers.into_iter().enumerate() {
            if let Err(err) = handle.await {
                errors.add(Error::Worker {
                    role: "reader",
                    worker_id,
                    source: Box::new(Error::Aborted(err.to_string())),
                });
            }
        }

        debug!(
            workers = self.num_workers,
            failures = errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "breadth first traversal done"
        );

        let outcome = errors.combined();
        if outcome.is_ok() && cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        outcome
    }
}

/// One worker's share of a breadth-first sweep.
struct Sweep<B: StorageBackend, D, N, E> {
    backend: Arc<B>,
    driver: Arc<D>,
    tree: Tree<N, E>,
    inbox: SharedReceiver<mpsc::UnboundedReceiver<Arc<Segment<N, E>>>>,
    segments: mpsc::UnboundedSender<Arc<Segment<N, E>>>,
    completions: mpsc::Sender<()>,
    in_flight: Arc<AtomicI64>,
    scope: CancellationToken,
    errors: Arc<ErrorCollector>,
}

impl<B, D, N, E> Sweep<B, D, N, E>
where
    B: StorageBackend,
    D: Driver<B, N, E>,
    N: SegmentPayload,
    E: SegmentPayload,
{
    async fn run(self, worker_id: usize) {
        let outcome = match self.backend.begin_tx(TxMode::ReadOnly).await {
            Ok(tx) => {
                let outcome = self.drain(&tx).await;
                if let Err(err) = self.backend.rollback_tx(tx).await {
                    warn!(worker_id, error = %err, "failed to release reader transaction");
                }
                outcome
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {}
            Err(err) if err.is_halt() => {
                debug!(worker_id, "driver halted the traversal");
                self.scope.cancel();
            }
            Err(err) if err.is_cancellation() => {
                debug!(worker_id, error = %err, "reader left on cancellation");
            }
            Err(err) => {
                warn!(worker_id, error = %err, "reader failed, cancelling traversal");
                self.scope.cancel();
                self.errors.add(Error::Worker {
                    role: "reader",
                    worker_id,
                    source: Box::new(err),
                });
            }
        }
    }

    async fn drain(&self, tx: &B::Tx) -> Result<()> {
        while let Some(segment) = self.inbox.recv(&self.scope).await {
            let outcome = self.step(tx, &segment).await;

            // Account for this segment before reporting, so the controller
            // never sees zero while its children are still unqueued.
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let signalled = channels::submit(&self.scope, &self.completions, ()).await;

            outcome?;
            if !signalled {
                break;
            }
        }

        Ok(())
    }

    async fn step(&self, tx: &B::Tx, segment: &Arc<Segment<N, E>>) -> Result<()> {
        let limit = tx.traversal_memory_limit();
        let in_use = self.tree.size_of();

        if in_use >= limit {
            self.errors.add(Error::TraversalMemoryLimit { limit, in_use });
            return Ok(());
        }

        for child in self.driver.expand(&self.scope, &self.backend, tx, segment).await? {
            self.in_flight.fetch_add(1, Ordering::SeqCst);

            if !channels::submit_unbounded(&self.scope, &self.segments, child) {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphcache::Cache;
    use crate::model::{Direction, NodeId, RelId};
    use crate::segment::PathSegment;
    use crate::storage::MemoryBackend;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn chain(db: &MemoryBackend, len: u64) {
        for id in 1..=len {
            db.seed_node(Node::new(NodeId(id)));
        }
        for id in 1..len {
            db.seed_relationship(Relationship::new(RelId(100 + id), NodeId(id), NodeId(id + 1), "MemberOf"));
        }
    }

    #[tokio::test]
    async fn test_zero_workers_is_rejected() {
        let db = Arc::new(MemoryBackend::new());
        let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, acyclic_node_filter(|_| true));

        let err = Traversal::new(db, 0)
            .breadth_first(&CancellationToken::new(), Plan::from_root(Node::new(NodeId(1)), driver))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_chain_reaches_the_end() {
        let db = Arc::new(MemoryBackend::new());
        chain(&db, 20);

        let terminals = Arc::new(Mutex::new(Vec::new()));
        let sink = terminals.clone();
        let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, acyclic_node_filter(|_| true))
            .with_terminal_visitor(move |segment: &Arc<PathSegment>| sink.lock().push((segment.node_id(), segment.depth())));

        Traversal::new(db, 3)
            .breadth_first(&CancellationToken::new(), Plan::from_root(Node::new(NodeId(1)), driver))
            .await
            .unwrap();

        assert_eq!(*terminals.lock(), vec![(NodeId(20), 19)]);
    }

    #[tokio::test]
    async fn test_halt_is_not_an_error() {
        struct Halting;

        #[async_trait]
        impl Driver<MemoryBackend> for Halting {
            async fn expand(
                &self,
                _cancel: &CancellationToken,
                _backend: &MemoryBackend,
                _tx: &<MemoryBackend as StorageBackend>::Tx,
                _segment: &Arc<PathSegment>,
            ) -> Result<Vec<Arc<PathSegment>>> {
                Err(Error::HaltTraversal)
            }
        }

        let db = Arc::new(MemoryBackend::new());
        Traversal::new(db, 2)
            .breadth_first(&CancellationToken::new(), Plan::from_root(Node::new(NodeId(1)), Halting))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_parent_reports_cancellation() {
        let db = Arc::new(MemoryBackend::new());
        chain(&db, 5);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, acyclic_node_filter(|_| true));
        let err = Traversal::new(db, 2)
            .breadth_first(&cancel, Plan::from_root(Node::new(NodeId(1)), driver))
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert!(!err.is_memory_limit());
    }
}
