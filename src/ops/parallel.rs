//! N-reader / M-writer pipeline over long-lived store transactions.
//!
//! ```text
//!   submit_reader ──► [reader jobs] ──► reader 0..N ──┐
//!                                                     ├─► handoff (unbounded) ──► writer 0..M
//!   submit_writer ──► [writer jobs] ─────────────────────────────────────────────► (job per writer)
//! ```
//!
//! Each reader holds one `ReadOnly` transaction and each writer one `Batch`
//! transaction for its whole life. A job that fails cancels the shared scope
//! so no worker of the other role waits forever on a conduit that will never
//! move again. An operation is not restartable; start a new one instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::NodeId;
use crate::query::{Criteria, NodeQuery};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::util::channels::{self, SharedReceiver};
use crate::util::ErrorCollector;
use crate::{Error, Result};

/// Boxed future returned by operation jobs.
pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

type ReaderJob<B, T> = Box<dyn for<'a> FnOnce(&'a ReaderScope<B, T>) -> JobFuture<'a> + Send>;
type WriterJob<B, T> = Box<dyn for<'a> FnOnce(&'a mut WriterScope<B, T>) -> JobFuture<'a> + Send>;

// ============================================================================
// Configuration
// ============================================================================

/// Worker counts and job queue capacities for an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    pub num_readers: usize,
    pub num_writers: usize,
    /// Defaults to twice the reader count.
    pub reader_job_capacity: Option<usize>,
    /// Defaults to twice the writer count.
    pub writer_job_capacity: Option<usize>,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            num_readers: 1,
            num_writers: 1,
            reader_job_capacity: None,
            writer_job_capacity: None,
        }
    }
}

impl OperationConfig {
    pub fn new(num_readers: usize, num_writers: usize) -> Self {
        Self {
            num_readers,
            num_writers,
            ..Self::default()
        }
    }

    pub fn reader_job_capacity(&self) -> usize {
        self.reader_job_capacity.unwrap_or(self.num_readers * 2).max(1)
    }

    pub fn writer_job_capacity(&self) -> usize {
        self.writer_job_capacity.unwrap_or(self.num_writers * 2).max(1)
    }

    fn validate(&self) -> Result<()> {
        if self.num_readers == 0 && self.num_writers == 0 {
            return Err(Error::Config("operation requires at least one reader or writer".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Worker scopes
// ============================================================================

/// What a reader job sees: its worker's read transaction and the sending
/// end of the handoff conduit.
pub struct ReaderScope<B: StorageBackend, T> {
    backend: Arc<B>,
    tx: B::Tx,
    out: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
}

impl<B: StorageBackend, T> ReaderScope<B, T> {
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn tx(&self) -> &B::Tx {
        &self.tx
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Hand a value to the writers. Fails with [`Error::OperationDone`] once
    /// the operation scope has been cancelled.
    pub fn send(&self, value: T) -> Result<()> {
        if channels::submit_unbounded(&self.cancel, &self.out, value) {
            Ok(())
        } else {
            Err(Error::OperationDone)
        }
    }
}

/// What a writer job sees: its worker's batch transaction and the receiving
/// end of the handoff conduit.
pub struct WriterScope<B: StorageBackend, T> {
    backend: Arc<B>,
    tx: B::Tx,
    inbox: SharedReceiver<mpsc::UnboundedReceiver<T>>,
    cancel: CancellationToken,
}

impl<B: StorageBackend, T: Send + 'static> WriterScope<B, T> {
    /// The next value from any reader. `None` once the conduit is closed and
    /// drained, or the scope is cancelled.
    pub async fn recv(&self) -> Option<T> {
        self.inbox.recv(&self.cancel).await
    }

    /// Borrow the store and this writer's batch transaction together.
    pub fn batch(&mut self) -> (&B, &mut B::Tx) {
        (&self.backend, &mut self.tx)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

// ============================================================================
// Operation
// ============================================================================

/// A parallel reader/writer operation. See the module docs.
pub struct Operation<B: StorageBackend, T> {
    config: OperationConfig,
    backend: Arc<B>,
    scope: CancellationToken,
    errors: Arc<ErrorCollector>,
    handoff: mpsc::UnboundedSender<T>,
    handoff_inbox: SharedReceiver<mpsc::UnboundedReceiver<T>>,
    reader_jobs: mpsc::Sender<ReaderJob<B, T>>,
    writer_jobs: mpsc::Sender<WriterJob<B, T>>,
    pending_inboxes: Option<(
        SharedReceiver<mpsc::Receiver<ReaderJob<B, T>>>,
        SharedReceiver<mpsc::Receiver<WriterJob<B, T>>>,
    )>,
    readers: Vec<JoinHandle<()>>,
    writers: Vec<JoinHandle<()>>,
    started: Instant,
}

impl<B: StorageBackend, T: Send + 'static> Operation<B, T> {
    /// Build an operation bound to a child of `parent`. No workers run until
    /// [`start`](Self::start).
    pub fn new(config: OperationConfig, parent: &CancellationToken, backend: Arc<B>) -> Result<Self> {
        config.validate()?;

        let (handoff, handoff_rx) = mpsc::unbounded_channel();
        let (reader_jobs, reader_rx) = mpsc::channel(config.reader_job_capacity());
        let (writer_jobs, writer_rx) = mpsc::channel(config.writer_job_capacity());

        Ok(Self {
            config,
            backend,
            scope: parent.child_token(),
            errors: Arc::new(ErrorCollector::new()),
            handoff,
            handoff_inbox: SharedReceiver::new(handoff_rx),
            reader_jobs,
            writer_jobs,
            pending_inboxes: Some((SharedReceiver::new(reader_rx), SharedReceiver::new(writer_rx))),
            readers: Vec::new(),
            writers: Vec::new(),
            started: Instant::now(),
        })
    }

    /// Build and start in one step.
    pub fn start_new(config: OperationConfig, parent: &CancellationToken, backend: Arc<B>) -> Result<Self> {
        let mut operation = Self::new(config, parent, backend)?;
        operation.start()?;
        Ok(operation)
    }

    /// Launch every reader and writer against its own transaction.
    pub fn start(&mut self) -> Result<()> {
        let Some((reader_inbox, writer_inbox)) = self.pending_inboxes.take() else {
            return Err(Error::Config("operation already started".into()));
        };

        info!(
            readers = self.config.num_readers,
            writers = self.config.num_writers,
            "starting parallel operation"
        );
        self.started = Instant::now();

        for worker_id in 0..self.config.num_readers {
            self.readers.push(tokio::spawn(run_reader(
                worker_id,
                self.backend.clone(),
                reader_inbox.clone(),
                self.handoff.clone(),
                self.scope.clone(),
                self.errors.clone(),
            )));
        }

        for worker_id in 0..self.config.num_writers {
            self.writers.push(tokio::spawn(run_writer(
                worker_id,
                self.backend.clone(),
                writer_inbox.clone(),
                self.handoff_inbox.clone(),
                self.scope.clone(),
                self.errors.clone(),
            )));
        }

        Ok(())
    }

    /// Queue a reader job, waiting for queue capacity. Fails fast with
    /// [`Error::OperationDone`] once the operation scope has been cancelled.
    pub async fn submit_reader<F>(&self, job: F) -> Result<()>
    where
        F: for<'a> FnOnce(&'a ReaderScope<B, T>) -> JobFuture<'a> + Send + 'static,
    {
        let job: ReaderJob<B, T> = Box::new(job);

        if channels::submit(&self.scope, &self.reader_jobs, job).await {
            Ok(())
        } else {
            Err(Error::OperationDone)
        }
    }

    /// Queue a writer job. Same failure behavior as
    /// [`submit_reader`](Self::submit_reader).
    pub async fn submit_writer<F>(&self, job: F) -> Result<()>
    where
        F: for<'a> FnOnce(&'a mut WriterScope<B, T>) -> JobFuture<'a> + Send + 'static,
    {
        let job: WriterJob<B, T> = Box::new(job);

        if channels::submit(&self.scope, &self.writer_jobs, job).await {
            Ok(())
        } else {
            Err(Error::OperationDone)
        }
    }

    /// True once any worker failed or the parent scope was cancelled.
    pub fn is_done(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Drain and shut down: close the reader queue, wait for readers, close
    /// the writer queue and the handoff conduit, wait for writers, then
    /// return every worker's terminal error joined together.
    pub async fn done(self) -> Result<()> {
        let Operation {
            backend: _,
            config,
            scope,
            errors,
            handoff,
            handoff_inbox,
            reader_jobs,
            writer_jobs,
            pending_inboxes,
            readers,
            writers,
            started,
        } = self;

        drop(pending_inboxes);
        drop(reader_jobs);
        join_workers("reader", readers, &errors).await;

        drop(writer_jobs);
        drop(handoff);
        drop(handoff_inbox);
        join_workers("writer", writers, &errors).await;

        scope.cancel();

        debug!(
            readers = config.num_readers,
            writers = config.num_writers,
            failures = errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "parallel operation done"
        );

        errors.combined()
    }
}

async fn join_workers(role: &'static str, handles: Vec<JoinHandle<()>>, errors: &ErrorCollector) {
    for (worker_id, handle) in handles.into_iter().enumerate() {
        if let Err(err) = handle.await {
            errors.add(Error::Worker {
                role,
                worker_id,
                source: Box::new(Error::Aborted(err.to_string())),
            });
        }
    }
}

async fn run_reader<B: StorageBackend, T: Send + 'static>(
    worker_id: usize,
    backend: Arc<B>,
    jobs: SharedReceiver<mpsc::Receiver<ReaderJob<B, T>>>,
    out: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
    errors: Arc<ErrorCollector>,
) {
    let tx = match backend.begin_tx(TxMode::ReadOnly).await {
        Ok(tx) => tx,
        Err(err) => return fail("reader", worker_id, err, &cancel, &errors),
    };

    let scope = ReaderScope {
        backend: backend.clone(),
        tx,
        out,
        cancel: cancel.clone(),
    };

    let mut outcome = Ok(());
    while let Some(job) = jobs.recv(&cancel).await {
        if let Err(err) = job(&scope).await {
            outcome = Err(err);
            break;
        }
    }

    let ReaderScope { tx, .. } = scope;
    if let Err(err) = backend.rollback_tx(tx).await {
        warn!(worker_id, error = %err, "failed to release reader transaction");
    }

    settle("reader", worker_id, outcome, &cancel, &errors);
}

async fn run_writer<B: StorageBackend, T: Send + 'static>(
    worker_id: usize,
    backend: Arc<B>,
    jobs: SharedReceiver<mpsc::Receiver<WriterJob<B, T>>>,
    inbox: SharedReceiver<mpsc::UnboundedReceiver<T>>,
    cancel: CancellationToken,
    errors: Arc<ErrorCollector>,
) {
    let tx = match backend.begin_tx(TxMode::Batch).await {
        Ok(tx) => tx,
        Err(err) => return fail("writer", worker_id, err, &cancel, &errors),
    };

    let mut scope = WriterScope {
        backend: backend.clone(),
        tx,
        inbox,
        cancel: cancel.clone(),
    };

    let mut outcome = Ok(());
    while let Some(job) = jobs.recv(&cancel).await {
        if let Err(err) = job(&mut scope).await {
            outcome = Err(err);
            break;
        }
    }

    let WriterScope { tx, .. } = scope;

    // Only a writer that drained its queue without the scope being torn
    // down commits; everything else is discarded.
    if outcome.is_ok() && !cancel.is_cancelled() {
        if let Err(err) = backend.commit_tx(tx).await {
            outcome = Err(err);
        }
    } else if let Err(err) = backend.rollback_tx(tx).await {
        warn!(worker_id, error = %err, "failed to roll back writer transaction");
    }

    settle("writer", worker_id, outcome, &cancel, &errors);
}

fn settle(
    role: &'static str,
    worker_id: usize,
    outcome: Result<()>,
    cancel: &CancellationToken,
    errors: &ErrorCollector,
) {
    match outcome {
        Ok(()) => {}
        Err(err) if err.is_cancellation() => {
            debug!(role, worker_id, error = %err, "worker left on cancellation");
        }
        Err(Error::OperationDone) if cancel.is_cancelled() => {
            debug!(role, worker_id, "worker left after the operation scope closed");
        }
        Err(err) => fail(role, worker_id, err, cancel, errors),
    }
}

fn fail(role: &'static str, worker_id: usize, err: Error, cancel: &CancellationToken, errors: &ErrorCollector) {
    warn!(role, worker_id, error = %err, "worker failed, cancelling operation");

    cancel.cancel();
    errors.add(Error::Worker {
        role,
        worker_id,
        source: Box::new(err),
    });
}

// ============================================================================
// Parallel node query
// ============================================================================

/// Width of the node id range each query covers.
pub const NODE_QUERY_STRIDE: u64 = 20_000;

/// Run `delegate` over every node id range `[floor, floor + 20 000)` up to the
/// largest node id, spread over `num_workers` read transactions. Each range
/// query carries `criteria`. Worker errors are joined; a cancelled parent
/// with no other failure yields [`Error::Cancelled`].
pub async fn parallel_node_query<B, F>(
    cancel: &CancellationToken,
    backend: Arc<B>,
    criteria: Option<Criteria>,
    num_workers: usize,
    delegate: F,
) -> Result<()>
where
    B: StorageBackend,
    F: for<'a> Fn(&'a B, &'a B::Tx, NodeQuery) -> JobFuture<'a> + Send + Sync + 'static,
{
    if num_workers == 0 {
        return Err(Error::Config("parallel node query requires at least one worker".into()));
    }

    let largest = {
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let largest = backend.largest_node_id(&tx).await;
        backend.rollback_tx(tx).await?;
        largest?
    };

    let Some(largest) = largest else {
        return Ok(());
    };

    let started = Instant::now();
    let scope = cancel.child_token();
    let errors = Arc::new(ErrorCollector::new());
    let delegate = Arc::new(delegate);
    let (floors, floor_rx) = mpsc::channel::<NodeId>(num_workers);
    let floor_inbox = SharedReceiver::new(floor_rx);

    let workers: Vec<JoinHandle<()>> = (0..num_workers)
        .map(|worker_id| {
            let backend = backend.clone();
            let delegate = delegate.clone();
            let criteria = criteria.clone();
            let floor_inbox = floor_inbox.clone();
            let scope = scope.clone();
            let errors = errors.clone();

            tokio::spawn(async move {
                let tx = match backend.begin_tx(TxMode::ReadOnly).await {
                    Ok(tx) => tx,
                    Err(err) => return fail("reader", worker_id, err, &scope, &errors),
                };

                let mut outcome = Ok(());
                while let Some(floor) = floor_inbox.recv(&scope).await {
                    let ceiling = NodeId(floor.0.saturating_add(NODE_QUERY_STRIDE));
                    let query = NodeQuery::id_range(floor, ceiling).filter(criteria.clone());

                    if let Err(err) = delegate(&backend, &tx, query).await {
                        outcome = Err(err);
                        break;
                    }
                }

                if let Err(err) = backend.rollback_tx(tx).await {
                    warn!(worker_id, error = %err, "failed to release reader transaction");
                }

                settle("reader", worker_id, outcome, &scope, &errors);
            })
        })
        .collect();

    let mut floor = 0u64;
    while floor <= largest.0 {
        if !channels::submit(&scope, &floors, NodeId(floor)).await {
            break;
        }
        floor = floor.saturating_add(NODE_QUERY_STRIDE);
        if floor == u64::MAX {
            break;
        }
    }

    drop(floors);
    join_workers("reader", workers, &errors).await;
    scope.cancel();

    debug!(
        workers = num_workers,
        largest_node_id = largest.0,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "parallel node query done"
    );

    match errors.combined() {
        Ok(()) if cancel.is_cancelled() => Err(Error::Cancelled),
        result => result,
    }
}
