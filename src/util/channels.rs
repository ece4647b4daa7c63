//! Cancellation-aware queue operations.
//!
//! Every blocking send or receive races the governing `CancellationToken`,
//! so firing the token releases every task parked on a queue.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// A receiver shared by a pool of consumers. Each value goes to exactly one.
pub struct SharedReceiver<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> Clone for SharedReceiver<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> SharedReceiver<R> {
    pub fn new(receiver: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(receiver)),
        }
    }
}

impl<T> SharedReceiver<mpsc::Receiver<T>> {
    /// The next value, or `None` once the queue is closed and drained or
    /// `cancel` fires.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            value = async { self.inner.lock().await.recv().await } => value,
        }
    }
}

impl<T> SharedReceiver<mpsc::UnboundedReceiver<T>> {
    /// Unbounded counterpart of the bounded `recv`.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            value = async { self.inner.lock().await.recv().await } => value,
        }
    }
}

/// Send on a bounded queue, waiting for capacity. Returns false if `cancel`
/// fired first or every receiver is gone.
pub async fn submit<T>(cancel: &CancellationToken, sender: &mpsc::Sender<T>, value: T) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = sender.send(value) => sent.is_ok(),
    }
}

/// Send on an unbounded queue. Returns false if `cancel` has fired or every
/// receiver is gone.
pub fn submit_unbounded<T>(cancel: &CancellationToken, sender: &mpsc::UnboundedSender<T>, value: T) -> bool {
    !cancel.is_cancelled() && sender.send(value).is_ok()
}

/// Receive from a single-consumer queue.
pub async fn receive<T>(cancel: &CancellationToken, receiver: &mut mpsc::Receiver<T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        value = receiver.recv() => value,
    }
}
