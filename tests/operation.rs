//! Integration tests for parallel reader/writer operations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dawgs::ops::{parallel_node_query, Operation, OperationConfig};
use dawgs::storage::memory::Fault;
use dawgs::{Error, MemoryBackend, Node, NodeId, PropertyMap, StorageBackend};
use tokio_util::sync::CancellationToken;

const BOUND: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writer_failure_does_not_deadlock() {
    let db = Arc::new(MemoryBackend::new());
    let op = Operation::<MemoryBackend, u64>::start_new(OperationConfig::new(2, 1), &CancellationToken::new(), db.clone())
        .unwrap();

    op.submit_writer(|scope| {
        Box::pin(async move {
            if let Some(value) = scope.recv().await {
                let (backend, tx) = scope.batch();
                backend.create_node(tx, &["Value"], PropertyMap::new()).await?;
                return Err(Error::Storage(format!("disk full after value {value}")));
            }
            Ok(())
        })
    })
    .await
    .unwrap();

    // Readers keep producing until the failed writer tears the scope down.
    let terminated = tokio::time::timeout(BOUND, async {
        loop {
            let submitted = op
                .submit_reader(|scope| {
                    Box::pin(async move {
                        for value in 0..100 {
                            scope.send(value)?;
                        }
                        Ok(())
                    })
                })
                .await;

            if let Err(err) = submitted {
                return err;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("submission never observed the failed operation");

    assert!(matches!(terminated, Error::OperationDone));
    assert!(op.is_done());

    let err = tokio::time::timeout(BOUND, op.done())
        .await
        .expect("done() deadlocked")
        .unwrap_err();

    assert!(matches!(err, Error::Worker { role: "writer", .. }));
    assert!(err.to_string().contains("disk full"));

    // The failed writer rolled back its batch.
    assert_eq!(db.node_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reader_failure_is_joined_with_context() {
    let db = Arc::new(MemoryBackend::new());
    db.seed_node(Node::new(NodeId(1)));
    db.fail_expansion_of(NodeId(1), Fault::Storage("connection reset".into()));

    let op = Operation::<MemoryBackend, u64>::start_new(OperationConfig::new(1, 1), &CancellationToken::new(), db)
        .unwrap();

    op.submit_reader(|scope| {
        Box::pin(async move {
            let query = dawgs::RelationshipQuery::outbound(NodeId(1));
            scope.backend().fetch_relationships(scope.tx(), &query).await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    let err = tokio::time::timeout(BOUND, op.done()).await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "reader 0 failed: Storage error: connection reset");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parent_cancellation_stops_submission() {
    let parent = CancellationToken::new();
    let op = Operation::<MemoryBackend, u64>::start_new(OperationConfig::new(1, 1), &parent, Arc::new(MemoryBackend::new()))
        .unwrap();

    parent.cancel();

    let submitted = op.submit_reader(|_| Box::pin(async { Ok(()) })).await;
    assert!(matches!(submitted, Err(Error::OperationDone)));

    // Leaving on cancellation is not a failure.
    tokio::time::timeout(BOUND, op.done()).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_node_query_joins_errors() {
    let db = Arc::new(MemoryBackend::new());
    for id in [1u64, 25_000, 45_000] {
        db.seed_node(Node::new(NodeId(id)));
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();

    let err = parallel_node_query(&CancellationToken::new(), db, None, 3, move |_, _, query| {
        counted.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if query.floor == NodeId(0) {
                Err(Error::Storage("first stripe".into()))
            } else {
                Ok(())
            }
        })
    })
    .await
    .unwrap_err();

    assert!(err.to_string().contains("first stripe"));
    assert!(calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_node_query_reports_cancellation() {
    let db = Arc::new(MemoryBackend::new());
    db.seed_node(Node::new(NodeId(1)));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = parallel_node_query(&cancel, db, None, 2, |_, _, _| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();
    assert!(err.is_cancellation());
}
