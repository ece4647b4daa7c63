//! Integration tests for the concurrent breadth-first sweep.
//!
//! Each test seeds a `MemoryBackend`, runs `Traversal::breadth_first` with a
//! multi-threaded runtime and checks what the drivers, filters and visitors
//! observed.

use std::sync::Arc;
use std::time::Duration;

use dawgs::graphcache::Cache;
use dawgs::storage::memory::Fault;
use dawgs::traversal::{
    acyclic_node_filter, filtered_skip_limit, unique_path_filter, LightweightDriver, LightweightIdDriver, Pattern, Plan,
    Traversal,
};
use dawgs::{
    Criteria, Direction, Error, MemoryBackend, Node, NodeId, PathSegment, RelId, Relationship, Size, StorageConfig,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fixtures
// ============================================================================

fn seed(db: &MemoryBackend, nodes: &[(u64, &str)], edges: &[(u64, u64, u64, &str)]) {
    for (id, kind) in nodes {
        db.seed_node(Node::new(NodeId(*id)).with_kinds([*kind]));
    }
    for (id, src, dst, kind) in edges {
        db.seed_relationship(Relationship::new(RelId(*id), NodeId(*src), NodeId(*dst), *kind));
    }
}

/// root(1) → A(2), root → B(3), A → C(4), B → C(4)
fn diamond() -> Arc<MemoryBackend> {
    let db = MemoryBackend::new();
    seed(
        &db,
        &[(1, "User"), (2, "Group"), (3, "Group"), (4, "Computer")],
        &[(10, 1, 2, "MemberOf"), (11, 1, 3, "MemberOf"), (12, 2, 4, "AdminTo"), (13, 3, 4, "AdminTo")],
    );
    Arc::new(db)
}

async fn sweep(db: Arc<MemoryBackend>, workers: usize, driver: LightweightDriver) -> dawgs::Result<()> {
    tokio::time::timeout(
        Duration::from_secs(10),
        Traversal::new(db, workers).breadth_first(&CancellationToken::new(), Plan::from_root(Node::new(NodeId(1)), driver)),
    )
    .await
    .expect("traversal did not finish")
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_diamond_visits_convergence_node_once() {
    let visits = Arc::new(Mutex::new(Vec::new()));
    let sink = visits.clone();

    let driver = LightweightDriver::new(
        Direction::Outgoing,
        Cache::new(),
        None,
        acyclic_node_filter(move |segment: &Arc<PathSegment>| {
            sink.lock().push(segment.node_id());
            true
        }),
    );

    sweep(diamond(), 4, driver).await.unwrap();

    let mut visits = visits.lock().clone();
    visits.sort_unstable();
    assert_eq!(visits, vec![NodeId(2), NodeId(3), NodeId(4)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unique_path_reaches_convergence_node_twice() {
    let terminals = Arc::new(Mutex::new(Vec::new()));
    let sink = terminals.clone();

    let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, unique_path_filter(|_| true))
        .with_terminal_visitor(move |segment: &Arc<PathSegment>| sink.lock().push(segment.path().node_ids()));

    sweep(diamond(), 4, driver).await.unwrap();

    let mut terminals = terminals.lock().clone();
    terminals.sort();
    assert_eq!(
        terminals,
        vec![
            vec![NodeId(1), NodeId(2), NodeId(4)],
            vec![NodeId(1), NodeId(3), NodeId(4)],
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_skip_limit_collects_only_the_middle_candidate() {
    let db = MemoryBackend::new();
    seed(
        &db,
        &[(1, "User"), (2, "Computer"), (3, "Computer"), (4, "Computer")],
        &[(12, 1, 4, "AdminTo"), (10, 1, 2, "AdminTo"), (11, 1, 3, "AdminTo")],
    );

    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();

    let filter = filtered_skip_limit(
        |segment: &Arc<PathSegment>| (segment.node().has_kind("Computer"), true),
        move |segment: &Arc<PathSegment>| sink.lock().push(segment.node_id()),
        1,
        1,
    );
    let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, filter).ordered(true);

    sweep(Arc::new(db), 2, driver).await.unwrap();

    assert_eq!(*collected.lock(), vec![NodeId(3)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_relationship_criteria_is_passed_through() {
    let terminals = Arc::new(Mutex::new(Vec::new()));
    let sink = terminals.clone();

    let driver = LightweightDriver::new(
        Direction::Outgoing,
        Cache::new(),
        Some(Criteria::kinds(["MemberOf"])),
        acyclic_node_filter(|_| true),
    )
    .with_terminal_visitor(move |segment: &Arc<PathSegment>| sink.lock().push(segment.node_id()));

    sweep(diamond(), 2, driver).await.unwrap();

    let mut terminals = terminals.lock().clone();
    terminals.sort_unstable();
    assert_eq!(terminals, vec![NodeId(2), NodeId(3)]);
}

// ============================================================================
// Failure classification
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_memory_limit_is_reported_and_distinguishable() {
    let db = MemoryBackend::with_config(StorageConfig {
        traversal_memory_limit: Size(1),
        ..StorageConfig::default()
    });
    seed(&db, &[(1, "User"), (2, "Group")], &[(10, 1, 2, "MemberOf")]);

    let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, acyclic_node_filter(|_| true));
    let err = sweep(Arc::new(db), 2, driver).await.unwrap_err();

    assert!(err.is_memory_limit());
    assert!(!err.is_cancellation());
    assert!(err.to_string().contains("Limit: 0.00 MB"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_is_distinguishable() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, acyclic_node_filter(|_| true));
    let err = Traversal::new(diamond(), 2)
        .breadth_first(&cancel, Plan::from_root(Node::new(NodeId(1)), driver))
        .await
        .unwrap_err();

    assert!(err.is_cancellation());
    assert!(!err.is_memory_limit());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_both_directions_are_rejected_before_any_expansion() {
    let edgeless = Arc::new(MemoryBackend::new());
    edgeless.seed_node(Node::new(NodeId(1)));

    for db in [edgeless, diamond()] {
        let terminals = Arc::new(Mutex::new(0usize));
        let sink = terminals.clone();
        let driver = LightweightDriver::new(Direction::Both, Cache::new(), None, acyclic_node_filter(|_| true))
            .with_terminal_visitor(move |_: &Arc<PathSegment>| *sink.lock() += 1);

        let err = sweep(db.clone(), 2, driver).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDirection));
        assert_eq!(*terminals.lock(), 0);

        let id_driver = LightweightIdDriver::new(Direction::Both, None, acyclic_node_filter(|_| true));
        let err = Traversal::new(db, 2)
            .breadth_first(&CancellationToken::new(), Plan::from_root(NodeId(1), id_driver))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDirection));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_result_is_not_an_error() {
    let db = Arc::new(MemoryBackend::new());
    db.seed_node(Node::new(NodeId(1)));

    let terminals = Arc::new(Mutex::new(Vec::new()));
    let sink = terminals.clone();
    let driver = LightweightDriver::new(Direction::Incoming, Cache::new(), None, acyclic_node_filter(|_| true))
        .with_terminal_visitor(move |segment: &Arc<PathSegment>| sink.lock().push(segment.depth()));

    sweep(db, 2, driver).await.unwrap();

    // Only the root was expanded, and it had nothing below it.
    assert_eq!(*terminals.lock(), vec![0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_error_fails_the_sweep() {
    let db = diamond();
    db.fail_expansion_of(NodeId(2), Fault::Storage("connection reset".into()));

    let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, acyclic_node_filter(|_| true));
    let err = sweep(db, 2, driver).await.unwrap_err();

    assert!(matches!(err, Error::Worker { role: "reader", .. }));
    assert!(err.to_string().contains("connection reset"));
    assert!(!err.is_cancellation());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_expansion_is_discarded() {
    let db = MemoryBackend::new();
    seed(
        &db,
        &[(1, "User"), (2, "Group"), (3, "Group"), (4, "Computer")],
        &[(10, 1, 2, "MemberOf"), (11, 1, 3, "MemberOf"), (12, 3, 4, "AdminTo")],
    );
    db.fail_expansion_of(NodeId(2), Fault::TimedOut);

    let terminals = Arc::new(Mutex::new(Vec::new()));
    let sink = terminals.clone();
    let driver = LightweightDriver::new(Direction::Outgoing, Cache::new(), None, acyclic_node_filter(|_| true))
        .with_terminal_visitor(move |segment: &Arc<PathSegment>| sink.lock().push(segment.node_id()));

    sweep(Arc::new(db), 2, driver).await.unwrap();

    assert_eq!(*terminals.lock(), vec![NodeId(4)]);
}

// ============================================================================
// Pattern driver
// ============================================================================

/// user(1) -MemberOf-> group(2) -MemberOf-> group(3) -AdminTo-> computer(4)
///                     group(2) -AdminTo-> computer(5)
///        session(7) -HasSession-> group(2)
fn nested_groups() -> Arc<MemoryBackend> {
    let db = MemoryBackend::new();
    seed(
        &db,
        &[(1, "User"), (2, "Group"), (3, "Group"), (4, "Computer"), (5, "Computer"), (7, "Computer")],
        &[
            (10, 1, 2, "MemberOf"),
            (11, 2, 3, "MemberOf"),
            (12, 3, 4, "AdminTo"),
            (13, 2, 5, "AdminTo"),
            (14, 7, 2, "HasSession"),
        ],
    );
    Arc::new(db)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pattern_matches_chained_expansions() {
    let matches = Arc::new(Mutex::new(Vec::new()));
    let sink = matches.clone();

    let driver = Pattern::new()
        .outbound([Criteria::kinds(["MemberOf"])])
        .outbound_with_depth(1, 1, [Criteria::kinds(["AdminTo"])])
        .on_match(move |terminal| {
            sink.lock().push(terminal.path().node_ids());
            Ok(())
        });

    Traversal::new(nested_groups(), 4)
        .breadth_first(&CancellationToken::new(), Plan::from_root(Node::new(NodeId(1)), driver))
        .await
        .unwrap();

    let mut matches = matches.lock().clone();
    matches.sort();
    assert_eq!(
        matches,
        vec![
            vec![NodeId(1), NodeId(2), NodeId(3), NodeId(4)],
            vec![NodeId(1), NodeId(2), NodeId(5)],
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pattern_optional_step() {
    let matches = Arc::new(Mutex::new(Vec::new()));
    let sink = matches.clone();

    let driver = Pattern::new()
        .outbound_with_depth(1, 1, [Criteria::kinds(["MemberOf"])])
        .inbound_with_depth(0, 1, [Criteria::kinds(["HasSession"])])
        .on_match(move |terminal| {
            sink.lock().push(terminal.path().node_ids());
            Ok(())
        });

    Traversal::new(nested_groups(), 2)
        .breadth_first(&CancellationToken::new(), Plan::from_root(Node::new(NodeId(1)), driver))
        .await
        .unwrap();

    assert_eq!(*matches.lock(), vec![vec![NodeId(1), NodeId(2), NodeId(7)]]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pattern_delegate_error_fails_the_sweep() {
    let driver = Pattern::new()
        .outbound([Criteria::kinds(["MemberOf"])])
        .on_match(|_| Err(Error::Storage("sink closed".into())));

    let err = Traversal::new(nested_groups(), 2)
        .breadth_first(&CancellationToken::new(), Plan::from_root(Node::new(NodeId(1)), driver))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("sink closed"));
}
