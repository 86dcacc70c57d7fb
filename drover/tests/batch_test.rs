//! Integration tests for the batch committer: grouping, partial flush,
//! bounded retry of transient commit conflicts, and per-item ledgering when
//! retries run out.


use std::sync::{Arc, Mutex};
use std::time::Duration;

use drover::BatchCommitter;
use drover_api::types::MutationFn;
use test_helpers::{test_factory, wait_until, MemoryStore, WAIT};

fn staging_mutation(store: &MemoryStore, value: &str) -> MutationFn {
    let store = store.clone();
    let value = value.to_string();
    Arc::new(move |session| {
        let store = store.clone();
        let value = value.clone();
        Box::pin(async move {
            store.stage(&session, value);
            Ok(())
        })
    })
}

fn noop_mutation() -> MutationFn {
    Arc::new(|_session| Box::pin(async { Ok(()) }))
}

fn recording_mutation(applied: &Arc<Mutex<Vec<String>>>, id: &str) -> MutationFn {
    let applied = applied.clone();
    let id = id.to_string();
    Arc::new(move |_session| {
        let applied = applied.clone();
        let id = id.clone();
        Box::pin(async move {
            applied.lock().unwrap().push(id);
            Ok(())
        })
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_groups_flush_at_batch_size() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("import", store.session(), 5)
        .unwrap();

    let applied: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    // Group size follows the manager's save interval.
    let committer = BatchCommitter::with_save_interval(manager.clone());

    for i in 0..12 {
        let id = format!("/import/node-{i}");
        let mutation = recording_mutation(&applied, &id);
        committer.add(id, mutation).unwrap();
    }
    // Two full groups scheduled, two mutations left buffered.
    assert_eq!(committer.pending_count(), 2);

    committer.commit_batch().unwrap();
    assert_eq!(committer.pending_count(), 0);
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || manager.is_complete()).await);
    // Each group is one unit of work with one commit.
    assert_eq!(manager.added_count(), 3);
    assert_eq!(manager.success_count(), 3);
    assert_eq!(store.commit_count(), 3);
    assert_eq!(applied.lock().unwrap().len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transient_conflicts_retried_to_success() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("retry", store.session(), 100)
        .unwrap();

    store.fail_next_commits(2, true);

    let mut committer = BatchCommitter::new(manager.clone(), 10);
    committer.set_retry_count(3);
    committer.set_retry_wait(Duration::from_millis(5));

    committer.add("/retry/a", noop_mutation()).unwrap();
    committer.add("/retry/b", noop_mutation()).unwrap();
    committer.commit_batch().unwrap();
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || manager.is_complete()).await);
    assert_eq!(manager.success_count(), 1);
    assert_eq!(manager.error_count(), 0);
    assert!(manager.failure_list().is_empty());
    // Third attempt landed.
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exhausted_retries_ledger_every_grouped_item() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("exhaust", store.session(), 100)
        .unwrap();

    store.fail_next_commits(10, true);

    let mut committer = BatchCommitter::new(manager.clone(), 10);
    committer.set_retry_count(2);
    committer.set_retry_wait(Duration::from_millis(5));

    for i in 0..4 {
        committer
            .add(format!("/exhaust/node-{i}"), noop_mutation())
            .unwrap();
    }
    committer.commit_batch().unwrap();
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || manager.is_complete()).await);
    // One failed unit of work, but one ledger entry per grouped item.
    assert_eq!(manager.error_count(), 1);
    assert_eq!(manager.success_count(), 0);
    let failures = manager.failure_list();
    assert_eq!(failures.len(), 4);
    assert!(failures.iter().any(|f| f.item == "/exhaust/node-0"));
    assert!(failures.iter().any(|f| f.item == "/exhaust/node-3"));
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fatal_commit_failure_never_retries() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("fatal", store.session(), 100)
        .unwrap();

    // A single injected failure: any retry would succeed, so a zero commit
    // count afterwards proves none was attempted.
    store.fail_next_commits(1, false);

    let mut committer = BatchCommitter::new(manager.clone(), 10);
    committer.set_retry_count(3);
    committer.set_retry_wait(Duration::from_millis(5));

    committer.add("/fatal/a", noop_mutation()).unwrap();
    committer.add("/fatal/b", noop_mutation()).unwrap();
    committer.commit_batch().unwrap();
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || manager.is_complete()).await);
    assert_eq!(manager.error_count(), 1);
    assert_eq!(manager.failure_list().len(), 2);
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_group_mutations_never_reach_a_later_commit() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 1);
    let manager = factory
        .create_action_manager("isolate", store.session(), 100)
        .unwrap();

    // The first group's commit fails fatally with its mutation still staged
    // on the session. That session must not serve the next group, or the
    // next group's commit would persist the failed mutation alongside its
    // own.
    store.fail_next_commits(1, false);

    let mut committer = BatchCommitter::new(manager.clone(), 1);
    committer.set_retry_count(0);
    committer.set_retry_wait(Duration::from_millis(5));

    committer
        .add("/isolate/a", staging_mutation(&store, "a"))
        .unwrap();
    committer
        .add("/isolate/b", staging_mutation(&store, "b"))
        .unwrap();
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || manager.is_complete()).await);
    assert_eq!(manager.error_count(), 1);
    assert_eq!(manager.success_count(), 1);
    assert_eq!(manager.failure_list().len(), 1);
    assert_eq!(store.commit_count(), 1);
    assert_eq!(store.persisted(), vec!["b".to_string()]);
}
