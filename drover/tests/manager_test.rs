//! Integration tests for action managers: aggregate counts, the failure
//! ledger, query-driven scheduling, lifecycle hooks, and the factory
//! registry.


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use drover::ManagerError;
use drover_api::priority;
use drover_api::types::{ItemCallback, ItemFilter};
use drover_api::work::WorkError;
use test_helpers::{test_factory, wait_until, MemoryStore, WAIT};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counts_track_every_unit() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 4);
    let manager = factory
        .create_action_manager("copy", store.session(), 100)
        .unwrap();

    for i in 0..50 {
        if i % 2 == 0 {
            manager
                .deferred_with_resolver(Box::new(|_session| Box::pin(async { Ok(()) })))
                .unwrap();
        } else {
            manager
                .deferred_with_priority(
                    Box::new(|_session| Box::pin(async { Ok(()) })),
                    priority::HIGH,
                )
                .unwrap();
        }
    }
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || manager.is_complete()).await);
    assert_eq!(manager.added_count(), 50);
    assert_eq!(manager.success_count(), 50);
    assert_eq!(manager.error_count(), 0);
    assert!(manager.failure_list().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failures_counted_and_ledgered() {
    let store = MemoryStore::new();
    // One worker keeps the current-item diagnostic deterministic.
    let factory = test_factory(&store, 1);
    let manager = factory
        .create_action_manager("reindex", store.session(), 100)
        .unwrap();

    for i in 0..200usize {
        let tracker = manager.clone();
        manager
            .deferred_with_resolver(Box::new(move |_session| {
                Box::pin(async move {
                    tracker.set_current_item(format!("/content/item-{i}"));
                    if i % 10 == 9 {
                        Err(WorkError::Callback("validation rejected".into()))
                    } else {
                        Ok(())
                    }
                })
            }))
            .unwrap();
    }
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || manager.is_complete()).await);
    assert_eq!(manager.added_count(), 200);
    assert_eq!(manager.success_count(), 180);
    assert_eq!(manager.error_count(), 20);
    assert_eq!(
        manager.added_count(),
        manager.success_count() + manager.error_count()
    );

    let failures = manager.failure_list();
    assert_eq!(failures.len(), 20);
    let mut items: Vec<&str> = failures.iter().map(|f| f.item.as_str()).collect();
    items.sort_unstable();
    items.dedup();
    assert_eq!(items.len(), 20);
    assert!(failures.iter().all(|f| f.error.contains("validation rejected")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_query_results_filtered_and_counted() {
    let store = MemoryStore::with_items(["/assets/a", "/assets/b", "/archive/c"]);
    let factory = test_factory(&store, 4);
    let manager = factory
        .create_action_manager("publish", store.session(), 100)
        .unwrap();

    let processed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let callback: ItemCallback = {
        let processed = processed.clone();
        Arc::new(move |_session, id| {
            let processed = processed.clone();
            Box::pin(async move {
                processed.lock().unwrap().push(id);
                Ok(())
            })
        })
    };
    let filters: Vec<ItemFilter> = vec![Arc::new(|id: &str| id.starts_with("/assets"))];

    let hits = manager
        .with_query_results("select assets", "sql", callback, filters)
        .await
        .unwrap();
    manager.add_cleanup_task();

    // Hit count reflects the query before filtering.
    assert_eq!(hits, 3);
    assert!(wait_until(WAIT, || manager.is_complete()).await);
    assert_eq!(manager.success_count(), 2);

    let mut processed = processed.lock().unwrap().clone();
    processed.sort();
    assert_eq!(processed, vec!["/assets/a", "/assets/b"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hooks_fire_exactly_once() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("migrate", store.session(), 100)
        .unwrap();

    let success_fired = Arc::new(AtomicUsize::new(0));
    let failure_fired = Arc::new(AtomicUsize::new(0));
    let failure_seen = Arc::new(AtomicUsize::new(0));
    let finish_fired = Arc::new(AtomicUsize::new(0));

    {
        let success_fired = success_fired.clone();
        manager.on_success(Box::new(move || {
            success_fired.fetch_add(1, Ordering::SeqCst);
        }));
    }
    {
        let failure_fired = failure_fired.clone();
        let failure_seen = failure_seen.clone();
        manager.on_failure(Box::new(move |failures| {
            failure_seen.store(failures.len(), Ordering::SeqCst);
            failure_fired.fetch_add(1, Ordering::SeqCst);
        }));
    }
    {
        let finish_fired = finish_fired.clone();
        manager.on_finish(Box::new(move || {
            finish_fired.fetch_add(1, Ordering::SeqCst);
        }));
    }

    for i in 0..3usize {
        manager
            .deferred_with_resolver(Box::new(move |_session| {
                Box::pin(async move {
                    if i == 1 {
                        Err(WorkError::Callback("broken".into()))
                    } else {
                        Ok(())
                    }
                })
            }))
            .unwrap();
    }
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || finish_fired.load(Ordering::SeqCst) == 1).await);
    assert_eq!(success_fired.load(Ordering::SeqCst), 0);
    assert_eq!(failure_fired.load(Ordering::SeqCst), 1);
    assert_eq!(failure_seen.load(Ordering::SeqCst), 1);

    // Hooks registered after completion fire immediately, per ledger state.
    let late_finish = Arc::new(AtomicUsize::new(0));
    {
        let late_finish = late_finish.clone();
        manager.on_finish(Box::new(move || {
            late_finish.fetch_add(1, Ordering::SeqCst);
        }));
    }
    assert_eq!(late_finish.load(Ordering::SeqCst), 1);

    let late_success = Arc::new(AtomicUsize::new(0));
    {
        let late_success = late_success.clone();
        manager.on_success(Box::new(move || {
            late_success.fetch_add(1, Ordering::SeqCst);
        }));
    }
    assert_eq!(late_success.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_with_resolver_runs_inline() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("validate", store.session(), 100)
        .unwrap();

    let ok = manager
        .with_resolver(Box::new(|_session| Box::pin(async { Ok(()) })))
        .await;
    assert!(ok.is_ok());
    assert_eq!(manager.added_count(), 1);
    assert_eq!(manager.success_count(), 1);

    let err = manager
        .with_resolver(Box::new(|_session| {
            Box::pin(async { Err(WorkError::Callback("bad input".into())) })
        }))
        .await;
    assert!(err.is_err());
    assert_eq!(manager.error_count(), 1);
    assert_eq!(manager.failure_list().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cleanup_closes_pooled_sessions() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("cleanup", store.session(), 100)
        .unwrap();

    for _ in 0..3 {
        manager
            .deferred_with_resolver(Box::new(|_session| Box::pin(async { Ok(()) })))
            .unwrap();
    }
    manager.add_cleanup_task();

    assert!(wait_until(WAIT, || manager.is_complete()).await);
    assert!(wait_until(WAIT, || store.sessions_closed() >= 1).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_close_falls_back_to_teardown() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("late", store.session(), 100)
        .unwrap();

    let done = Arc::new(AtomicUsize::new(0));
    {
        let done = done.clone();
        manager
            .deferred_with_resolver(Box::new(move |_session| {
                Box::pin(async move {
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }))
            .unwrap();
    }
    assert!(wait_until(WAIT, || done.load(Ordering::SeqCst) == 1).await);
    assert!(wait_until(WAIT, || manager.is_complete()).await);

    // With the pool already gone, completion cannot schedule the deferred
    // session close; the sessions must survive for factory teardown.
    factory.pool().shutdown(Duration::from_secs(5)).await.unwrap();
    manager.add_cleanup_task();

    factory.purge_force("late").await.unwrap();
    // Worker session plus the primary.
    assert_eq!(store.sessions_closed(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_factory_registry_and_purge() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);

    let manager = factory
        .create_action_manager("move", store.session(), 100)
        .unwrap();
    let duplicate = factory.create_action_manager("move", store.session(), 100);
    assert!(matches!(duplicate, Err(ManagerError::DuplicateName(_))));

    assert!(factory.get("move").is_some());
    assert!(factory.get("missing").is_none());
    assert_eq!(factory.list(), vec!["move".to_string()]);
    assert!(matches!(
        factory.purge("missing"),
        Err(ManagerError::NotFound(_))
    ));

    // A manager with in-flight work refuses a plain purge.
    let release = Arc::new(Notify::new());
    {
        let release = release.clone();
        manager
            .deferred_with_resolver(Box::new(move |_session| {
                Box::pin(async move {
                    release.notified().await;
                    Ok(())
                })
            }))
            .unwrap();
    }
    assert!(
        wait_until(Duration::from_secs(1), || manager.remaining_count() == 1).await
    );
    assert!(matches!(
        factory.purge("move"),
        Err(ManagerError::PendingWork(_))
    ));

    release.notify_one();
    assert!(wait_until(WAIT, || manager.is_complete()).await);
    factory.purge("move").unwrap();
    assert!(factory.get("move").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_force_purge_and_factory_shutdown() {
    let store = MemoryStore::new();
    let factory = test_factory(&store, 2);
    let manager = factory
        .create_action_manager("stuck", store.session(), 100)
        .unwrap();

    manager
        .deferred_with_resolver(Box::new(|_session| {
            Box::pin(async {
                std::future::pending::<()>().await;
                Ok(())
            })
        }))
        .unwrap();
    assert!(wait_until(WAIT, || factory.pool().snapshot().running == 1).await);

    factory.purge_force("stuck").await.unwrap();
    assert!(factory.get("stuck").is_none());
    assert!(wait_until(WAIT, || manager.is_complete()).await);
    // Forced close covers the primary session too.
    assert!(wait_until(WAIT, || store.sessions_closed() >= 1).await);

    factory.shutdown(Duration::from_secs(5)).await.unwrap();
}
