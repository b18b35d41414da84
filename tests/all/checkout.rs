use crate::helpers::{get_pool, pool_builder, replayable_rendezvous, MockManager};
use rendezvous_pool::PoolError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn checked_out_connections_never_exceed_the_configured_maximum() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager).max_connections(2).build().unwrap();
    pool.start();
    let checked_out = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    // Act
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let pool = pool.clone();
            let checked_out = checked_out.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();
                let now = checked_out.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                checked_out.fetch_sub(1, Ordering::SeqCst);
                handle.complete("done".into());
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Assert
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(manager.created() <= 2);
    assert!(pool.status().open <= 2);
}

#[tokio::test]
async fn a_connection_is_never_handed_out_twice_at_the_same_time() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager).max_connections(3).build().unwrap();
    pool.start();

    // Act
    let mut handles = Vec::new();
    for _ in 0..3 {
        handles.push(pool.get_handle(replayable_rendezvous()).await.unwrap());
    }

    // Assert
    let ids: HashSet<usize> = handles.iter().map(|h| h.connection().id).collect();
    let keys: HashSet<_> = handles.iter().map(|h| h.key()).collect();
    assert_eq!(3, ids.len());
    assert_eq!(3, keys.len());
    assert_eq!(0, pool.status().idle);
}

#[tokio::test]
async fn released_connections_are_reused() {
    // Arrange
    let manager = MockManager::default();
    let pool = get_pool(&manager);
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();
    let first = handle.connection().id;

    // Act
    handle.release();
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();

    // Assert
    assert_eq!(first, handle.connection().id);
    assert_eq!(2, handle.uses());
    assert_eq!(1, manager.created());
}

#[tokio::test]
async fn dropping_a_handle_returns_its_connection_to_the_pool() {
    // Arrange
    let manager = MockManager::default();
    let pool = get_pool(&manager);
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();
    let first = handle.connection().id;

    // Act
    drop(handle);

    // Assert
    assert_eq!(1, pool.status().idle);
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();
    assert_eq!(first, handle.connection().id);
}

#[tokio::test]
async fn an_invalid_connection_is_discarded_and_replaced() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager).max_connections(1).build().unwrap();
    pool.start();
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();
    let stale = handle.connection().id;
    handle.release();

    // Act
    manager.invalidate(stale);
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();

    // Assert
    assert_ne!(stale, handle.connection().id);
    assert_eq!(1, manager.closed());
    assert_eq!(2, manager.created());
    // The stale connection gave its slot back before the replacement was opened.
    assert_eq!(1, pool.status().open);
}

#[tokio::test]
async fn a_connection_that_reached_its_reuse_limit_is_retired() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager)
        .max_connection_reuse(1)
        .build()
        .unwrap();
    pool.start();

    // Act
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();
    let first = handle.connection().id;
    handle.complete("first".into());
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();

    // Assert
    assert_ne!(first, handle.connection().id);
    assert_eq!(1, manager.closed());
    assert_eq!(1, handle.uses());
}

#[tokio::test]
async fn a_connection_serves_exactly_max_connection_reuse_commands() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager)
        .max_connection_reuse(3)
        .build()
        .unwrap();
    pool.start();

    // Act
    let mut ids = Vec::new();
    for _ in 0..4 {
        let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();
        ids.push(handle.connection().id);
        handle.release();
    }

    // Assert
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[0], ids[2]);
    assert_ne!(ids[0], ids[3]);
}

#[tokio::test(start_paused = true)]
async fn checkout_times_out_when_the_pool_is_saturated() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager)
        .max_connections(1)
        .checkout_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    pool.start();
    let _held = pool.get_handle(replayable_rendezvous()).await.unwrap();
    assert!(!pool.hit_bottom());

    // Act
    let started = tokio::time::Instant::now();
    let err = pool.get_handle(replayable_rendezvous()).await.unwrap_err();

    // Assert
    assert!(started.elapsed() >= Duration::from_secs(5));
    match &err {
        PoolError::Timeout { endpoint, waited } => {
            assert_eq!(pool.endpoint(), endpoint);
            assert_eq!(Duration::from_secs(5), *waited);
        }
        other => panic!("Expected a timeout, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert!(pool.hit_bottom());
    assert_eq!(0, pool.status().waiting);
}

#[tokio::test(start_paused = true)]
async fn the_saturation_latch_never_resets() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager)
        .max_connections(1)
        .checkout_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    pool.start();
    let held = pool.get_handle(replayable_rendezvous()).await.unwrap();
    let _ = pool.get_handle(replayable_rendezvous()).await.unwrap_err();

    // Act
    held.release();
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();

    // Assert
    assert!(pool.hit_bottom());
    assert!(pool.status().hit_bottom);
    drop(handle);
}

#[tokio::test(start_paused = true)]
async fn a_waiting_caller_gets_the_connection_released_by_another() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager).max_connections(1).build().unwrap();
    pool.start();
    let held = pool.get_handle(replayable_rendezvous()).await.unwrap();
    let held_id = held.connection().id;
    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move {
            let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();
            handle.connection().id
        }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(1, pool.status().waiting);

    // Act
    held.release();

    // Assert
    assert_eq!(held_id, waiter.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn retries_after_unusable_connections_keep_the_original_deadline() {
    // Arrange
    let manager = MockManager::default();
    manager.reject_all_connections();
    manager.slow_validation(Duration::from_secs(2));
    let pool = pool_builder(&manager)
        .max_connections(1)
        .checkout_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    pool.start();

    // Act
    let started = tokio::time::Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(60),
        pool.get_handle(replayable_rendezvous()),
    )
    .await
    .expect("Retries should not push the deadline back");

    // Assert
    assert!(matches!(result, Err(PoolError::Timeout { .. })));
    let elapsed = started.elapsed();
    // The validation in flight when the deadline passes is allowed to finish.
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(8), "Timed out after {elapsed:?}");
    assert!(manager.closed() >= 2);
}
