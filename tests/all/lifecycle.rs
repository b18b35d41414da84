use crate::helpers::{get_pool, pool_builder, replayable_rendezvous, MockManager};
use rendezvous_pool::{PoolError, PoolState};
use std::time::Duration;

#[tokio::test]
async fn a_pool_that_was_not_started_refuses_checkouts() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager).build().unwrap();

    // Act
    let result = pool.get_handle(replayable_rendezvous()).await;

    // Assert
    match result {
        Err(PoolError::NotActive { state, .. }) => assert_eq!(PoolState::Inactive, state),
        other => panic!("Expected the pool to be inactive, got {other:?}"),
    }
    assert!(!result_is_retryable(&pool.get_handle(replayable_rendezvous()).await));
    assert_eq!(0, manager.created());
}

fn result_is_retryable<T>(result: &Result<T, PoolError>) -> bool {
    matches!(result, Err(e) if e.is_retryable())
}

#[tokio::test]
async fn shutdown_closes_idle_connections_and_terminates() {
    // Arrange
    let manager = MockManager::default();
    let pool = get_pool(&manager);
    pool.get_handle(replayable_rendezvous())
        .await
        .unwrap()
        .release();
    assert_eq!(1, pool.status().idle);

    // Act
    pool.shutdown();
    pool.shutdown();

    // Assert
    assert_eq!(PoolState::Terminated, pool.state());
    assert_eq!(1, manager.closed());
    assert_eq!(0, pool.status().open);
    pool.await_termination().await;
}

#[tokio::test]
async fn a_pool_stays_shutting_down_until_checked_out_connections_come_back() {
    // Arrange
    let manager = MockManager::default();
    let pool = get_pool(&manager);
    let rendezvous = replayable_rendezvous();
    let handle = pool.get_handle(rendezvous.clone()).await.unwrap();

    // Act
    pool.shutdown();

    // Assert
    assert_eq!(PoolState::ShuttingDown, pool.state());
    assert!(matches!(
        pool.get_handle(replayable_rendezvous()).await,
        Err(PoolError::NotActive {
            state: PoolState::ShuttingDown,
            ..
        })
    ));
    let termination = tokio::spawn({
        let pool = pool.clone();
        async move { pool.await_termination().await }
    });

    // In-flight work still completes.
    assert!(handle.complete("done".into()));
    assert_eq!("done", rendezvous.wait().await.unwrap());
    termination.await.unwrap();
    assert_eq!(PoolState::Terminated, pool.state());
    assert_eq!(1, manager.closed());
}

#[tokio::test(start_paused = true)]
async fn shutdown_wakes_callers_waiting_for_a_connection() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager).max_connections(1).build().unwrap();
    pool.start();
    let held = pool.get_handle(replayable_rendezvous()).await.unwrap();
    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.get_handle(replayable_rendezvous()).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(1, pool.status().waiting);

    // Act
    pool.shutdown();

    // Assert
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(PoolError::NotActive { .. })));
    drop(held);
    assert_eq!(PoolState::Terminated, pool.state());
}

#[tokio::test]
async fn failing_to_open_connections_exhausts_the_session_failure_budget() {
    // Arrange
    let manager = MockManager::default();
    manager.fail_next_creates(2);
    let pool = pool_builder(&manager)
        .max_session_failures(2)
        .build()
        .unwrap();
    pool.start();

    // Act
    let result = pool.get_handle(replayable_rendezvous()).await;

    // Assert
    assert!(matches!(result, Err(PoolError::NotActive { .. })));
    assert_eq!(2, pool.session_failures());
    assert_eq!("connection refused", pool.fatal_error().unwrap().to_string());
    pool.await_termination().await;
    assert_eq!(0, manager.created());
}

#[tokio::test]
async fn a_single_failed_connection_attempt_is_retried() {
    // Arrange
    let manager = MockManager::default();
    manager.fail_next_creates(1);
    let pool = get_pool(&manager);

    // Act
    let handle = pool.get_handle(replayable_rendezvous()).await.unwrap();

    // Assert
    assert_eq!(1, handle.connection().id);
    assert_eq!(1, pool.session_failures());
    assert_eq!(PoolState::Active, pool.state());
}

#[tokio::test]
async fn a_pool_cannot_be_restarted_after_shutdown() {
    // Arrange
    let manager = MockManager::default();
    let pool = get_pool(&manager);
    pool.shutdown();

    // Act
    pool.start();

    // Assert
    assert_eq!(PoolState::Terminated, pool.state());
}

#[tokio::test]
async fn shutting_down_a_pool_that_was_never_started_terminates_it() {
    let manager = MockManager::default();
    let pool = pool_builder(&manager).build().unwrap();

    pool.shutdown();

    assert_eq!(PoolState::Terminated, pool.state());
}

#[tokio::test]
async fn status_reflects_the_pool() {
    // Arrange
    let manager = MockManager::default();
    let pool = pool_builder(&manager).max_connections(3).build().unwrap();
    pool.start();

    // Act
    let first = pool.get_handle(replayable_rendezvous()).await.unwrap();
    let second = pool.get_handle(replayable_rendezvous()).await.unwrap();
    second.release();
    let status = pool.status();

    // Assert
    assert_eq!(PoolState::Active, status.state);
    assert_eq!(3, status.max_connections);
    assert_eq!(2, status.open);
    assert_eq!(1, status.idle);
    assert_eq!(0, status.waiting);
    assert_eq!(0, status.session_failures);
    assert!(!status.hit_bottom);
    drop(first);
}

#[test]
fn handles_dropped_outside_of_a_runtime_are_checked_in() {
    // Arrange
    let manager = MockManager::default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let pool = get_pool(&manager);
    let handle = runtime
        .block_on(pool.get_handle(replayable_rendezvous()))
        .unwrap();

    // Act
    drop(handle);

    // Assert
    assert_eq!(1, pool.status().idle);
}
