//! Integration tests for the connection pool manager.
//!
//! Tests verify that:
//! - Concurrent first requests share a single pool establishment
//! - A failed establishment reaches every waiter and the next request starts over
//! - Idle pools are reclaimed only after a full idle interval without activity
//! - A timer that already fired cannot close a pool that was used after it was re-armed
//! - Waiters cancelled by a network teardown see a network error
//! - close_all closes every pool and pools can be re-established afterwards

mod common;

use common::{ScriptedDriver, login_error, pooled_config};
use std::time::Instant;
use futures_util::future::join_all;
use iseries_sql_engine::config::IdleDisconnect;
use iseries_sql_engine::db::PoolManager;
use std::sync::Arc;
use std::time::Duration;

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_establishment() {
    let driver = ScriptedDriver::affected();
    driver.set_connect_delay(Duration::from_millis(50));
    let manager = PoolManager::new(driver.arc());
    let config = pooled_config("shared");

    let results = join_all((0..5).map(|_| manager.get_pool(&config))).await;
    let pools: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(driver.connects(), 1);
    assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
    assert!(manager.has_pool("shared"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_establishment_reaches_all_waiters() {
    let driver = ScriptedDriver::affected();
    driver.set_connect_delay(Duration::from_millis(10));
    driver.fail_next_connect(login_error());
    let manager = PoolManager::new(driver.arc());
    let config = pooled_config("failing");

    let results = join_all((0..3).map(|_| manager.get_pool(&config))).await;
    for result in &results {
        let err = result.as_ref().err().expect("establishment should fail");
        assert!(err.to_string().starts_with("DB Connect Error: "));
    }
    assert!(!manager.has_pool("failing"));

    let pool = manager.get_pool(&config).await.unwrap();
    assert_eq!(driver.connects(), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_pool_reclaimed_after_full_interval() {
    let driver = ScriptedDriver::affected();
    let manager = PoolManager::new(driver.arc());
    let mut config = pooled_config("idle");
    config.options.idle_disconnect = Some(IdleDisconnect::Millis(1_000));

    let pool = manager.get_pool(&config).await.unwrap();

    tokio::time::advance(Duration::from_millis(900)).await;
    settle().await;
    assert!(manager.has_pool("idle"));

    // Activity re-arms the timer.
    manager.get_pool(&config).await.unwrap();
    tokio::time::advance(Duration::from_millis(900)).await;
    settle().await;
    assert!(manager.has_pool("idle"));
    assert!(!pool.is_closed());

    tokio::time::advance(Duration::from_millis(200)).await;
    settle().await;
    assert!(!manager.has_pool("idle"));
    assert!(pool.is_closed());
    assert_eq!(driver.closes(), 1);

    // A later request re-establishes the pool.
    let fresh = manager.get_pool(&config).await.unwrap();
    assert!(!Arc::ptr_eq(&pool, &fresh));
    assert_eq!(driver.connects(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_steady_traffic_around_idle_deadline_keeps_pool() {
    let driver = ScriptedDriver::affected();
    let manager = Arc::new(PoolManager::new(driver.arc()));
    let mut config = pooled_config("busy");
    config.options.idle_disconnect = Some(IdleDisconnect::Millis(50));

    let first = manager.get_pool(&config).await.unwrap();
    let deadline = Instant::now() + Duration::from_millis(500);

    let workers = (0..8).map(|_| {
        let manager = Arc::clone(&manager);
        let config = config.clone();
        let first = Arc::clone(&first);
        tokio::spawn(async move {
            while Instant::now() < deadline {
                let pool = manager.get_pool(&config).await.unwrap();
                assert!(Arc::ptr_eq(&pool, &first), "pool was reclaimed under traffic");
                let lease = pool.acquire().await.unwrap();
                pool.release(lease).await;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    });
    for result in join_all(workers).await {
        result.unwrap();
    }
    assert!(!first.is_closed());
    assert!(manager.has_pool("busy"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(first.is_closed());
    assert!(!manager.has_pool("busy"));
}

#[tokio::test(start_paused = true)]
async fn test_network_teardown_fails_waiters_with_network_error() {
    let driver = ScriptedDriver::affected();
    driver.set_connect_delay(Duration::from_millis(50));
    let manager = PoolManager::new(driver.arc());
    let config = pooled_config("pending");

    let (result, ()) = tokio::join!(manager.get_pool(&config), async {
        settle().await;
        manager.close_all_after_network_failure().await;
    });

    let err = result.err().expect("waiter should be cancelled");
    assert!(err.is_network());
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_explicit_close_fails_waiters_with_connection_error() {
    let driver = ScriptedDriver::affected();
    driver.set_connect_delay(Duration::from_millis(50));
    let manager = PoolManager::new(driver.arc());
    let config = pooled_config("pending");

    let (result, ()) = tokio::join!(manager.get_pool(&config), async {
        settle().await;
        manager.close_all().await;
    });

    let err = result.err().expect("waiter should be cancelled");
    assert!(!err.is_network());
    assert!(err.to_string().contains("Connection pools were closed"));
}

#[tokio::test(start_paused = true)]
async fn test_idle_disconnect_disabled_keeps_pool() {
    let driver = ScriptedDriver::affected();
    let manager = PoolManager::new(driver.arc());
    let mut config = pooled_config("forever");
    config.options.idle_disconnect = Some(IdleDisconnect::Disabled);

    manager.get_pool(&config).await.unwrap();
    tokio::time::advance(Duration::from_secs(4 * 60 * 60)).await;
    settle().await;
    assert!(manager.has_pool("forever"));
}

#[tokio::test]
async fn test_close_all_closes_every_pool() {
    let driver = ScriptedDriver::affected();
    let manager = PoolManager::new(driver.arc());
    let first = manager.get_pool(&pooled_config("a")).await.unwrap();
    let second = manager.get_pool(&pooled_config("b")).await.unwrap();
    assert_eq!(driver.connects(), 2);

    manager.close_all().await;
    assert!(first.is_closed());
    assert!(second.is_closed());
    assert!(!manager.has_pool("a"));
    assert!(!manager.has_pool("b"));
    assert_eq!(driver.closes(), 2);
    assert!(first.acquire().await.is_err());

    manager.get_pool(&pooled_config("a")).await.unwrap();
    assert_eq!(driver.connects(), 3);
}

#[tokio::test]
async fn test_pool_bounds_leased_connections() {
    let driver = ScriptedDriver::affected();
    let manager = PoolManager::new(driver.arc());
    let mut config = pooled_config("bounded");
    config.options.max_size = Some(1);

    let pool = manager.get_pool(&config).await.unwrap();
    let lease = pool.acquire().await.unwrap();

    let waiting = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(waiting.is_err(), "second lease should wait for the first");

    pool.release(lease).await;
    let again = pool.acquire().await.unwrap();
    pool.release(again).await;
    assert_eq!(driver.connects(), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn test_session_ids_increase() {
    let manager = PoolManager::new(ScriptedDriver::affected().arc());
    let first = manager.next_session_id();
    let second = manager.next_session_id();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
}
