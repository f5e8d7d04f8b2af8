mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Host, descriptor, mock};
use rfile::config::PoolConfig;
use rfile::error::ErrorKind;
use rfile::session::ConnectionPool;

#[tokio::test]
async fn sudo_and_timeout_share_a_connection() {
    let host = Host::new();
    let pool = ConnectionPool::with_connector(mock(&host));

    let plain = descriptor();
    let elevated = descriptor()
        .with_sudo(true)
        .with_timeout(Duration::from_secs(5));
    assert_eq!(plain.identity(), elevated.identity());

    let first = pool.acquire(&plain).await.expect("acquire plain");
    let second = pool.acquire(&elevated).await.expect("acquire elevated");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(host.connects(), 1);
    assert_eq!(pool.reference_count(&plain).await, 2);

    pool.release(&elevated).await.expect("release elevated");
    pool.release(&plain).await.expect("release plain");
    assert_eq!(host.closes(), 1);
}

#[tokio::test]
async fn different_credentials_get_their_own_connection() {
    let host = Host::new();
    let pool = ConnectionPool::with_connector(mock(&host));

    let first = descriptor();
    let second = descriptor().with_password("other");
    assert_ne!(first.identity(), second.identity());

    let a = pool.acquire(&first).await.expect("acquire first");
    let b = pool.acquire(&second).await.expect("acquire second");

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(host.connects(), 2);
    assert_eq!(pool.len().await, 2);
}

#[tokio::test]
async fn last_release_closes_exactly_once() {
    let host = Host::new();
    host.set_connect_delay(Duration::from_millis(20));
    let pool = Arc::new(
        ConnectionPool::with_config(mock(&host), PoolConfig::with_max_sessions(8))
            .expect("valid config"),
    );
    let target = descriptor();

    let acquires: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let target = target.clone();
            tokio::spawn(async move { pool.acquire(&target).await.map(|_| ()) })
        })
        .collect();
    for handle in acquires {
        handle.await.expect("join").expect("acquire");
    }

    assert_eq!(host.connects(), 1);
    assert_eq!(pool.reference_count(&target).await, 8);

    let releases: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let target = target.clone();
            tokio::spawn(async move { pool.release(&target).await })
        })
        .collect();
    for handle in releases {
        handle.await.expect("join").expect("release");
    }

    assert_eq!(host.closes(), 1);
    assert!(!pool.is_connected(&target).await);
    assert!(pool.is_empty().await);
}

#[tokio::test]
async fn acquire_beyond_limit_waits_for_release() {
    let host = Host::new();
    let pool = Arc::new(
        ConnectionPool::with_config(mock(&host), PoolConfig::with_max_sessions(2))
            .expect("valid config"),
    );
    let target = descriptor();

    pool.acquire(&target).await.expect("first");
    pool.acquire(&target).await.expect("second");

    let waiter = {
        let pool = pool.clone();
        let target = target.clone();
        tokio::spawn(async move { pool.acquire(&target).await.map(|_| ()) })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert_eq!(pool.reference_count(&target).await, 2);

    pool.release(&target).await.expect("release");
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter admitted after release")
        .expect("join")
        .expect("acquire");

    assert_eq!(pool.reference_count(&target).await, 2);
    assert_eq!(host.connects(), 1);
    assert_eq!(host.closes(), 0);
}

#[tokio::test]
async fn default_limit_is_three() {
    let host = Host::new();
    let pool = Arc::new(ConnectionPool::with_connector(mock(&host)));
    assert_eq!(pool.config().max_sessions_per_connection, 3);

    let target = descriptor();
    for _ in 0..3 {
        pool.acquire(&target).await.expect("acquire");
    }

    let fourth = {
        let pool = pool.clone();
        let target = target.clone();
        tokio::spawn(async move { pool.acquire(&target).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fourth.is_finished());

    pool.release(&target).await.expect("release");
    fourth.await.expect("join").expect("fourth acquire");
}

#[tokio::test]
async fn invalid_descriptor_fails_before_dialing() {
    let host = Host::new();
    let pool = ConnectionPool::with_connector(mock(&host));

    let mut missing_host = descriptor();
    missing_host.host = String::new();
    let err = match pool.acquire(&missing_host).await {
        Ok(_) => panic!("empty host should be rejected"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);

    let no_auth = rfile::descriptor::ConnectionDescriptor::new("h", "root");
    let err = match pool.acquire(&no_auth).await {
        Ok(_) => panic!("missing credentials should be rejected"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);

    assert_eq!(host.connects(), 0);
}

#[tokio::test]
async fn zero_session_limit_is_rejected() {
    let host = Host::new();
    let err = ConnectionPool::with_config(mock(&host), PoolConfig::with_max_sessions(0))
        .err()
        .expect("zero limit should be rejected");
    assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
}

#[tokio::test]
async fn dial_failure_is_reported_and_not_cached() {
    let host = Host::new();
    let pool = ConnectionPool::with_connector(mock(&host));
    let target = descriptor();

    host.set_fail_connect(true);
    let err = match pool.acquire(&target).await {
        Ok(_) => panic!("dial should fail"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert!(err.to_string().contains("root@h:22"));
    assert!(err.to_string().contains("authentication failed"));
    assert_eq!(pool.reference_count(&target).await, 0);
    assert!(pool.is_empty().await);

    host.set_fail_connect(false);
    pool.acquire(&target).await.expect("retry succeeds");
    assert_eq!(host.connects(), 1);
    assert_eq!(pool.reference_count(&target).await, 1);
}

#[tokio::test]
async fn release_without_acquire_is_an_invariant_violation() {
    let host = Host::new();
    let pool = ConnectionPool::with_connector(mock(&host));
    let target = descriptor();

    let err = pool
        .release(&target)
        .await
        .expect_err("nothing acquired");
    assert_eq!(err.kind(), ErrorKind::PoolInvariantViolated);

    pool.acquire(&target).await.expect("acquire");
    pool.release(&target).await.expect("matching release");
    let err = pool
        .release(&target)
        .await
        .expect_err("second release has no match");
    assert_eq!(err.kind(), ErrorKind::PoolInvariantViolated);

    assert_eq!(host.closes(), 1);
    assert_eq!(pool.reference_count(&target).await, 0);
}

#[tokio::test]
async fn close_failure_is_reported_and_connection_dropped() {
    let host = Host::new();
    let pool = ConnectionPool::with_connector(mock(&host));
    let target = descriptor();

    pool.acquire(&target).await.expect("acquire");
    host.set_fail_close(true);
    let err = pool
        .release(&target)
        .await
        .expect_err("close should fail");
    assert_eq!(err.kind(), ErrorKind::ConnectionCloseFailed);
    assert!(!pool.is_connected(&target).await);

    host.set_fail_close(false);
    pool.acquire(&target).await.expect("reacquire dials again");
    assert_eq!(host.connects(), 2);
}

#[tokio::test]
async fn session_is_closed_only_after_last_holder() {
    let host = Host::new();
    let pool = ConnectionPool::with_connector(mock(&host));
    let target = descriptor();

    let session = pool.acquire(&target).await.expect("first");
    pool.acquire(&target).await.expect("second");

    pool.release(&target).await.expect("release one");
    assert!(!session.is_closed());
    assert!(pool.is_connected(&target).await);

    pool.release(&target).await.expect("release two");
    assert!(session.is_closed());
    assert!(!pool.is_connected(&target).await);
}

#[tokio::test]
async fn slow_dial_does_not_block_pool_queries() {
    let host = Host::new();
    host.set_connect_delay(Duration::from_secs(5));
    let pool = Arc::new(ConnectionPool::with_connector(mock(&host)));
    let target = descriptor();

    let dialing = {
        let pool = pool.clone();
        let target = target.clone();
        tokio::spawn(async move { pool.acquire(&target).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!dialing.is_finished());

    let quick = Duration::from_millis(100);
    assert_eq!(
        tokio::time::timeout(quick, pool.len()).await.expect("len answers"),
        0
    );
    assert_eq!(
        tokio::time::timeout(quick, pool.reference_count(&target))
            .await
            .expect("reference count answers"),
        0
    );
    assert!(
        !tokio::time::timeout(quick, pool.is_connected(&target))
            .await
            .expect("is_connected answers")
    );

    dialing.abort();
}
