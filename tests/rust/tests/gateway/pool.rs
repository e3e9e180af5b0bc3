//! Connection pool tests
//!
//! Covers single-flight spawning, warm-up failure isolation, the
//! circuit breaker, and shutdown semantics.

use std::time::Duration;

use pretty_assertions::assert_eq;
use syntropy_core::GatewayError;
use syntropy_gateway::pool::ConnectionState;
use tests::{eager_server, lazy_server, BackendScript, GatewayTestHarness};

// ============================================================================
// Single-flight spawning
// ============================================================================

#[tokio::test]
async fn concurrent_acquires_spawn_one_process() {
    let harness = GatewayTestHarness::new(vec![lazy_server("alpha")]).await;
    harness.script(
        "alpha",
        BackendScript::default().with_connect_delay(Duration::from_millis(50)),
    );

    let pool = harness.gateway.pool().clone();
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("alpha").await })
        })
        .collect();

    for handle in handles {
        let connection = handle.await.unwrap().unwrap();
        assert_eq!(connection.alias(), "alpha");
        assert_eq!(connection.state(), ConnectionState::Ready);
    }

    assert_eq!(harness.connector.spawn_count("alpha"), 1);
}

#[tokio::test]
async fn failed_init_is_shared_then_retried() {
    let harness = GatewayTestHarness::new(vec![lazy_server("alpha")]).await;
    harness.script(
        "alpha",
        BackendScript::default()
            .with_connect_delay(Duration::from_millis(30))
            .with_connect_failures(1),
    );

    let pool = harness.gateway.pool().clone();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("alpha").await })
        })
        .collect();

    // Every concurrent waiter sees the same failure from one attempt.
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(GatewayError::BackendUnavailable { .. })
        ));
    }
    assert_eq!(harness.connector.spawn_count("alpha"), 1);

    // A later acquire starts a fresh attempt, which succeeds.
    let connection = pool.acquire("alpha").await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Ready);
    assert_eq!(harness.connector.spawn_count("alpha"), 2);
}

#[tokio::test]
async fn acquire_unknown_alias_is_rejected() {
    let harness = GatewayTestHarness::new(vec![lazy_server("alpha")]).await;

    let result = harness.gateway.pool().acquire("ghost").await;
    assert!(matches!(result, Err(GatewayError::UnknownServer { .. })));
}

// ============================================================================
// Warm-up
// ============================================================================

#[tokio::test]
async fn warm_eager_spawns_eager_only() {
    let harness = GatewayTestHarness::new(vec![
        eager_server("alpha"),
        eager_server("beta"),
        lazy_server("gamma"),
    ])
    .await;

    let report = harness.gateway.warm_eager().await;

    let mut ready = report.ready.clone();
    ready.sort();
    assert_eq!(ready, vec!["alpha", "beta"]);
    assert!(report.failed.is_empty());

    let pool = harness.gateway.pool();
    assert_eq!(pool.get("gamma").unwrap().state(), ConnectionState::Uninitialized);
    assert_eq!(harness.connector.spawn_count("gamma"), 0);
}

#[tokio::test]
async fn warm_eager_isolates_failures() {
    let harness =
        GatewayTestHarness::new(vec![eager_server("alpha"), eager_server("beta")]).await;
    harness.script("beta", BackendScript::default().with_connect_failures(9));

    let report = harness.gateway.warm_eager().await;

    assert_eq!(report.ready, vec!["alpha"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "beta");

    let pool = harness.gateway.pool();
    assert_eq!(pool.get("alpha").unwrap().state(), ConnectionState::Ready);
    assert_eq!(pool.get("beta").unwrap().state(), ConnectionState::Failed);
}

// ============================================================================
// Circuit breaker
// ============================================================================

#[tokio::test]
async fn breaker_trips_after_consecutive_failures() {
    // breaker_threshold is 3 in test settings
    let harness = GatewayTestHarness::new(vec![eager_server("alpha")]).await;
    harness.gateway.warm_eager().await;

    let client = harness.connector.client("alpha").unwrap();
    client.fail_next_calls(3);

    let connection = harness.gateway.pool().get("alpha").unwrap();
    for _ in 0..3 {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let result = connection.call("echo", None, deadline).await;
        assert!(matches!(result, Err(GatewayError::Protocol { .. })));
    }

    assert_eq!(connection.state(), ConnectionState::Degraded);
    assert_eq!(connection.stats().consecutive_failures, 3);
}

#[tokio::test]
async fn breaker_recovers_after_cooldown() {
    // degraded_cooldown is 100ms in test settings
    let harness = GatewayTestHarness::new(vec![eager_server("alpha")]).await;
    harness.gateway.warm_eager().await;

    let client = harness.connector.client("alpha").unwrap();
    client.fail_next_calls(3);

    let connection = harness.gateway.pool().get("alpha").unwrap();
    for _ in 0..3 {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let _ = connection.call("echo", None, deadline).await;
    }
    assert_eq!(connection.state(), ConnectionState::Degraded);

    // A success before the cooldown elapses does not promote.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    connection.call("echo", None, deadline).await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Degraded);

    tokio::time::sleep(Duration::from_millis(120)).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    connection.call("echo", None, deadline).await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Ready);
    assert_eq!(connection.stats().consecutive_failures, 0);
}

// ============================================================================
// Concurrency limit
// ============================================================================

#[tokio::test]
async fn in_flight_calls_are_capped_per_backend() {
    // max_in_flight is 4 in test settings
    let harness = GatewayTestHarness::new(vec![eager_server("alpha")]).await;
    harness.script(
        "alpha",
        BackendScript::default().with_call_delay(Duration::from_millis(40)),
    );
    harness.gateway.warm_eager().await;

    let connection = harness.gateway.pool().get("alpha").unwrap();
    let handles: Vec<_> = (0..12)
        .map(|_| {
            let connection = connection.clone();
            tokio::spawn(async move {
                let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
                connection.call("echo", None, deadline).await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let client = harness.connector.client("alpha").unwrap();
    assert!(client.max_in_flight() <= 4, "saw {}", client.max_in_flight());
    assert_eq!(client.call_log().len(), 12);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn shutdown_closes_clients_and_is_idempotent() {
    let harness =
        GatewayTestHarness::new(vec![eager_server("alpha"), eager_server("beta")]).await;
    harness.gateway.warm_eager().await;

    harness.gateway.shutdown().await;
    harness.gateway.shutdown().await;

    for alias in ["alpha", "beta"] {
        assert!(harness.connector.client(alias).unwrap().is_closed());
    }
    for connection in harness.gateway.pool().connections() {
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(!connection.is_available());
    }
}

#[tokio::test]
async fn acquire_after_shutdown_is_rejected() {
    let harness = GatewayTestHarness::new(vec![lazy_server("alpha")]).await;
    harness.gateway.shutdown().await;

    let result = harness.gateway.pool().acquire("alpha").await;
    assert!(matches!(
        result,
        Err(GatewayError::BackendUnavailable { .. })
    ));
    assert_eq!(harness.connector.spawn_count("alpha"), 0);
}
