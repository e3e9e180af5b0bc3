//! End-to-end gateway flows
//!
//! Whole-lifecycle scenarios over scripted backends: boot, warm-up,
//! mixed eager/lazy dispatch, policy changes mid-flight, health
//! reporting, shutdown.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use syntropy_core::{GatewayError, HealthMode, OverallStatus};
use syntropy_gateway::pool::ConnectionState;
use tests::{eager_server, lazy_server, BackendScript, GatewayTestHarness};

#[tokio::test]
async fn full_lifecycle_with_mixed_load_policies() {
    let mut critical = eager_server("serena");
    critical.critical = true;

    let harness = GatewayTestHarness::new(vec![
        critical,
        eager_server("context"),
        lazy_server("scratch"),
    ])
    .await;
    harness.script(
        "serena",
        BackendScript::default().with_tool_result("find_symbol", json!({"symbol": "main"})),
    );

    assert_eq!(harness.gateway.registry().len(), 3);

    // Boot: both eager backends come up, the lazy one stays cold.
    let report = harness.gateway.warm_eager().await;
    assert_eq!(report.ready.len(), 2);
    assert!(report.failed.is_empty());

    let pool = harness.gateway.pool();
    assert_eq!(pool.get("serena").unwrap().state(), ConnectionState::Ready);
    assert_eq!(pool.get("context").unwrap().state(), ConnectionState::Ready);
    assert_eq!(
        pool.get("scratch").unwrap().state(),
        ConnectionState::Uninitialized
    );

    // Dispatch to a warm backend.
    let output = harness
        .gateway
        .call_tool("mcp__syntropy__serena_find_symbol", Some(json!({"q": "main"})))
        .await
        .unwrap();
    assert_eq!(output.content, vec![json!({"symbol": "main"})]);

    // Dispatch to the lazy backend spawns it on demand.
    harness
        .gateway
        .call_tool(&harness.tool_name("scratch", "note"), None)
        .await
        .unwrap();
    assert_eq!(
        pool.get("scratch").unwrap().state(),
        ConnectionState::Ready
    );
    assert_eq!(harness.connector.spawn_count("scratch"), 1);

    // Quick health covers the critical backend only.
    let health = harness.gateway.health_check(HealthMode::Quick, None).await;
    assert_eq!(health.backends.len(), 1);
    assert_eq!(health.backends[0].alias, "serena");
    assert_eq!(health.overall_status, OverallStatus::Healthy);

    // Disable a tool mid-flight; the backend stays up but the call is
    // rejected at the gate.
    harness
        .gateway
        .set_tool_policy(&[], &["find_symbol".to_string()])
        .await
        .unwrap();
    let rejected = harness
        .gateway
        .call_tool("mcp__syntropy__serena_find_symbol", None)
        .await;
    assert!(matches!(rejected, Err(GatewayError::ToolDisabled { .. })));
    assert_eq!(pool.get("serena").unwrap().state(), ConnectionState::Ready);

    // Shutdown tears every live backend down.
    harness.gateway.shutdown().await;
    for alias in ["serena", "context", "scratch"] {
        assert!(harness.connector.client(alias).unwrap().is_closed());
    }
}

#[tokio::test]
async fn degraded_backend_keeps_serving_and_recovers() {
    let harness = GatewayTestHarness::new(vec![eager_server("flaky")]).await;
    harness.gateway.warm_eager().await;

    let client = harness.connector.client("flaky").unwrap();
    client.fail_next_calls(3);

    let name = harness.tool_name("flaky", "work");
    for _ in 0..3 {
        let _ = harness.gateway.call_tool(&name, None).await;
    }

    let connection = harness.gateway.pool().get("flaky").unwrap();
    assert_eq!(connection.state(), ConnectionState::Degraded);

    // Calls still flow while degraded; no restart happens.
    harness.gateway.call_tool(&name, None).await.unwrap();
    assert_eq!(harness.connector.spawn_count("flaky"), 1);

    // After the cool-down a success promotes the connection back.
    tokio::time::sleep(Duration::from_millis(120)).await;
    harness.gateway.call_tool(&name, None).await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn one_bad_backend_never_blocks_the_rest() {
    let harness = GatewayTestHarness::new(vec![
        eager_server("good"),
        eager_server("bad"),
    ])
    .await;
    harness.script(
        "bad",
        BackendScript::default()
            .with_connect_delay(Duration::from_millis(50))
            .with_connect_failures(9),
    );

    let report = harness.gateway.warm_eager().await;
    assert_eq!(report.ready, vec!["good"]);
    assert_eq!(report.failed[0].0, "bad");

    // Routing to the healthy backend is unaffected.
    harness
        .gateway
        .call_tool(&harness.tool_name("good", "echo"), None)
        .await
        .unwrap();

    // Routing to the broken one fails fast with the spawn cause, and
    // the health report pins the blame.
    let result = harness
        .gateway
        .call_tool(&harness.tool_name("bad", "echo"), None)
        .await;
    assert!(matches!(
        result,
        Err(GatewayError::BackendUnavailable { .. })
    ));

    let health = harness.gateway.health_check(HealthMode::Full, None).await;
    assert_eq!(health.overall_status, OverallStatus::Critical);
    assert_eq!(health.overall_status.exit_code(), 2);
    let good = health.backends.iter().find(|b| b.alias == "good").unwrap();
    assert_eq!(good.status, syntropy_core::HealthStatus::Healthy);
}
