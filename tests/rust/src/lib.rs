//! Shared test utilities and fixtures for Syntropy gateway tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use syntropy_core::{LoadPolicy, ServerDescriptor, ServerRegistry, ToolStateManager};
use syntropy_gateway::{Gateway, GatewaySettings};

pub use mocks::{BackendScript, MockBackendClient, MockConnector};

/// An eager, non-critical backend descriptor with a mock command.
pub fn eager_server(alias: &str) -> ServerDescriptor {
    server(alias, LoadPolicy::Eager)
}

/// A lazy, non-critical backend descriptor with a mock command.
pub fn lazy_server(alias: &str) -> ServerDescriptor {
    server(alias, LoadPolicy::Lazy)
}

fn server(alias: &str, load_policy: LoadPolicy) -> ServerDescriptor {
    ServerDescriptor {
        alias: alias.to_string(),
        internal_key: alias.to_string(),
        command: "mock-backend".to_string(),
        args: Vec::new(),
        env: HashMap::new(),
        load_policy,
        critical: false,
        probe_tool: None,
    }
}

/// Settings tightened for tests: millisecond-scale budgets so breaker
/// and timeout paths run fast.
pub fn test_settings() -> GatewaySettings {
    GatewaySettings {
        startup_timeout: Duration::from_secs(2),
        call_timeout: Duration::from_secs(2),
        breaker_threshold: 3,
        degraded_cooldown: Duration::from_millis(100),
        max_in_flight: 4,
        healthy_under: Duration::from_millis(50),
        quick_probe_budget: Duration::from_secs(1),
        full_probe_budget: Duration::from_secs(1),
        ..GatewaySettings::default()
    }
}

/// A gateway wired to a `MockConnector` with a throwaway policy file.
pub struct GatewayTestHarness {
    pub gateway: Gateway,
    pub connector: Arc<MockConnector>,
    pub policy: Arc<ToolStateManager>,
    _policy_dir: TempDir,
}

impl GatewayTestHarness {
    pub async fn new(descriptors: Vec<ServerDescriptor>) -> Self {
        Self::with_settings(descriptors, test_settings()).await
    }

    pub async fn with_settings(
        descriptors: Vec<ServerDescriptor>,
        settings: GatewaySettings,
    ) -> Self {
        let registry = ServerRegistry::new(descriptors).expect("valid test registry");
        let policy_dir = tempfile::tempdir().expect("temp dir");
        let policy =
            Arc::new(ToolStateManager::load(policy_dir.path().join("tool-policy.json")).await);
        let connector = Arc::new(MockConnector::new());

        let gateway = Gateway::assemble(
            Arc::new(registry),
            connector.clone(),
            policy.clone(),
            settings,
        );

        Self {
            gateway,
            connector,
            policy,
            _policy_dir: policy_dir,
        }
    }

    /// Install the behavior script for one alias.
    pub fn script(&self, alias: &str, script: BackendScript) {
        self.connector.script(alias, script);
    }

    /// Namespace a bare `alias_tool` call name the way clients send it.
    pub fn tool_name(&self, alias: &str, tool: &str) -> String {
        format!("{}__{}_{}", self.gateway.settings().namespace, alias, tool)
    }
}
