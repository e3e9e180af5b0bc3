//! Gateway composition root
//!
//! Owns the registry, connection pool, tool policy, router, and
//! health monitor, and exposes the three external surfaces: the
//! inbound call surface (`call_tool`), the health query surface
//! (`health_check`), and the policy surface (`set_tool_policy` /
//! `is_tool_enabled`). All shared state lives here - no ambient
//! globals.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use syntropy_core::{
    GatewayError, HealthMode, HealthReport, ServerRegistry, ToolStateManager,
};

use crate::health::HealthMonitor;
use crate::pool::{BackendConnector, ConnectionPool, StdioConnector, ToolOutput, WarmupReport};
use crate::router::{ToolCallRequest, ToolRouter};
use crate::settings::GatewaySettings;

/// The tool aggregation gateway.
pub struct Gateway {
    registry: Arc<ServerRegistry>,
    pool: Arc<ConnectionPool>,
    policy: Arc<ToolStateManager>,
    router: ToolRouter,
    health: HealthMonitor,
    settings: Arc<GatewaySettings>,
}

impl Gateway {
    /// Load configuration and assemble a production gateway with the
    /// stdio connector. Registry errors are fatal; a missing or
    /// corrupt policy file degrades to default-allow-all.
    pub async fn bootstrap(
        config_path: &Path,
        policy_path: Option<PathBuf>,
        settings: GatewaySettings,
    ) -> Result<Self, GatewayError> {
        let (registry, config) = ServerRegistry::load(config_path)?;

        let mut settings = settings;
        if let Some(namespace) = config.namespace {
            settings.namespace = namespace;
        }

        let policy_path = policy_path.unwrap_or_else(ToolStateManager::default_path);
        let policy = Arc::new(ToolStateManager::load(policy_path).await);

        Ok(Self::assemble(
            Arc::new(registry),
            Arc::new(StdioConnector::new()),
            policy,
            settings,
        ))
    }

    /// Wire the components around an explicit connector. This is the
    /// seam tests use to substitute scripted backends.
    pub fn assemble(
        registry: Arc<ServerRegistry>,
        connector: Arc<dyn BackendConnector>,
        policy: Arc<ToolStateManager>,
        settings: GatewaySettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let pool = Arc::new(ConnectionPool::new(
            &registry,
            connector,
            settings.clone(),
        ));
        let router = ToolRouter::new(
            registry.clone(),
            pool.clone(),
            policy.clone(),
            settings.namespace.clone(),
        );
        let health = HealthMonitor::new(registry.clone(), pool.clone(), settings.clone());

        info!(
            servers = registry.len(),
            namespace = %settings.namespace,
            "Gateway assembled"
        );

        Self {
            registry,
            pool,
            policy,
            router,
            health,
            settings,
        }
    }

    /// Pre-spawn all Eager backends. Individual failures are recorded
    /// and surfaced later; they never block readiness.
    pub async fn warm_eager(&self) -> WarmupReport {
        self.pool.warm_eager().await
    }

    /// Inbound call surface: dispatch a namespaced tool call under
    /// the default call timeout.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<ToolOutput, GatewayError> {
        self.call_tool_with_timeout(name, arguments, self.settings.call_timeout)
            .await
    }

    /// Inbound call surface with an explicit deadline budget.
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Option<Value>,
        budget: Duration,
    ) -> Result<ToolOutput, GatewayError> {
        self.router
            .dispatch(ToolCallRequest::new(name, arguments, budget))
            .await
    }

    /// Health query surface.
    pub async fn health_check(
        &self,
        mode: HealthMode,
        budget: Option<Duration>,
    ) -> HealthReport {
        self.health.check(mode, budget).await
    }

    /// Policy surface: apply an enable/disable batch and persist it.
    pub async fn set_tool_policy(
        &self,
        enable: &[String],
        disable: &[String],
    ) -> anyhow::Result<()> {
        self.policy.set_policy(enable, disable).await
    }

    /// Policy surface: whether a tool is currently allowed.
    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        self.policy.is_enabled(tool)
    }

    /// Cancel pending waits, close every transport, terminate all
    /// backend processes. Idempotent.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn policy(&self) -> &Arc<ToolStateManager> {
        &self.policy
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }
}
