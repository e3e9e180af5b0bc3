//! Tool-call routing
//!
//! Parses namespaced call names, enforces the tool policy, resolves
//! the pool connection, and forwards the call under its deadline.
//! Calls to distinct backends never serialize against each other:
//! the router holds no locks across a dispatch.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use syntropy_core::{GatewayError, ServerRegistry, ToolStateManager};

use crate::pool::{ConnectionPool, ToolOutput};

/// One inbound tool call. Created per call, discarded after the
/// response.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// Namespaced name, e.g. `mcp__syntropy__serena_find_symbol`.
    pub raw_name: String,
    /// Opaque arguments forwarded verbatim.
    pub arguments: Option<Value>,
    /// Absolute hard deadline for the whole dispatch.
    pub deadline: Instant,
}

impl ToolCallRequest {
    pub fn new(raw_name: impl Into<String>, arguments: Option<Value>, budget: Duration) -> Self {
        Self {
            raw_name: raw_name.into(),
            arguments,
            deadline: Instant::now() + budget,
        }
    }
}

/// Routes inbound calls to the correct backend connection.
pub struct ToolRouter {
    registry: Arc<ServerRegistry>,
    pool: Arc<ConnectionPool>,
    policy: Arc<ToolStateManager>,
    namespace: String,
}

impl ToolRouter {
    pub fn new(
        registry: Arc<ServerRegistry>,
        pool: Arc<ConnectionPool>,
        policy: Arc<ToolStateManager>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            pool,
            policy,
            namespace: namespace.into(),
        }
    }

    /// Parse a call name into `(alias, tool)`.
    ///
    /// The configured namespace prefix (`<namespace>__`) is stripped
    /// when present; the remainder is matched against the longest
    /// registered alias prefix, which disambiguates aliases that
    /// themselves contain underscores.
    pub fn parse_name(
        registry: &ServerRegistry,
        namespace: &str,
        raw_name: &str,
    ) -> Result<(String, String), GatewayError> {
        let prefix = format!("{namespace}__");
        let rest = raw_name.strip_prefix(&prefix).unwrap_or(raw_name);

        for alias in registry.aliases_longest_first() {
            if rest.len() > alias.len() + 1
                && rest.starts_with(alias)
                && rest.as_bytes()[alias.len()] == b'_'
            {
                return Ok((alias.to_string(), rest[alias.len() + 1..].to_string()));
            }
        }

        Err(GatewayError::UnknownServer {
            raw_name: raw_name.to_string(),
        })
    }

    /// Dispatch one call: parse, authorize, acquire, forward, record.
    pub async fn dispatch(&self, request: ToolCallRequest) -> Result<ToolOutput, GatewayError> {
        let (alias, tool) = Self::parse_name(&self.registry, &self.namespace, &request.raw_name)?;

        if !self.policy.is_enabled(&tool) {
            debug!(server = %alias, tool = %tool, "Rejected by tool policy");
            return Err(GatewayError::ToolDisabled { tool });
        }

        // Spawn/handshake failures surface as BackendUnavailable with
        // the underlying cause - never a fabricated empty result.
        let connection = self.pool.acquire(&alias).await?;

        let started = std::time::Instant::now();
        let result = connection
            .call(&tool, request.arguments, request.deadline)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => {
                debug!(
                    server = %alias,
                    tool = %tool,
                    duration_ms,
                    is_error = output.is_error,
                    "Tool call completed"
                );
            }
            Err(e) => {
                warn!(
                    server = %alias,
                    tool = %tool,
                    duration_ms,
                    kind = e.kind(),
                    error = %e,
                    "Tool call failed"
                );
            }
        }

        result
    }
}
