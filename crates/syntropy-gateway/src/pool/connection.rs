//! Backend connection lifecycle
//!
//! One `BackendConnection` per registered backend, owned exclusively
//! by the pool. Tracks the state machine, call statistics, the
//! circuit breaker, and the per-backend in-flight limit.
//!
//! State transitions:
//! - Uninitialized -> Starting -> Ready on successful handshake
//! - Starting -> Failed on spawn/handshake error
//! - Ready -> Degraded after `breaker_threshold` consecutive failures
//! - Degraded -> Ready on a successful call/probe once the cool-down
//!   has elapsed (never promoted silently)
//! - any -> Closed on gateway shutdown

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use syntropy_core::{GatewayError, LatencySummary, ServerDescriptor};

use super::transport::{BackendClient, ToolOutput};

/// Recent latency samples kept per connection.
const LATENCY_WINDOW: usize = 100;

/// Lifecycle state of one backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never spawned.
    Uninitialized,
    /// Spawn + handshake in flight (shared init future published).
    Starting,
    /// Live and accepting calls.
    Ready,
    /// Circuit breaker tripped; calls are still attempted.
    Degraded,
    /// Spawn or handshake failed; next acquire retries.
    Failed,
    /// Gateway shut down.
    Closed,
}

/// Statistics snapshot for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub call_count: u64,
    pub cumulative_latency_ms: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub recent_latencies_ms: VecDeque<u64>,
    degraded_since: Option<Instant>,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self {
            state: ConnectionState::Uninitialized,
            call_count: 0,
            cumulative_latency_ms: 0,
            consecutive_failures: 0,
            last_error: None,
            last_success_at: None,
            recent_latencies_ms: VecDeque::with_capacity(LATENCY_WINDOW),
            degraded_since: None,
        }
    }
}

enum BackendOp {
    Tool {
        name: String,
        arguments: Option<Value>,
    },
    Ping,
}

impl BackendOp {
    fn name(&self) -> &str {
        match self {
            Self::Tool { name, .. } => name,
            Self::Ping => "tools/list",
        }
    }
}

/// One managed backend: its process transport, statistics, and
/// lifecycle state.
pub struct BackendConnection {
    descriptor: ServerDescriptor,
    stats: RwLock<ConnectionStats>,
    client: RwLock<Option<Arc<dyn BackendClient>>>,
    permits: Arc<Semaphore>,
    breaker_threshold: u32,
    degraded_cooldown: Duration,
}

impl BackendConnection {
    pub(crate) fn new(
        descriptor: ServerDescriptor,
        breaker_threshold: u32,
        degraded_cooldown: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            descriptor,
            stats: RwLock::new(ConnectionStats::default()),
            client: RwLock::new(None),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            breaker_threshold,
            degraded_cooldown,
        }
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub fn alias(&self) -> &str {
        &self.descriptor.alias
    }

    pub fn state(&self) -> ConnectionState {
        self.stats.read().state
    }

    /// Ready or Degraded: calls are attempted in both.
    pub fn is_available(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Ready | ConnectionState::Degraded
        )
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Percentile summary over the recent latency window.
    pub fn latency_summary(&self) -> Option<LatencySummary> {
        let stats = self.stats.read();
        if stats.recent_latencies_ms.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = stats.recent_latencies_ms.iter().copied().collect();
        sorted.sort_unstable();
        let rank = |p: usize| sorted[(sorted.len() - 1) * p / 100];
        Some(LatencySummary {
            p50_ms: rank(50),
            p95_ms: rank(95),
            max_ms: *sorted.last().unwrap_or(&0),
            samples: sorted.len(),
        })
    }

    pub(crate) fn mark_starting(&self) {
        let mut stats = self.stats.write();
        // Closed is terminal.
        if stats.state == ConnectionState::Closed {
            return;
        }
        stats.state = ConnectionState::Starting;
    }

    /// Install the live client. Refused after shutdown so a late
    /// handshake cannot resurrect a closed connection.
    pub(crate) fn mark_ready(&self, client: Arc<dyn BackendClient>) -> bool {
        let mut stats = self.stats.write();
        if stats.state == ConnectionState::Closed {
            return false;
        }
        // Client installed before the state flips so a Ready fast-path
        // reader never observes a missing client. Lock order matches
        // mark_closed (stats, then client).
        *self.client.write() = Some(client);
        stats.state = ConnectionState::Ready;
        stats.consecutive_failures = 0;
        stats.last_error = None;
        stats.degraded_since = None;
        true
    }

    pub(crate) fn mark_failed(&self, error: String) {
        let mut stats = self.stats.write();
        if stats.state == ConnectionState::Closed {
            return;
        }
        stats.state = ConnectionState::Failed;
        stats.last_error = Some(error);
    }

    /// Transition to Closed and hand back the live client (if any)
    /// for transport teardown. Pending queued callers are released
    /// with an error.
    pub(crate) fn mark_closed(&self) -> Option<Arc<dyn BackendClient>> {
        self.stats.write().state = ConnectionState::Closed;
        self.permits.close();
        self.client.write().take()
    }

    /// Record a successful call or probe. Promotes Degraded back to
    /// Ready only once the cool-down has elapsed.
    pub(crate) fn record_success(&self, latency_ms: u64) {
        let mut stats = self.stats.write();
        stats.call_count += 1;
        stats.cumulative_latency_ms += latency_ms;
        stats.consecutive_failures = 0;
        stats.last_success_at = Some(Utc::now());
        if stats.recent_latencies_ms.len() == LATENCY_WINDOW {
            stats.recent_latencies_ms.pop_front();
        }
        stats.recent_latencies_ms.push_back(latency_ms);

        if stats.state == ConnectionState::Degraded {
            let cooled = stats
                .degraded_since
                .map(|since| since.elapsed() >= self.degraded_cooldown)
                .unwrap_or(true);
            if cooled {
                debug!(server = %self.descriptor.alias, "Circuit breaker reset; connection Ready");
                stats.state = ConnectionState::Ready;
                stats.degraded_since = None;
            }
        }
    }

    /// Record a failed call or probe and trip the breaker at the
    /// configured threshold.
    pub(crate) fn record_failure(&self, error: &str) {
        let mut stats = self.stats.write();
        stats.call_count += 1;
        stats.consecutive_failures += 1;
        stats.last_error = Some(error.to_string());

        if stats.state == ConnectionState::Ready
            && stats.consecutive_failures >= self.breaker_threshold
        {
            warn!(
                server = %self.descriptor.alias,
                failures = stats.consecutive_failures,
                "Circuit breaker tripped; connection Degraded"
            );
            stats.state = ConnectionState::Degraded;
            stats.degraded_since = Some(Instant::now());
        }
    }

    /// Forward a tool call with a hard deadline. Latency and outcome
    /// are recorded regardless of how the call ends.
    pub async fn call(
        self: &Arc<Self>,
        tool: &str,
        arguments: Option<Value>,
        deadline: tokio::time::Instant,
    ) -> Result<ToolOutput, GatewayError> {
        self.forward(
            BackendOp::Tool {
                name: tool.to_string(),
                arguments,
            },
            deadline,
        )
        .await
    }

    /// Health probe: the configured representative tool when declared,
    /// otherwise a protocol-level tools/list ping. Returns the probe
    /// latency in milliseconds.
    pub async fn probe(
        self: &Arc<Self>,
        deadline: tokio::time::Instant,
    ) -> Result<u64, GatewayError> {
        let op = match self.descriptor.probe_tool.clone() {
            Some(name) => BackendOp::Tool {
                name,
                arguments: None,
            },
            None => BackendOp::Ping,
        };
        let started = Instant::now();
        self.forward(op, deadline).await?;
        Ok(started.elapsed().as_millis() as u64)
    }

    async fn forward(
        self: &Arc<Self>,
        op: BackendOp,
        deadline: tokio::time::Instant,
    ) -> Result<ToolOutput, GatewayError> {
        let alias = self.descriptor.alias.clone();
        let op_name = op.name().to_string();
        let budget_ms = deadline
            .saturating_duration_since(tokio::time::Instant::now())
            .as_millis() as u64;

        let client = self.client.read().clone().ok_or_else(|| {
            GatewayError::BackendUnavailable {
                alias: alias.clone(),
                cause: "no live client".to_string(),
            }
        })?;

        // The forwarded request runs on its own task: a deadline
        // expiry abandons the caller-visible wait without cancelling
        // the in-flight request, and the late outcome is still
        // recorded into stats when the backend eventually answers.
        let conn = Arc::clone(self);
        let task = tokio::spawn(async move {
            // FIFO queue behind the per-backend in-flight limit.
            let _permit = conn
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| "connection closed".to_string())?;

            let started = Instant::now();
            let result = match op {
                BackendOp::Tool { name, arguments } => client.call_tool(&name, arguments).await,
                BackendOp::Ping => client.ping().await.map(|_| ToolOutput::default()),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    conn.record_success(latency_ms);
                    Ok(output)
                }
                Err(e) => {
                    let cause = format!("{e:#}");
                    conn.record_failure(&cause);
                    Err(cause)
                }
            }
        });

        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(cause))) => Err(GatewayError::Protocol {
                alias,
                tool: op_name,
                cause,
            }),
            Ok(Err(join_err)) => Err(GatewayError::Protocol {
                alias,
                tool: op_name,
                cause: format!("dispatch task failed: {join_err}"),
            }),
            Err(_) => {
                // A single timeout increments the failure count but
                // never tears the connection down.
                self.record_failure("call timed out");
                Err(GatewayError::Timeout {
                    alias,
                    tool: op_name,
                    budget_ms,
                })
            }
        }
    }
}
