//! Gateway tuning knobs
//!
//! All timeouts and thresholds in one place so embedding applications
//! (and tests) can override them without touching component code.

use std::time::Duration;

/// Tunable gateway behavior. `Default` gives production values.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Namespace prefix the router strips from inbound call names
    /// (e.g. `mcp__syntropy` for `mcp__syntropy__serena_find_symbol`).
    /// Overridden by the config file's `namespace` field when set.
    pub namespace: String,
    /// Per-backend spawn + handshake budget.
    pub startup_timeout: Duration,
    /// Default hard deadline for a routed tool call.
    pub call_timeout: Duration,
    /// Consecutive call failures before a Ready connection is marked
    /// Degraded.
    pub breaker_threshold: u32,
    /// How long a connection stays Degraded before a successful probe
    /// may promote it back to Ready.
    pub degraded_cooldown: Duration,
    /// Maximum in-flight requests per backend; excess callers queue
    /// FIFO.
    pub max_in_flight: usize,
    /// Probe responses faster than this classify Healthy; slower
    /// successes classify Warn.
    pub healthy_under: Duration,
    /// Per-probe budget for quick health checks.
    pub quick_probe_budget: Duration,
    /// Per-probe budget for full health checks.
    pub full_probe_budget: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            namespace: "mcp__syntropy".to_string(),
            startup_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
            breaker_threshold: 5,
            degraded_cooldown: Duration::from_secs(30),
            max_in_flight: 8,
            healthy_under: Duration::from_millis(1000),
            quick_probe_budget: Duration::from_millis(3000),
            full_probe_budget: Duration::from_millis(5000),
        }
    }
}
