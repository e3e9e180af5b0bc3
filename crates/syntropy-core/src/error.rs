//! Gateway error taxonomy
//!
//! Every backend-facing variant carries enough context (alias, tool,
//! underlying cause) for a human to act on. Nothing is collapsed into
//! a generic failure message.

use thiserror::Error;

/// Errors surfaced by the gateway to callers.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No registered backend alias matches the call name prefix.
    /// Permanent - a caller error.
    #[error("unknown server: no registered alias matches '{raw_name}'")]
    UnknownServer { raw_name: String },

    /// The tool is rejected by the persisted enable/disable policy.
    /// Permanent until the policy changes.
    #[error("tool '{tool}' is disabled by policy")]
    ToolDisabled { tool: String },

    /// Spawn or handshake failure. Recoverable - the next acquire
    /// retries.
    #[error("backend '{alias}' unavailable: {cause}")]
    BackendUnavailable { alias: String, cause: String },

    /// The call exceeded its deadline. Recoverable - does not imply
    /// backend death.
    #[error("call to '{alias}/{tool}' timed out after {budget_ms}ms")]
    Timeout {
        alias: String,
        tool: String,
        budget_ms: u64,
    },

    /// Malformed or failed response from a live backend. Recoverable,
    /// counted toward the circuit breaker.
    #[error("backend '{alias}' protocol error on '{tool}': {cause}")]
    Protocol {
        alias: String,
        tool: String,
        cause: String,
    },

    /// Malformed gateway configuration. The only fatal-on-load error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Short machine-readable kind, used in structured logs and the
    /// CLI error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownServer { .. } => "unknown_server",
            Self::ToolDisabled { .. } => "tool_disabled",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Protocol { .. } => "backend_protocol_error",
            Self::Config(_) => "config",
        }
    }
}
