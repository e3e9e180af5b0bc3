//! Backend server descriptors
//!
//! A `ServerDescriptor` is the immutable, startup-loaded description
//! of one aggregated backend. The gateway never mutates descriptors;
//! changing them requires a restart.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Startup policy for a backend process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Spawn at gateway boot, during `warm_eager`.
    Eager,
    /// Spawn on first routed call (or first health probe).
    Lazy,
}

/// Immutable description of one aggregated backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Externally-visible short name (e.g. `serena`). Unique.
    pub alias: String,
    /// Internal key (e.g. `syn-serena`). Unique. This mapping is
    /// configuration data - when the config omits it, the alias is
    /// used as-is.
    pub internal_key: String,
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the child process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Eager vs. lazy startup.
    pub load_policy: LoadPolicy,
    /// Whether this backend is probed by quick health checks.
    #[serde(default)]
    pub critical: bool,
    /// Representative tool used as the health probe. When absent the
    /// probe falls back to a protocol-level tools/list ping.
    #[serde(default)]
    pub probe_tool: Option<String>,
}

impl ServerDescriptor {
    pub fn is_eager(&self) -> bool {
        self.load_policy == LoadPolicy::Eager
    }
}
