//! # Syntropy Gateway
//!
//! Exposes a single unified tool namespace backed by a pool of
//! independently-spawned MCP backend processes.
//!
//! ## Modules
//!
//! - `pool` - Connection pool, backend lifecycle, stdio transport
//! - `router` - Namespaced tool-call parsing and dispatch
//! - `health` - Quick/full diagnostic probes
//! - `gateway` - Composition root owning all shared state
//! - `settings` - Tunable timeouts and thresholds
//! - `logging` - Tracing subscriber setup for binaries

pub mod gateway;
pub mod health;
pub mod logging;
pub mod pool;
pub mod router;
pub mod settings;

pub use gateway::Gateway;
pub use health::HealthMonitor;
pub use pool::{
    BackendClient, BackendConnection, BackendConnector, ConnectionPool, ConnectionState,
    StdioConnector, ToolOutput, WarmupReport,
};
pub use router::{ToolCallRequest, ToolRouter};
pub use settings::GatewaySettings;
