//! Backend transport seam
//!
//! The pool talks to backends through the `BackendConnector` /
//! `BackendClient` traits. Production uses the stdio child-process
//! connector; tests substitute scripted in-memory implementations.

mod stdio;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use syntropy_core::ServerDescriptor;

pub use stdio::StdioConnector;

/// Result of one forwarded tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Content blocks as returned by the backend.
    pub content: Vec<Value>,
    /// Whether the backend flagged the result as a tool-level error.
    pub is_error: bool,
}

/// A live, handshaken connection to one backend process.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Forward a tool call. The caller applies the deadline.
    async fn call_tool(&self, tool: &str, arguments: Option<Value>) -> Result<ToolOutput>;

    /// Cheap protocol-level liveness check (tools/list round trip).
    async fn ping(&self) -> Result<()>;

    /// Close the transport and terminate the backend process.
    /// Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Spawns and handshakes backend processes.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Spawn the process described by `descriptor` and complete the
    /// protocol handshake. The pool applies the startup timeout.
    async fn connect(&self, descriptor: &ServerDescriptor) -> Result<Arc<dyn BackendClient>>;
}
