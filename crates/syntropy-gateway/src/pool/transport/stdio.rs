//! STDIO transport for backend processes
//!
//! Spawns each backend as a child process communicating over
//! stdin/stdout and drives the MCP handshake. The child is killed
//! when the client is dropped or closed.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParams, ClientCapabilities, ClientInfo, Implementation,
};
use rmcp::service::RunningService;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use syntropy_core::ServerDescriptor;

use super::{BackendClient, BackendConnector, ToolOutput};

type McpClient = RunningService<RoleClient, GatewayClientHandler>;

/// Minimal client handler identifying the gateway to backends.
#[derive(Clone, Debug)]
struct GatewayClientHandler {
    info: ClientInfo,
}

impl GatewayClientHandler {
    fn new(alias: &str) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("syntropy-{}", alias),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("Syntropy Gateway".to_string()),
                    ..Default::default()
                },
                meta: None,
            },
        }
    }
}

impl rmcp::ClientHandler for GatewayClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }
}

/// Production connector: spawns child processes over stdio.
#[derive(Debug, Default)]
pub struct StdioConnector;

impl StdioConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendConnector for StdioConnector {
    async fn connect(&self, descriptor: &ServerDescriptor) -> Result<Arc<dyn BackendClient>> {
        let alias = &descriptor.alias;
        info!(
            server = %alias,
            command = %descriptor.command,
            "Spawning backend process"
        );

        // Resolve the command up front so a missing executable fails
        // with an actionable message instead of a raw spawn error.
        let command_path = which::which(&descriptor.command)
            .or_else(|_| which::which(format!("{}.exe", &descriptor.command)))
            .map_err(|_| {
                anyhow!(
                    "command not found: {}. Ensure it's installed and in PATH.",
                    descriptor.command
                )
            })?;

        debug!(server = %alias, path = ?command_path, "Resolved backend command");

        let args = descriptor.args.clone();
        let env = descriptor.env.clone();
        let transport = TokioChildProcess::new(Command::new(&command_path).configure(
            move |cmd| {
                cmd.args(&args)
                    .envs(&env)
                    .stderr(Stdio::null())
                    .kill_on_drop(true);

                // New process group so terminal signals sent to the
                // gateway don't propagate to backend children.
                #[cfg(unix)]
                {
                    cmd.process_group(0);
                }
            },
        ))
        .with_context(|| format!("failed to spawn backend process '{}'", descriptor.command))?;

        let handler = GatewayClientHandler::new(alias);
        let client = handler
            .serve(transport)
            .await
            .context("MCP handshake failed")?;

        info!(server = %alias, "Backend connected");

        Ok(Arc::new(StdioBackendClient::new(alias.clone(), client)))
    }
}

/// A handshaken stdio backend. Calls go through the cloneable peer
/// handle; `close` consumes the running service exactly once.
struct StdioBackendClient {
    alias: String,
    peer: rmcp::service::Peer<RoleClient>,
    service: Mutex<Option<McpClient>>,
}

impl StdioBackendClient {
    fn new(alias: String, client: McpClient) -> Self {
        Self {
            alias,
            peer: client.peer().clone(),
            service: Mutex::new(Some(client)),
        }
    }
}

#[async_trait]
impl BackendClient for StdioBackendClient {
    async fn call_tool(&self, tool: &str, arguments: Option<Value>) -> Result<ToolOutput> {
        let params = CallToolRequestParams {
            name: tool.to_string().into(),
            arguments: arguments.and_then(|v| v.as_object().cloned()),
            task: None,
            meta: None,
        };

        let res = self
            .peer
            .call_tool(params)
            .await
            .map_err(|e| anyhow!("MCP call failed: {}", e))?;

        let content: Vec<Value> = res
            .content
            .into_iter()
            .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
            .collect();

        Ok(ToolOutput {
            content,
            is_error: res.is_error.unwrap_or(false),
        })
    }

    async fn ping(&self) -> Result<()> {
        self.peer
            .list_tools(Default::default())
            .await
            .map_err(|e| anyhow!("MCP tools/list failed: {}", e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let service = self.service.lock().await.take();
        if let Some(service) = service {
            debug!(server = %self.alias, "Closing backend transport");
            service
                .cancel()
                .await
                .map_err(|e| anyhow!("failed to cancel backend service: {}", e))?;
        }
        Ok(())
    }
}
