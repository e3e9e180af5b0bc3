//! Connection pool: backend lifecycle and transports.

mod connection;
mod service;
mod transport;

pub use connection::{BackendConnection, ConnectionState, ConnectionStats};
pub use service::{ConnectionPool, WarmupReport};
pub use transport::{BackendClient, BackendConnector, StdioConnector, ToolOutput};
