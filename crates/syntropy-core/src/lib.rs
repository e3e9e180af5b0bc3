//! # Syntropy Core Library
//!
//! Domain types and startup-loaded state for the Syntropy tool
//! aggregation gateway.
//!
//! ## Modules
//!
//! - `domain` - Core entities (ServerDescriptor, health report types)
//! - `error` - The gateway error taxonomy
//! - `registry` - Backend server catalog loaded from configuration
//! - `policy` - Persisted tool enable/disable overlay

pub mod domain;
pub mod error;
pub mod policy;
pub mod registry;

// Re-export commonly used types
pub use domain::*;
pub use error::GatewayError;
pub use policy::{ToolPolicyState, ToolStateManager};
pub use registry::{GatewayConfigFile, ServerRegistry};
