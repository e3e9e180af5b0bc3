//! Core entities shared across the gateway.

mod health;
mod server;

pub use health::{
    BackendHealth, HealthMode, HealthReport, HealthStatus, LatencySummary, OverallStatus,
};
pub use server::{LoadPolicy, ServerDescriptor};
