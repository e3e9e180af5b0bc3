//! Health report types
//!
//! Reports are ephemeral - built per health-check invocation, never
//! persisted. Serialized shape is the gateway's external JSON health
//! surface, hence the camelCase renames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which probe set a health check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthMode {
    /// Critical backends only, tight per-probe budget.
    Quick,
    /// Every registered backend, plus latency history and last error.
    Full,
}

/// Per-backend classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warn,
    Failed,
}

/// Aggregate classification across all probed backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Zero warn, zero failed.
    Healthy,
    /// At least one warn, zero failed.
    Degraded,
    /// At least one failed.
    Critical,
}

impl OverallStatus {
    /// Process exit code for the CLI wrapper: 0 / 1 / 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Critical => 2,
        }
    }
}

/// Recent latency percentiles from a connection's sample window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
    pub samples: usize,
}

/// One probed backend's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHealth {
    pub alias: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    /// Error from this probe, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last error recorded in the connection's stats (full mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Last successful call (full mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    /// Recent latency percentiles (full mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencySummary>,
}

/// The full result of one `check()` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub mode: HealthMode,
    pub backends: Vec<BackendHealth>,
    pub healthy_count: usize,
    pub warn_count: usize,
    pub failed_count: usize,
    pub overall_status: OverallStatus,
}

impl HealthReport {
    /// Roll up per-backend results into an aggregate report.
    pub fn summarize(mode: HealthMode, backends: Vec<BackendHealth>) -> Self {
        let healthy_count = backends
            .iter()
            .filter(|b| b.status == HealthStatus::Healthy)
            .count();
        let warn_count = backends
            .iter()
            .filter(|b| b.status == HealthStatus::Warn)
            .count();
        let failed_count = backends
            .iter()
            .filter(|b| b.status == HealthStatus::Failed)
            .count();

        let overall_status = if failed_count > 0 {
            OverallStatus::Critical
        } else if warn_count > 0 {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        };

        Self {
            mode,
            backends,
            healthy_count,
            warn_count,
            failed_count,
            overall_status,
        }
    }
}
