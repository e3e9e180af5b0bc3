//! Health diagnostics
//!
//! Quick checks probe the configuration-declared critical backends
//! under a 3 s per-probe budget; full checks probe everything under
//! 5 s and add latency history and the last recorded error. All
//! probes within one `check` run concurrently, so the wall-clock
//! bound is the per-probe budget, not the sum.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info};

use syntropy_core::{
    BackendHealth, GatewayError, HealthMode, HealthReport, HealthStatus, ServerDescriptor,
    ServerRegistry,
};

use crate::pool::ConnectionPool;
use crate::settings::GatewaySettings;

/// Classify a successful probe by its response time.
pub(crate) fn classify_success(response_time: Duration, healthy_under: Duration) -> HealthStatus {
    if response_time < healthy_under {
        HealthStatus::Healthy
    } else {
        HealthStatus::Warn
    }
}

/// Runs diagnostic probes against the connection pool.
pub struct HealthMonitor {
    registry: Arc<ServerRegistry>,
    pool: Arc<ConnectionPool>,
    settings: Arc<GatewaySettings>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ServerRegistry>,
        pool: Arc<ConnectionPool>,
        settings: Arc<GatewaySettings>,
    ) -> Self {
        Self {
            registry,
            pool,
            settings,
        }
    }

    /// Probe backends per `mode` and roll the results up. An optional
    /// override replaces the per-probe budget (CLI `timeoutMs`).
    pub async fn check(&self, mode: HealthMode, budget: Option<Duration>) -> HealthReport {
        let budget = budget.unwrap_or(match mode {
            HealthMode::Quick => self.settings.quick_probe_budget,
            HealthMode::Full => self.settings.full_probe_budget,
        });

        let targets: Vec<&ServerDescriptor> = self
            .registry
            .list_all()
            .iter()
            .filter(|d| mode == HealthMode::Full || d.critical)
            .collect();

        debug!(?mode, targets = targets.len(), "Running health check");

        let backends = join_all(
            targets
                .iter()
                .map(|descriptor| self.probe_backend(descriptor, mode, budget)),
        )
        .await;

        let report = HealthReport::summarize(mode, backends);
        info!(
            ?mode,
            healthy = report.healthy_count,
            warn = report.warn_count,
            failed = report.failed_count,
            overall = ?report.overall_status,
            "Health check complete"
        );
        report
    }

    /// Probe one backend. Acquiring a lazy, never-spawned backend
    /// performs exactly one spawn attempt as part of the probe; there
    /// is no retry within a single check.
    async fn probe_backend(
        &self,
        descriptor: &ServerDescriptor,
        mode: HealthMode,
        budget: Duration,
    ) -> BackendHealth {
        let alias = descriptor.alias.clone();
        let deadline = Instant::now() + budget;
        let started = std::time::Instant::now();

        let outcome: Result<(), GatewayError> = async {
            let connection = tokio::time::timeout_at(deadline, self.pool.acquire(&alias))
                .await
                .map_err(|_| GatewayError::Timeout {
                    alias: alias.clone(),
                    tool: "probe".to_string(),
                    budget_ms: budget.as_millis() as u64,
                })??;
            connection.probe(deadline).await?;
            Ok(())
        }
        .await;

        let response_time = started.elapsed();
        let response_time_ms = response_time.as_millis() as u64;

        let (status, error) = match outcome {
            Ok(()) => (
                classify_success(response_time, self.settings.healthy_under),
                None,
            ),
            Err(e) => (HealthStatus::Failed, Some(e.to_string())),
        };

        // Full mode surfaces diagnostic history from the connection's
        // stats; quick mode stays lean.
        let (last_error, last_success_at, latency) = if mode == HealthMode::Full {
            match self.pool.get(&alias) {
                Some(connection) => {
                    let stats = connection.stats();
                    (
                        stats.last_error,
                        stats.last_success_at,
                        connection.latency_summary(),
                    )
                }
                None => (None, None, None),
            }
        } else {
            (None, None, None)
        };

        BackendHealth {
            alias,
            status,
            response_time_ms,
            error,
            last_error,
            last_success_at,
            latency,
        }
    }
}
