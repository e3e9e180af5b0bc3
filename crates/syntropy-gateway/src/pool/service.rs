//! Connection pool
//!
//! Guarantees at most one live `BackendConnection` per registered
//! alias and provides it on demand. Lazy spawn is de-duplicated with
//! a shared init future published under a per-alias lock: concurrent
//! `acquire` calls for the same backend await one spawn attempt and
//! observe the same outcome. A failed spawn is retried only on the
//! next `acquire` - there is no background retry loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use syntropy_core::{GatewayError, ServerRegistry};

use super::connection::{BackendConnection, ConnectionState};
use super::transport::BackendConnector;
use crate::settings::GatewaySettings;

/// Shared spawn+handshake outcome. Cloneable so every concurrent
/// caller awaits the same attempt.
type InitFuture = Shared<BoxFuture<'static, Result<(), String>>>;

struct PoolEntry {
    connection: Arc<BackendConnection>,
    /// Present while an init is in flight (or completed - the state
    /// check decides whether it is stale).
    init: Mutex<Option<InitFuture>>,
}

/// Outcome of `warm_eager`.
#[derive(Debug, Default)]
pub struct WarmupReport {
    /// Backends that reached Ready.
    pub ready: Vec<String>,
    /// Backends that failed to start, with the cause.
    pub failed: Vec<(String, String)>,
}

/// Owns every backend connection. One entry per registered alias,
/// created at construction; connections spawn eagerly at warm-up or
/// lazily on first acquire.
pub struct ConnectionPool {
    connector: Arc<dyn BackendConnector>,
    settings: Arc<GatewaySettings>,
    entries: DashMap<String, Arc<PoolEntry>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(
        registry: &ServerRegistry,
        connector: Arc<dyn BackendConnector>,
        settings: Arc<GatewaySettings>,
    ) -> Self {
        let entries = DashMap::with_capacity(registry.len());
        for descriptor in registry.list_all() {
            let connection = Arc::new(BackendConnection::new(
                descriptor.clone(),
                settings.breaker_threshold,
                settings.degraded_cooldown,
                settings.max_in_flight,
            ));
            entries.insert(
                descriptor.alias.clone(),
                Arc::new(PoolEntry {
                    connection,
                    init: Mutex::new(None),
                }),
            );
        }

        Self {
            connector,
            settings,
            entries,
            closed: AtomicBool::new(false),
        }
    }

    /// Spawn all Eager backends concurrently, each under its own
    /// startup timeout. One backend failing to start never blocks
    /// gateway readiness or the other backends.
    pub async fn warm_eager(&self) -> WarmupReport {
        let eager: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().connection.descriptor().is_eager())
            .map(|entry| entry.key().clone())
            .collect();

        info!(count = eager.len(), "Warming eager backends");

        let results = futures::future::join_all(
            eager
                .iter()
                .map(|alias| async move { (alias.clone(), self.acquire(alias).await) }),
        )
        .await;

        let mut report = WarmupReport::default();
        for (alias, result) in results {
            match result {
                Ok(_) => report.ready.push(alias),
                Err(e) => {
                    warn!(server = %alias, error = %e, "Eager backend failed to start");
                    report.failed.push((alias, e.to_string()));
                }
            }
        }

        info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            "Eager warm-up complete"
        );
        report
    }

    /// Return the connection for `alias`, spawning it if necessary.
    /// Ready/Degraded connections return immediately; Uninitialized
    /// and Failed ones trigger (or join) a single-flight init.
    pub async fn acquire(&self, alias: &str) -> Result<Arc<BackendConnection>, GatewayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::BackendUnavailable {
                alias: alias.to_string(),
                cause: "gateway is shut down".to_string(),
            });
        }

        let entry = self
            .entries
            .get(alias)
            .map(|e| e.value().clone())
            .ok_or_else(|| GatewayError::UnknownServer {
                raw_name: alias.to_string(),
            })?;

        // Fast path: no lock for live connections.
        match entry.connection.state() {
            ConnectionState::Ready | ConnectionState::Degraded => {
                return Ok(entry.connection.clone())
            }
            ConnectionState::Closed => {
                return Err(GatewayError::BackendUnavailable {
                    alias: alias.to_string(),
                    cause: "connection closed".to_string(),
                })
            }
            _ => {}
        }

        let init = {
            let mut slot = entry.init.lock();
            // Re-check under the lock: another caller may have won.
            match entry.connection.state() {
                ConnectionState::Ready | ConnectionState::Degraded => {
                    return Ok(entry.connection.clone())
                }
                ConnectionState::Closed => {
                    return Err(GatewayError::BackendUnavailable {
                        alias: alias.to_string(),
                        cause: "connection closed".to_string(),
                    })
                }
                ConnectionState::Starting => match slot.clone() {
                    Some(fut) => fut,
                    None => {
                        let fut = self.start_init(&entry);
                        *slot = Some(fut.clone());
                        fut
                    }
                },
                ConnectionState::Uninitialized | ConnectionState::Failed => {
                    let fut = self.start_init(&entry);
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        match init.await {
            Ok(()) => Ok(entry.connection.clone()),
            Err(cause) => Err(GatewayError::BackendUnavailable {
                alias: alias.to_string(),
                cause,
            }),
        }
    }

    /// Look up a connection without triggering a spawn.
    pub fn get(&self, alias: &str) -> Option<Arc<BackendConnection>> {
        self.entries.get(alias).map(|e| e.connection.clone())
    }

    /// All connections, spawn-free.
    pub fn connections(&self) -> Vec<Arc<BackendConnection>> {
        self.entries
            .iter()
            .map(|entry| entry.connection.clone())
            .collect()
    }

    /// Close every live transport and terminate its process.
    /// Idempotent; pending queued callers are released with an error.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        for entry in self.entries.iter() {
            let alias = entry.key().clone();
            if let Some(client) = entry.connection.mark_closed() {
                if let Err(e) = client.close().await {
                    warn!(server = %alias, error = %e, "Error closing backend transport");
                }
            }
        }
        info!("Connection pool shut down");
    }

    /// Build and publish the single-flight init future for an entry.
    /// Must be called with the entry's init lock held.
    fn start_init(&self, entry: &Arc<PoolEntry>) -> InitFuture {
        entry.connection.mark_starting();

        let connection = entry.connection.clone();
        let connector = self.connector.clone();
        let startup_timeout = self.settings.startup_timeout;

        async move {
            let descriptor = connection.descriptor().clone();
            let alias = descriptor.alias.clone();
            debug!(server = %alias, command = %descriptor.command, "Starting backend");

            match tokio::time::timeout(startup_timeout, connector.connect(&descriptor)).await {
                Ok(Ok(client)) => {
                    if connection.mark_ready(client.clone()) {
                        info!(server = %alias, "Backend ready");
                        Ok(())
                    } else {
                        // Shutdown raced the handshake; tear the
                        // fresh transport back down.
                        let _ = client.close().await;
                        Err("gateway is shut down".to_string())
                    }
                }
                Ok(Err(e)) => {
                    let cause = format!("{e:#}");
                    warn!(server = %alias, error = %cause, "Backend spawn/handshake failed");
                    connection.mark_failed(cause.clone());
                    Err(cause)
                }
                Err(_) => {
                    let cause = format!("startup timed out after {startup_timeout:?}");
                    warn!(server = %alias, "{}", cause);
                    connection.mark_failed(cause.clone());
                    Err(cause)
                }
            }
        }
        .boxed()
        .shared()
    }
}
