//! Persisted tool enable/disable policy
//!
//! The policy is an allow/deny overlay on individual tool names:
//! with an empty `enabled` set everything is allowed except names in
//! `disabled`; a non-empty `enabled` set allows only its members.
//!
//! `set_policy` is the only mutator. Every mutation is persisted with
//! write-temp-then-rename semantics before it is considered complete,
//! so a crash mid-write can never leave a file that fails to parse.
//! A missing or corrupt file at load time is the one deliberate
//! soft-fail in the gateway: policy unavailability must not block all
//! tool use, so it degrades to default-allow-all and re-persists a
//! clean default.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// The persisted sets. Invariant: no tool name appears in both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicyState {
    #[serde(default)]
    pub enabled: BTreeSet<String>,
    #[serde(default)]
    pub disabled: BTreeSet<String>,
}

impl ToolPolicyState {
    /// `enabled` empty means default-allow-all except `disabled`.
    pub fn is_enabled(&self, tool: &str) -> bool {
        if self.disabled.contains(tool) {
            return false;
        }
        self.enabled.is_empty() || self.enabled.contains(tool)
    }

    /// Apply an enable/disable batch, keeping the sets disjoint:
    /// enabling removes from `disabled` and vice versa.
    pub fn apply(&mut self, enable: &[String], disable: &[String]) {
        for tool in enable {
            self.disabled.remove(tool);
            self.enabled.insert(tool.clone());
        }
        for tool in disable {
            self.enabled.remove(tool);
            self.disabled.insert(tool.clone());
        }
    }
}

/// Manages the in-memory policy state and its durable JSON file.
///
/// Reads are lock-free snapshots under a `parking_lot` read lock;
/// mutations serialize through an async mutex so persistence order
/// matches mutation order.
pub struct ToolStateManager {
    path: PathBuf,
    state: RwLock<ToolPolicyState>,
    write_lock: Mutex<()>,
}

impl ToolStateManager {
    /// Well-known default location for the policy file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("syntropy")
            .join("tool-policy.json")
    }

    /// Load the policy from `path`, degrading to the empty default on
    /// a missing or corrupt file (and re-persisting a clean default
    /// so the next load is well-formed).
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(body) => match serde_json::from_str::<ToolPolicyState>(&body) {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Corrupt tool policy file; falling back to default-allow-all"
                    );
                    ToolPolicyState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ToolPolicyState::default(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Cannot read tool policy file; falling back to default-allow-all"
                );
                ToolPolicyState::default()
            }
        };

        let manager = Self {
            path,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        };

        // Re-persist so a corrupt or missing file is replaced by a
        // clean default immediately, not on the next mutation.
        if let Err(e) = manager.persist_snapshot().await {
            warn!(error = %e, "Failed to re-persist tool policy after load");
        }

        manager
    }

    /// Whether a tool is currently allowed.
    pub fn is_enabled(&self, tool: &str) -> bool {
        self.state.read().is_enabled(tool)
    }

    /// Current state, cloned.
    pub fn snapshot(&self) -> ToolPolicyState {
        self.state.read().clone()
    }

    /// Apply an enable/disable batch and persist it. The mutation is
    /// complete only once the file rename has succeeded.
    pub async fn set_policy(&self, enable: &[String], disable: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let snapshot = {
            let mut state = self.state.write();
            state.apply(enable, disable);
            state.clone()
        };

        self.persist(&snapshot).await?;
        info!(
            enabled = snapshot.enabled.len(),
            disabled = snapshot.disabled.len(),
            "Tool policy updated"
        );
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist_snapshot(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.state.read().clone();
        self.persist(&snapshot).await
    }

    async fn persist(&self, state: &ToolPolicyState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let body = serde_json::to_string_pretty(state).context("serializing tool policy")?;

        // Atomic replace: a crash between write and rename leaves the
        // old file intact.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming {} into place", tmp.display()))?;
        Ok(())
    }
}
