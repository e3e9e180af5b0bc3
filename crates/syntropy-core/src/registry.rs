//! Backend server registry
//!
//! Loads the alias -> spawn-spec catalog from a JSON configuration
//! file once at gateway startup. Malformed configuration (duplicate
//! alias or internal key, missing spawn command) fails fast here;
//! everything downstream treats backend failures as recoverable.
//!
//! Reloading the file requires a gateway restart - there is no
//! hot-reload.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{LoadPolicy, ServerDescriptor};
use crate::error::GatewayError;

/// One backend entry as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    #[serde(alias = "spawnCommand")]
    pub command: String,
    #[serde(default, alias = "spawnArgs")]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Spawn at boot instead of on first use.
    #[serde(default)]
    pub eager: bool,
    /// Internal key; defaults to the alias when absent.
    #[serde(default)]
    pub internal_key: Option<String>,
    /// Probed by quick health checks.
    #[serde(default)]
    pub critical: bool,
    /// Representative tool for health probes.
    #[serde(default)]
    pub probe_tool: Option<String>,
}

/// On-disk configuration: a map from backend alias to its spawn spec,
/// plus the tool-name namespace the gateway answers to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigFile {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub servers: serde_json::Map<String, serde_json::Value>,
}

/// Static catalog of backend descriptors, loaded once at startup.
#[derive(Debug)]
pub struct ServerRegistry {
    descriptors: Vec<ServerDescriptor>,
    by_alias: HashMap<String, usize>,
}

impl ServerRegistry {
    /// Build a registry from descriptors, validating uniqueness
    /// invariants. This is the fail-fast path: any violation aborts
    /// gateway startup.
    pub fn new(descriptors: Vec<ServerDescriptor>) -> Result<Self, GatewayError> {
        let mut by_alias = HashMap::with_capacity(descriptors.len());
        let mut internal_keys = HashMap::with_capacity(descriptors.len());

        for (idx, desc) in descriptors.iter().enumerate() {
            if desc.alias.is_empty() {
                return Err(GatewayError::Config("empty server alias".to_string()));
            }
            if desc.command.trim().is_empty() {
                return Err(GatewayError::Config(format!(
                    "server '{}' has no spawn command",
                    desc.alias
                )));
            }
            if by_alias.insert(desc.alias.clone(), idx).is_some() {
                return Err(GatewayError::Config(format!(
                    "duplicate server alias '{}'",
                    desc.alias
                )));
            }
            if let Some(other) = internal_keys.insert(desc.internal_key.clone(), &desc.alias) {
                return Err(GatewayError::Config(format!(
                    "internal key '{}' used by both '{}' and '{}'",
                    desc.internal_key, other, desc.alias
                )));
            }
        }

        Ok(Self {
            descriptors,
            by_alias,
        })
    }

    /// Parse a configuration file body into a registry.
    pub fn from_config(config: &GatewayConfigFile) -> Result<Self, GatewayError> {
        let mut descriptors = Vec::with_capacity(config.servers.len());

        for (alias, value) in &config.servers {
            let spec: ServerSpec = serde_json::from_value(value.clone()).map_err(|e| {
                GatewayError::Config(format!("server '{}': {}", alias, e))
            })?;

            descriptors.push(ServerDescriptor {
                alias: alias.clone(),
                internal_key: spec.internal_key.unwrap_or_else(|| alias.clone()),
                command: spec.command,
                args: spec.args,
                env: spec.env,
                load_policy: if spec.eager {
                    LoadPolicy::Eager
                } else {
                    LoadPolicy::Lazy
                },
                critical: spec.critical,
                probe_tool: spec.probe_tool,
            });
        }

        Self::new(descriptors)
    }

    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<(Self, GatewayConfigFile), GatewayError> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: GatewayConfigFile = serde_json::from_str(&body).map_err(|e| {
            GatewayError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;

        let registry = Self::from_config(&config)?;
        info!(
            servers = registry.descriptors.len(),
            path = %path.display(),
            "Loaded server registry"
        );
        Ok((registry, config))
    }

    /// All registered descriptors, in configuration order.
    pub fn list_all(&self) -> &[ServerDescriptor] {
        &self.descriptors
    }

    /// Resolve a descriptor by its external alias.
    pub fn resolve(&self, alias: &str) -> Option<&ServerDescriptor> {
        self.by_alias.get(alias).map(|&idx| &self.descriptors[idx])
    }

    /// Registered aliases, longest first. Used for longest-prefix
    /// matching of namespaced tool-call names.
    pub fn aliases_longest_first(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.descriptors.iter().map(|d| d.alias.as_str()).collect();
        aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));
        aliases
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
