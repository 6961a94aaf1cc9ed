//! Backend registry
//!
//! The set of backends a connection can reach, keyed by namespace prefix.
//! Built once from configuration (gateway mode) or around a single fresh
//! instance (isolated-bridge mode). Lookups run concurrently; lifecycle
//! mutation is per backend, never registry-wide.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::config::GatewayFileConfig;

use super::channel::RpcChannel;
use super::supervisor::{BackendDescriptor, BackendState, ProcessSupervisor};

pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn RpcChannel>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("prefixes", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// Build a registry from already-started channels. Prefixes must be
    /// unique: they are the namespace that keeps aggregated tool names
    /// collision-free.
    pub fn new(channels: Vec<Arc<dyn RpcChannel>>) -> Result<Self> {
        let mut backends: HashMap<String, Arc<dyn RpcChannel>> = HashMap::new();
        for channel in channels {
            let prefix = channel.descriptor().prefix.clone();
            if backends.insert(prefix.clone(), channel).is_some() {
                bail!("duplicate backend prefix '{}'", prefix);
            }
        }
        Ok(Self { backends })
    }

    /// Registry around one backend, for isolated-bridge connections.
    pub fn single(channel: Arc<dyn RpcChannel>) -> Self {
        let mut backends: HashMap<String, Arc<dyn RpcChannel>> = HashMap::new();
        backends.insert(channel.descriptor().prefix.clone(), channel);
        Self { backends }
    }

    /// Start every configured backend and collect the survivors.
    ///
    /// A backend that fails to start is skipped with a warning; startup
    /// only fails when servers were configured and none came up. An empty
    /// configuration yields an empty registry, which is valid (catalog
    /// requests then return empty lists).
    pub async fn start_from_config(config: &GatewayFileConfig) -> Result<Self> {
        let mut channels: Vec<Arc<dyn RpcChannel>> = Vec::new();

        for (id, server) in &config.servers {
            let descriptor = BackendDescriptor::from_config(id, server);
            let supervisor = Arc::new(ProcessSupervisor::new(descriptor));
            match supervisor.start().await {
                Ok(()) => channels.push(supervisor),
                Err(e) => {
                    tracing::warn!("Skipping backend '{}': {}", id, e);
                }
            }
        }

        if channels.is_empty() && !config.servers.is_empty() {
            bail!("no configured backend started successfully");
        }

        tracing::info!(
            "Started {}/{} backends",
            channels.len(),
            config.servers.len()
        );
        Self::new(channels)
    }

    /// Look up the backend owning a namespace prefix.
    pub fn by_prefix(&self, prefix: &str) -> Option<Arc<dyn RpcChannel>> {
        self.backends.get(prefix).cloned()
    }

    /// Backends currently in `Running` state, ordered by prefix so that
    /// aggregated catalogs are deterministic.
    pub fn running(&self) -> Vec<Arc<dyn RpcChannel>> {
        let mut live: Vec<_> = self
            .backends
            .values()
            .filter(|b| b.state() == BackendState::Running)
            .cloned()
            .collect();
        live.sort_by(|a, b| a.descriptor().prefix.cmp(&b.descriptor().prefix));
        live
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Stop every backend with the given grace period.
    pub async fn shutdown_all(&self, grace: Duration) {
        for backend in self.backends.values() {
            if let Err(e) = backend.stop(grace).await {
                tracing::warn!(
                    backend = %backend.descriptor().id,
                    "Stop failed: {}",
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::channel::fake::FakeChannel;
    use serde_json::json;

    fn ok_channel(prefix: &str) -> Arc<dyn RpcChannel> {
        Arc::new(FakeChannel::new(prefix, prefix, |_| Ok(json!({"result": {}}))))
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let result = BackendRegistry::new(vec![ok_channel("calc"), ok_channel("calc")]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("calc"));
    }

    #[test]
    fn test_lookup_by_prefix() {
        let registry = BackendRegistry::new(vec![ok_channel("calc"), ok_channel("amap")]).unwrap();
        assert!(registry.by_prefix("calc").is_some());
        assert!(registry.by_prefix("amap").is_some());
        assert!(registry.by_prefix("nope").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_running_filters_and_sorts() {
        let down = Arc::new(
            FakeChannel::new("zeta", "zeta", |_| Ok(json!({})))
                .with_state(crate::backend::BackendState::Failed),
        );
        let registry =
            BackendRegistry::new(vec![ok_channel("beta"), ok_channel("alpha"), down]).unwrap();

        let running = registry.running();
        let prefixes: Vec<_> = running
            .iter()
            .map(|b| b.descriptor().prefix.clone())
            .collect();
        assert_eq!(prefixes, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_empty_registry_is_valid() {
        let registry = BackendRegistry::new(vec![]).unwrap();
        assert!(registry.is_empty());
        assert!(registry.running().is_empty());
    }
}
