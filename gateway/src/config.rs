//! Configuration loading

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default config file name, looked up relative to the working directory.
pub const CONFIG_FILE: &str = "gateway.json";

/// Find a config file by walking up the directory tree, then checking
/// the global config at ~/.config/gateway/.
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("gateway").join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

/// Top-level configuration (from gateway.json).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayFileConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    /// Backend id -> launch recipe. The id doubles as display name and
    /// namespace prefix unless overridden per entry.
    #[serde(default)]
    pub servers: HashMap<String, BackendConfig>,
}

/// Gateway-level settings section.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Launch recipe for one backend process.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides merged onto the host environment at spawn.
    /// Values may reference host variables, e.g. `"$AMAP_KEY"`.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Display name; defaults to the backend id.
    pub name: Option<String>,
    /// Namespace prefix; defaults to the backend id. Must be unique.
    pub prefix: Option<String>,
}

fn default_name() -> String {
    "mcp-gateway".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl GatewayFileConfig {
    /// Load configuration.
    ///
    /// Search order:
    /// 1. Explicit `--config` path, if given
    /// 2. Walk up directory tree from cwd looking for gateway.json
    /// 3. Check ~/.config/gateway/gateway.json (global fallback)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = find_config_file(CONFIG_FILE).with_context(|| {
            format!(
                "no {} found in current directory, parents, or global config",
                CONFIG_FILE
            )
        })?;
        tracing::debug!("Loading config from: {}", path.display());
        Self::load_from_path(&path)
    }

    /// Load from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: GatewayFileConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: GatewayFileConfig = serde_json::from_str(
            r#"{
                "gateway": {"name": "test-gw", "port": 9000},
                "servers": {
                    "calc": {
                        "command": "target/debug/calc-mcp",
                        "prefix": "calc"
                    },
                    "amap": {
                        "name": "Amap Maps",
                        "command": "npx",
                        "args": ["-y", "@amap/amap-maps-mcp-server"],
                        "env": {"AMAP_MAPS_API_KEY": "$AMAP_KEY"}
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.gateway.name, "test-gw");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.servers.len(), 2);
        let amap = &config.servers["amap"];
        assert_eq!(amap.name.as_deref(), Some("Amap Maps"));
        assert_eq!(amap.args, vec!["-y", "@amap/amap-maps-mcp-server"]);
        assert_eq!(amap.env["AMAP_MAPS_API_KEY"], "$AMAP_KEY");
    }

    #[test]
    fn test_defaults_applied() {
        let config: GatewayFileConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.gateway.port, 8765);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"gateway": {"port": 1234}}"#).unwrap();

        let config = GatewayFileConfig::load_from_path(&path).unwrap();
        assert_eq!(config.gateway.port, 1234);

        assert!(GatewayFileConfig::load_from_path(&dir.path().join("missing.json")).is_err());
    }
}
