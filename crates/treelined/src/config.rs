//! TOML configuration for the Treeline daemon.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node identity and addresses.
    pub node: NodeSection,
    /// Cluster serving policy published by this node at startup.
    pub cluster: ClusterSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Unique node identifier within the cluster.
    pub node_id: String,
    /// Hostname peers use to reach this node's log frontend.
    pub hostname: String,
    /// TCP port of the log frontend.
    pub log_port: u16,
    /// Directory for the local tree-head database.
    pub data_dir: PathBuf,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".treeline"))
            .unwrap_or_else(|| PathBuf::from(".treeline"));
        Self {
            node_id: "node-1".to_string(),
            hostname: "localhost".to_string(),
            log_port: 6962,
            data_dir,
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Minimum absolute number of nodes required to serve a tree head.
    pub minimum_serving_nodes: u64,
    /// Minimum fraction of the cluster required to serve a tree head.
    pub minimum_serving_fraction: f64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            minimum_serving_nodes: 1,
            minimum_serving_fraction: 0.5,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load configuration from a TOML file, or defaults when no path is
    /// given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Ok(toml::from_str(&raw)?)
            }
            None => Ok(Self::default()),
        }
    }
}
