//! Exporter configuration loaded from `ethmon.toml`.
//!
//! Every field has a default, so an empty or missing file is valid.
//! Command-line flags are applied on top with [`EthmonConfig::apply_cli`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Cli;

#[derive(Debug, Clone, Deserialize)]
pub struct EthmonConfig {
    /// Prefix for every exported metric name.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Value of the `node_name` label on consensus metrics.
    #[serde(default = "default_node_name")]
    pub node_name: String,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub disk: DiskConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsensusConfig {
    /// Beacon node API base URL. Without it no node is watched.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskConfig {
    #[serde(default)]
    pub directories: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_namespace() -> String {
    "eth".to_string()
}

fn default_node_name() -> String {
    "ethereum".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for EthmonConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            node_name: default_node_name(),
            consensus: ConsensusConfig::default(),
            disk: DiskConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl EthmonConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Flags given on the command line win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.consensus_url {
            self.consensus.url = Some(url.clone());
        }
        if let Some(name) = &cli.node_name {
            self.node_name = name.clone();
        }
        if let Some(namespace) = &cli.namespace {
            self.namespace = namespace.clone();
        }
        if let Some(directories) = &cli.monitored_directories {
            self.disk.directories = directories.clone();
        }
        if let Some(addr) = &cli.listen_addr {
            self.server.listen_addr = addr.clone();
        }
    }
}
