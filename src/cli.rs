use std::path::PathBuf;

use clap::Parser;

/// Prometheus exporter for an Ethereum consensus node and its data directories.
#[derive(Debug, Parser)]
#[command(name = "ethmon", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "ethmon.toml")]
    pub config: PathBuf,

    /// Beacon node API URL, e.g. http://localhost:5052.
    #[arg(long)]
    pub consensus_url: Option<String>,

    /// Value of the `node_name` label on consensus metrics.
    #[arg(long)]
    pub node_name: Option<String>,

    /// Metric name prefix.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Comma-separated directories whose disk usage is exported.
    #[arg(long, value_delimiter = ',')]
    pub monitored_directories: Option<Vec<PathBuf>>,

    /// Address the /metrics endpoint listens on.
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}
