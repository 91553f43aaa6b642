mod beacon;
mod cli;
mod config;
mod disk;
mod error;
mod jobs;
mod metrics;
mod subscription;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beacon::{BeaconClient, NodeClient};
use cli::Cli;
use config::EthmonConfig;
use disk::DiskUsage;
use jobs::{
    BeaconJob, EventActivity, EventHandler, EventJob, ForkJob, GeneralJob, Job, JobStatus, SpecJob,
    Supervisor, SyncJob,
};
use metrics::{MetricsServer, MetricsSink};
use subscription::Watchdog;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = EthmonConfig::load(&cli.config)?;
    config.apply_cli(&cli);

    let sink = MetricsSink::new(config.namespace.clone());
    let jobs = build_jobs(&config, &sink)?;
    let supervisor = Supervisor::new(jobs);

    let cancel = CancellationToken::new();
    supervisor.start(&cancel);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();
    supervisor.wait().await;

    for (job, status) in supervisor.statuses() {
        if let JobStatus::Failed(reason) = status {
            warn!(job = %job, %reason, "job never started");
        }
    }
    Ok(())
}

fn build_jobs(config: &EthmonConfig, sink: &MetricsSink) -> Result<Vec<Arc<dyn Job>>> {
    let mut jobs: Vec<Arc<dyn Job>> = Vec::new();

    match &config.consensus.url {
        Some(url) => {
            let client = BeaconClient::new(url.clone())?;
            info!(url = client.base_url(), "watching consensus node");
            let consensus = sink.with_const_labels([
                ("ethereum_role", "consensus"),
                ("node_name", config.node_name.as_str()),
            ]);

            let event = Arc::new(EventJob::new(&consensus)?);
            let beacon = Arc::new(BeaconJob::new(client.clone(), &consensus)?);
            let handlers: Vec<Arc<dyn EventHandler>> = vec![
                event.clone() as Arc<dyn EventHandler>,
                beacon.clone() as Arc<dyn EventHandler>,
            ];
            let node: Arc<dyn NodeClient> = Arc::new(client.clone());

            jobs.push(Arc::new(GeneralJob::new(client.clone(), &consensus)?));
            jobs.push(Arc::new(SpecJob::new(client.clone(), &consensus)?));
            jobs.push(Arc::new(SyncJob::new(client.clone(), &consensus)?));
            jobs.push(Arc::new(ForkJob::new(client, &consensus)?));
            jobs.push(Arc::new(Watchdog::new(Some(node), event.activity(), handlers)));
            jobs.push(beacon);
            jobs.push(event);
        }
        None => {
            info!("no consensus url configured, event subscription stays idle");
            jobs.push(Arc::new(Watchdog::new(
                None,
                EventActivity::default(),
                Vec::new(),
            )));
        }
    }

    if config.disk.directories.is_empty() {
        info!("no monitored directories configured");
    } else {
        jobs.push(Arc::new(DiskUsage::new(config.disk.directories.clone(), sink)?));
    }

    jobs.push(Arc::new(MetricsServer::new(
        config.server.listen_addr.clone(),
        sink.clone(),
    )));
    Ok(jobs)
}
