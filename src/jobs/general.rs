use std::time::Duration;

use async_trait::async_trait;
use prometheus::IntGaugeVec;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Job, pause};
use crate::beacon::{BeaconClient, ClientError};
use crate::metrics::MetricsSink;

const INTERVAL: Duration = Duration::from_secs(15);

/// Node version and peer counts.
pub struct GeneralJob {
    client: BeaconClient,
    node_version: IntGaugeVec,
    peers: IntGaugeVec,
}

impl GeneralJob {
    pub fn new(client: BeaconClient, sink: &MetricsSink) -> prometheus::Result<Self> {
        Ok(Self {
            client,
            node_version: sink.int_gauge_vec(
                "",
                "node_version",
                "The version of the running beacon node",
                &["version"],
            )?,
            peers: sink.int_gauge_vec(
                "",
                "peers",
                "The count of peers connected to the beacon node, by state",
                &["state"],
            )?,
        })
    }

    async fn tick(&self) -> Result<(), ClientError> {
        let version = self.client.node_version().await?;
        self.node_version.reset();
        self.node_version
            .with_label_values(&[version.version.as_str()])
            .set(1);

        let peers = self.client.peer_count().await?;
        for (state, count) in [
            ("connected", peers.connected),
            ("connecting", peers.connecting),
            ("disconnected", peers.disconnected),
            ("disconnecting", peers.disconnecting),
        ] {
            self.peers.with_label_values(&[state]).set(count as i64);
        }
        Ok(())
    }
}

#[async_trait]
impl Job for GeneralJob {
    fn name(&self) -> &str {
        "general"
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            match cancel.run_until_cancelled(self.tick()).await {
                None => return,
                Some(Err(error)) => {
                    warn!(job = self.name(), %error, "failed to refresh general metrics")
                }
                Some(Ok(())) => {}
            }
            if !pause(&cancel, INTERVAL).await {
                return;
            }
        }
    }
}
