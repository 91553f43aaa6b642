use std::time::Duration;

use async_trait::async_trait;
use prometheus::{Gauge, IntGauge};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Job, pause};
use crate::beacon::types::SyncStatus;
use crate::beacon::{BeaconClient, ClientError};
use crate::metrics::MetricsSink;

const INTERVAL: Duration = Duration::from_secs(5);

/// Sync progress of the beacon node.
pub struct SyncJob {
    client: BeaconClient,
    percentage: Gauge,
    estimated_highest_slot: IntGauge,
    head_slot: IntGauge,
    distance: IntGauge,
    is_syncing: IntGauge,
}

impl SyncJob {
    pub fn new(client: BeaconClient, sink: &MetricsSink) -> prometheus::Result<Self> {
        Ok(Self {
            client,
            percentage: sink.gauge(
                "sync",
                "percentage",
                "How synced the node is with the network (0-100%)",
            )?,
            estimated_highest_slot: sink.int_gauge(
                "sync",
                "estimated_highest_slot",
                "The estimated highest slot of the network",
            )?,
            head_slot: sink.int_gauge("sync", "head_slot", "The current slot of the node")?,
            distance: sink.int_gauge("sync", "distance", "The sync distance of the node")?,
            is_syncing: sink.int_gauge("sync", "is_syncing", "1 if the node is in syncing state")?,
        })
    }

    fn observe(&self, status: &SyncStatus) {
        self.percentage.set(status.percentage());
        self.estimated_highest_slot
            .set(status.estimated_highest_slot() as i64);
        self.head_slot.set(status.head_slot as i64);
        self.distance.set(status.sync_distance as i64);
        self.is_syncing.set(i64::from(status.is_syncing));
    }

    async fn tick(&self) -> Result<(), ClientError> {
        let status = self.client.syncing().await?;
        self.observe(&status);
        Ok(())
    }
}

#[async_trait]
impl Job for SyncJob {
    fn name(&self) -> &str {
        "sync"
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            match cancel.run_until_cancelled(self.tick()).await {
                None => return,
                Some(Err(error)) => {
                    warn!(job = self.name(), %error, "failed to refresh sync status")
                }
                Some(Ok(())) => {}
            }
            if !pause(&cancel, INTERVAL).await {
                return;
            }
        }
    }
}
