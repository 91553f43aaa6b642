use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use prometheus::{GaugeVec, IntGaugeVec};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Job, pause};
use crate::beacon::{BeaconClient, ClientError};
use crate::metrics::MetricsSink;

const INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_SLOTS_PER_EPOCH: u64 = 32;

/// Fork schedule relative to the node's head.
pub struct ForkJob {
    client: BeaconClient,
    epochs: GaugeVec,
    activated: IntGaugeVec,
    current: IntGaugeVec,
}

#[derive(Debug, PartialEq, Eq)]
struct ForkState<'a> {
    activated: Vec<(&'a str, bool)>,
    current: Option<&'a str>,
}

/// Which forks are active at `epoch`, and the most recent of them.
fn fork_state(forks: &BTreeMap<String, u64>, epoch: u64) -> ForkState<'_> {
    let activated = forks
        .iter()
        .map(|(name, &fork_epoch)| (name.as_str(), fork_epoch <= epoch))
        .collect();
    let current = forks
        .iter()
        .filter(|&(_, &fork_epoch)| fork_epoch <= epoch)
        .max_by_key(|&(_, &fork_epoch)| fork_epoch)
        .map(|(name, _)| name.as_str());
    ForkState { activated, current }
}

impl ForkJob {
    pub fn new(client: BeaconClient, sink: &MetricsSink) -> prometheus::Result<Self> {
        Ok(Self {
            client,
            epochs: sink.gauge_vec(
                "fork",
                "epoch",
                "The epoch at which each fork activates",
                &["fork"],
            )?,
            activated: sink.int_gauge_vec(
                "fork",
                "activated",
                "1 if the fork is active at the head epoch",
                &["fork"],
            )?,
            current: sink.int_gauge_vec(
                "fork",
                "current",
                "1 for the most recently activated fork",
                &["fork"],
            )?,
        })
    }

    async fn tick(&self) -> Result<(), ClientError> {
        let spec = self.client.spec().await?;
        let slot = self.client.head_slot().await?;
        let slots_per_epoch = spec
            .get_u64("SLOTS_PER_EPOCH")
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_SLOTS_PER_EPOCH);

        let forks = spec.fork_epochs();
        for (name, &epoch) in &forks {
            self.epochs.with_label_values(&[name.as_str()]).set(epoch as f64);
        }

        let state = fork_state(&forks, slot / slots_per_epoch);
        for (name, active) in &state.activated {
            self.activated
                .with_label_values(&[*name])
                .set(i64::from(*active));
            self.current
                .with_label_values(&[*name])
                .set(i64::from(state.current == Some(*name)));
        }
        Ok(())
    }
}

#[async_trait]
impl Job for ForkJob {
    fn name(&self) -> &str {
        "fork"
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            match cancel.run_until_cancelled(self.tick()).await {
                None => return,
                Some(Err(error)) => {
                    warn!(job = self.name(), %error, "failed to refresh fork schedule")
                }
                Some(Ok(())) => {}
            }
            if !pause(&cancel, INTERVAL).await {
                return;
            }
        }
    }
}
