use std::time::Duration;

use async_trait::async_trait;
use prometheus::{IntCounter, IntGauge, IntGaugeVec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{EventHandler, Job, pause};
use crate::beacon::types::FinalityCheckpoints;
use crate::beacon::{BeaconClient, BeaconEvent, ClientError};
use crate::metrics::MetricsSink;

const INTERVAL: Duration = Duration::from_secs(12);

/// Head and finality state, fed both by polling and by the event stream.
pub struct BeaconJob {
    client: BeaconClient,
    slot: IntGaugeVec,
    finality_checkpoints: IntGaugeVec,
    reorgs: IntCounter,
    reorg_depth: IntGauge,
}

impl BeaconJob {
    pub fn new(client: BeaconClient, sink: &MetricsSink) -> prometheus::Result<Self> {
        Ok(Self {
            client,
            slot: sink.int_gauge_vec(
                "beacon",
                "slot",
                "The slot number of the block",
                &["block_id"],
            )?,
            finality_checkpoints: sink.int_gauge_vec(
                "beacon",
                "finality_checkpoint_epochs",
                "The epochs of the finality checkpoints",
                &["state_id", "checkpoint"],
            )?,
            reorgs: sink.int_counter("beacon", "reorg_count", "The count of chain reorgs")?,
            reorg_depth: sink.int_gauge(
                "beacon",
                "reorg_depth",
                "The depth of the most recent chain reorg",
            )?,
        })
    }

    fn observe_checkpoints(&self, checkpoints: &FinalityCheckpoints) {
        for (name, checkpoint) in [
            ("previous_justified", &checkpoints.previous_justified),
            ("current_justified", &checkpoints.current_justified),
            ("finalized", &checkpoints.finalized),
        ] {
            self.finality_checkpoints
                .with_label_values(&["head", name])
                .set(checkpoint.epoch as i64);
        }
    }

    async fn tick(&self) -> Result<(), ClientError> {
        let slot = self.client.head_slot().await?;
        self.slot.with_label_values(&["head"]).set(slot as i64);

        let checkpoints = self.client.finality_checkpoints().await?;
        self.observe_checkpoints(&checkpoints);
        Ok(())
    }
}

impl EventHandler for BeaconJob {
    fn handle_event(&self, event: &BeaconEvent) {
        match event.topic.as_str() {
            "head" => {
                if let Some(slot) = event.quantity("slot") {
                    self.slot.with_label_values(&["head"]).set(slot as i64);
                }
            }
            "block" => {
                if let Some(slot) = event.quantity("slot") {
                    self.slot
                        .with_label_values(&["latest_block"])
                        .set(slot as i64);
                }
            }
            "chain_reorg" => {
                self.reorgs.inc();
                if let Some(depth) = event.quantity("depth") {
                    self.reorg_depth.set(depth as i64);
                }
            }
            "finalized_checkpoint" => {
                if let Some(epoch) = event.quantity("epoch") {
                    self.finality_checkpoints
                        .with_label_values(&["head", "finalized"])
                        .set(epoch as i64);
                }
            }
            topic => debug!(topic, "ignoring event"),
        }
    }
}

#[async_trait]
impl Job for BeaconJob {
    fn name(&self) -> &str {
        "beacon"
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            match cancel.run_until_cancelled(self.tick()).await {
                None => return,
                Some(Err(error)) => {
                    warn!(job = self.name(), %error, "failed to refresh beacon state")
                }
                Some(Ok(())) => {}
            }
            if !pause(&cancel, INTERVAL).await {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job() -> BeaconJob {
        let sink = MetricsSink::new("eth");
        BeaconJob::new(BeaconClient::new("http://localhost:5052").unwrap(), &sink).unwrap()
    }

    #[test]
    fn head_and_block_events_update_slots() {
        let job = job();
        job.handle_event(&BeaconEvent::new("head", json!({"slot": "100", "block": "0xaa"})));
        job.handle_event(&BeaconEvent::new("block", json!({"slot": "101", "block": "0xbb"})));

        assert_eq!(job.slot.with_label_values(&["head"]).get(), 100);
        assert_eq!(job.slot.with_label_values(&["latest_block"]).get(), 101);
    }

    #[test]
    fn chain_reorg_counts_and_records_depth() {
        let job = job();
        job.handle_event(&BeaconEvent::new("chain_reorg", json!({"slot": "200", "depth": "2"})));
        job.handle_event(&BeaconEvent::new("chain_reorg", json!({"slot": "210", "depth": "1"})));

        assert_eq!(job.reorgs.get(), 2);
        assert_eq!(job.reorg_depth.get(), 1);
    }

    #[test]
    fn finalized_checkpoint_event() {
        let job = job();
        job.handle_event(&BeaconEvent::new(
            "finalized_checkpoint",
            json!({"block": "0xcc", "state": "0xdd", "epoch": "7"}),
        ));
        assert_eq!(
            job.finality_checkpoints
                .with_label_values(&["head", "finalized"])
                .get(),
            7
        );
    }

    #[test]
    fn malformed_event_is_ignored() {
        let job = job();
        job.handle_event(&BeaconEvent::new("head", json!("garbage")));
        job.handle_event(&BeaconEvent::new("voluntary_exit", json!({})));
        assert_eq!(job.slot.with_label_values(&["head"]).get(), 0);
    }

    #[tokio::test]
    async fn tick_polls_head_and_checkpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/headers/head"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":{"header":{"message":{"slot":"321"}}}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/head/finality_checkpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":{
                    "previous_justified":{"epoch":"8","root":"0x01"},
                    "current_justified":{"epoch":"9","root":"0x02"},
                    "finalized":{"epoch":"7","root":"0x03"}}}"#,
            ))
            .mount(&server)
            .await;

        let sink = MetricsSink::new("eth");
        let job = BeaconJob::new(BeaconClient::new(server.uri()).unwrap(), &sink).unwrap();
        job.tick().await.unwrap();

        assert_eq!(job.slot.with_label_values(&["head"]).get(), 321);
        assert_eq!(
            job.finality_checkpoints
                .with_label_values(&["head", "current_justified"])
                .get(),
            9
        );
    }
}
