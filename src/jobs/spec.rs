use std::time::Duration;

use async_trait::async_trait;
use prometheus::{Gauge, IntGaugeVec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Job, pause};
use crate::beacon::types::ChainSpec;
use crate::beacon::BeaconClient;
use crate::error::JobError;
use crate::metrics::MetricsSink;

const INTERVAL: Duration = Duration::from_secs(600);

/// Numeric chain constants published as `spec_<lowercase key>`.
const NUMERIC_KEYS: &[&str] = &[
    "BASE_REWARD_FACTOR",
    "DEPOSIT_CHAIN_ID",
    "EFFECTIVE_BALANCE_INCREMENT",
    "EPOCHS_PER_SYNC_COMMITTEE_PERIOD",
    "ETH1_FOLLOW_DISTANCE",
    "GENESIS_DELAY",
    "MAX_ATTESTATIONS",
    "MAX_DEPOSITS",
    "MAX_EFFECTIVE_BALANCE",
    "MAX_VALIDATORS_PER_COMMITTEE",
    "MIN_DEPOSIT_AMOUNT",
    "MIN_GENESIS_ACTIVE_VALIDATOR_COUNT",
    "MIN_SYNC_COMMITTEE_PARTICIPANTS",
    "SAFE_SLOTS_TO_UPDATE_JUSTIFIED",
    "SECONDS_PER_ETH1_BLOCK",
    "SECONDS_PER_SLOT",
    "SLOTS_PER_EPOCH",
    "SYNC_COMMITTEE_SIZE",
    "TARGET_COMMITTEE_SIZE",
    "TERMINAL_TOTAL_DIFFICULTY",
];

/// Chain specification constants. Fetched once at start, then refreshed.
pub struct SpecJob {
    client: BeaconClient,
    constants: Vec<(&'static str, Gauge)>,
    config_name: IntGaugeVec,
    preset_base: IntGaugeVec,
}

impl SpecJob {
    pub fn new(client: BeaconClient, sink: &MetricsSink) -> prometheus::Result<Self> {
        let constants = NUMERIC_KEYS
            .iter()
            .map(|&key| {
                let name = key.to_lowercase();
                let help = format!("The {key} value of the chain spec");
                sink.gauge("spec", &name, &help).map(|gauge| (key, gauge))
            })
            .collect::<prometheus::Result<Vec<_>>>()?;

        Ok(Self {
            client,
            constants,
            config_name: sink.int_gauge_vec(
                "spec",
                "config_name",
                "The name of the chain config",
                &["name"],
            )?,
            preset_base: sink.int_gauge_vec(
                "spec",
                "preset_base",
                "The preset base of the chain spec",
                &["preset"],
            )?,
        })
    }

    fn observe(&self, spec: &ChainSpec) {
        for (key, gauge) in &self.constants {
            match spec.0.get(*key).and_then(numeric) {
                Some(value) => gauge.set(value),
                None => debug!(key, "chain spec value missing or not numeric"),
            }
        }

        for (key, gauge) in [
            ("CONFIG_NAME", &self.config_name),
            ("PRESET_BASE", &self.preset_base),
        ] {
            if let Some(serde_json::Value::String(value)) = spec.0.get(key) {
                gauge.reset();
                gauge.with_label_values(&[value.as_str()]).set(1);
            }
        }
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[async_trait]
impl Job for SpecJob {
    fn name(&self) -> &str {
        "spec"
    }

    async fn start(&self) -> Result<(), JobError> {
        let spec = self.client.spec().await?;
        self.observe(&spec);
        info!(job = self.name(), keys = spec.0.len(), "loaded chain spec");
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) {
        while pause(&cancel, INTERVAL).await {
            match cancel.run_until_cancelled(self.client.spec()).await {
                None => break,
                Some(Ok(spec)) => self.observe(&spec),
                Some(Err(error)) => {
                    warn!(job = self.name(), %error, "failed to refresh chain spec")
                }
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

    fn gauge<'a>(job: &'a SpecJob, key: &str) -> &'a Gauge {
        &job.constants.iter().find(|(k, _)| *k == key).unwrap().1
    }

    #[test]
    fn observe_publishes_constants_and_labels() {
        let sink = MetricsSink::new("eth");
        let job = SpecJob::new(BeaconClient::new("http://localhost:5052").unwrap(), &sink).unwrap();
        let spec: ChainSpec = serde_json::from_value(json!({
            "CONFIG_NAME": "mainnet",
            "PRESET_BASE": "mainnet",
            "SECONDS_PER_SLOT": "12",
            "SLOTS_PER_EPOCH": "32",
            "TERMINAL_TOTAL_DIFFICULTY": "58750000000000000000000"
        }))
        .unwrap();

        job.observe(&spec);

        assert_eq!(gauge(&job, "SECONDS_PER_SLOT").get(), 12.0);
        assert_eq!(gauge(&job, "SLOTS_PER_EPOCH").get(), 32.0);
        assert!(gauge(&job, "TERMINAL_TOTAL_DIFFICULTY").get() > 5.8e22);
        assert_eq!(job.config_name.with_label_values(&["mainnet"]).get(), 1);

        let text = sink.render().unwrap();
        assert!(text.contains("eth_spec_seconds_per_slot 12"));
    }

    #[tokio::test]
    async fn start_fails_when_spec_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/config/spec"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let sink = MetricsSink::new("eth");
        let job = SpecJob::new(BeaconClient::new(server.uri()).unwrap(), &sink).unwrap();
        let result = job.start().await;
        assert!(matches!(result, Err(JobError::Client(_))));
    }
}
