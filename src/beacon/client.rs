use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ClientError;
use super::sse::SseDecoder;
use super::types::{
    ChainSpec, Envelope, FinalityCheckpoints, HeaderResponse, NodeVersion, PeerCount, SyncStatus,
};
use super::{EventCallback, EventSubscriber, NodeClient};
use crate::error::SubscriptionError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Event topics understood by the beacon node event stream.
const EVENT_TOPICS: &[(&str, bool)] = &[
    ("attestation", true),
    ("block", true),
    ("chain_reorg", true),
    ("contribution_and_proof", true),
    ("finalized_checkpoint", true),
    ("head", true),
    ("voluntary_exit", true),
];

/// HTTP client for the standard beacon node API.
#[derive(Clone)]
pub struct BeaconClient {
    client: Client,
    base_url: String,
}

impl BeaconClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        // No overall timeout: the event stream stays open indefinitely.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn node_version(&self) -> Result<NodeVersion, ClientError> {
        self.get("/eth/v1/node/version").await
    }

    pub async fn peer_count(&self) -> Result<PeerCount, ClientError> {
        self.get("/eth/v1/node/peer_count").await
    }

    pub async fn syncing(&self) -> Result<SyncStatus, ClientError> {
        self.get("/eth/v1/node/syncing").await
    }

    pub async fn spec(&self) -> Result<ChainSpec, ClientError> {
        self.get("/eth/v1/config/spec").await
    }

    pub async fn head_slot(&self) -> Result<u64, ClientError> {
        let header: HeaderResponse = self.get("/eth/v1/beacon/headers/head").await?;
        Ok(header.header.message.slot)
    }

    pub async fn finality_checkpoints(&self) -> Result<FinalityCheckpoints, ClientError> {
        self.get("/eth/v1/beacon/states/head/finality_checkpoints")
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header(ACCEPT, "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| ClientError::Decode(format!("{path}: {e}")))?;
        Ok(envelope.data)
    }
}

impl NodeClient for BeaconClient {
    fn events(&self) -> Option<&dyn EventSubscriber> {
        Some(self)
    }
}

#[async_trait]
impl EventSubscriber for BeaconClient {
    fn supported_topics(&self) -> HashMap<String, bool> {
        EVENT_TOPICS
            .iter()
            .map(|&(topic, supported)| (topic.to_string(), supported))
            .collect()
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
        topics: &BTreeSet<String>,
        on_event: EventCallback,
    ) -> Result<(), SubscriptionError> {
        let topics = topics.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        info!(%topics, "opening event stream");

        let response = self
            .client
            .get(format!("{}/eth/v1/events", self.base_url))
            .query(&[("topics", topics.as_str())])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SubscriptionError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let mut stream = Box::pin(response.bytes_stream());
        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("event stream cancelled");
                        break;
                    }
                    chunk = stream.next() => match chunk {
                        Some(Ok(bytes)) => {
                            for event in decoder.push(&bytes) {
                                on_event(event);
                            }
                        }
                        Some(Err(error)) => {
                            warn!(%error, "event stream failed");
                            break;
                        }
                        None => {
                            info!("event stream closed by node");
                            break;
                        }
                    },
                }
            }
        });

        Ok(())
    }
}
