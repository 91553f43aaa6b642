//! Request/response shapes for the beacon node HTTP API.
//!
//! The API wraps every payload in `{"data": ...}` and encodes integers as
//! decimal strings, so numeric fields go through `quoted`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Envelope used by every beacon API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// One event delivered by the node's event stream.
///
/// The payload is kept opaque; handlers pick the fields they understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconEvent {
    pub topic: String,
    pub data: serde_json::Value,
}

impl BeaconEvent {
    pub fn new(topic: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            data,
        }
    }

    /// Read an integer field that may be encoded as a string or a number.
    pub fn quantity(&self, field: &str) -> Option<u64> {
        match self.data.get(field)? {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeVersion {
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerCount {
    #[serde(deserialize_with = "quoted")]
    pub disconnected: u64,
    #[serde(deserialize_with = "quoted")]
    pub connecting: u64,
    #[serde(deserialize_with = "quoted")]
    pub connected: u64,
    #[serde(deserialize_with = "quoted")]
    pub disconnecting: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncStatus {
    #[serde(deserialize_with = "quoted")]
    pub head_slot: u64,
    #[serde(deserialize_with = "quoted")]
    pub sync_distance: u64,
    pub is_syncing: bool,
}

impl SyncStatus {
    pub fn estimated_highest_slot(&self) -> u64 {
        self.head_slot + self.sync_distance
    }

    pub fn percentage(&self) -> f64 {
        let highest = self.estimated_highest_slot();
        if highest == 0 {
            return 100.0;
        }
        self.head_slot as f64 / highest as f64 * 100.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeaderResponse {
    pub header: SignedHeader,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedHeader {
    pub message: HeaderMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeaderMessage {
    #[serde(deserialize_with = "quoted")]
    pub slot: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Checkpoint {
    #[serde(deserialize_with = "quoted")]
    pub epoch: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalityCheckpoints {
    pub previous_justified: Checkpoint,
    pub current_justified: Checkpoint,
    pub finalized: Checkpoint,
}

/// Chain configuration as reported by `/eth/v1/config/spec`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ChainSpec(pub BTreeMap<String, serde_json::Value>);

impl ChainSpec {
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    /// Fork activation epochs, keyed by lowercase fork name (`altair`, `bellatrix`, ...).
    pub fn fork_epochs(&self) -> BTreeMap<String, u64> {
        self.0
            .keys()
            .filter_map(|key| {
                let fork = key.strip_suffix("_FORK_EPOCH")?;
                Some((fork.to_lowercase(), self.get_u64(key)?))
            })
            .collect()
    }
}

fn quoted<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Str(String),
        Num(u64),
    }

    match Quantity::deserialize(deserializer)? {
        Quantity::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Quantity::Num(n) => Ok(n),
    }
}
