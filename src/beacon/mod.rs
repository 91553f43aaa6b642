pub mod client;
pub mod error;
pub mod sse;
pub mod types;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SubscriptionError;

pub use client::BeaconClient;
pub use error::ClientError;
pub use types::BeaconEvent;

/// Invoked once per delivered event, in delivery order.
pub type EventCallback = Arc<dyn Fn(BeaconEvent) + Send + Sync>;

/// A connection to a consensus node.
pub trait NodeClient: Send + Sync {
    /// The event subscription capability, if this client has one.
    fn events(&self) -> Option<&dyn EventSubscriber>;
}

/// Live subscription to the node's event stream.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Topic names this subscriber can deliver, with whether each is supported.
    fn supported_topics(&self) -> HashMap<String, bool>;

    /// Start delivering events for `topics` to `on_event`.
    ///
    /// Returns once the stream is established; delivery continues in the
    /// background until the stream ends or `cancel` fires.
    async fn subscribe(
        &self,
        cancel: CancellationToken,
        topics: &BTreeSet<String>,
        on_event: EventCallback,
    ) -> Result<(), SubscriptionError>;
}
