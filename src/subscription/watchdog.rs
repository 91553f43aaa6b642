use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::state::{Subscription, SubscriptionState};
use crate::beacon::{BeaconEvent, EventCallback, NodeClient};
use crate::error::SubscriptionError;
use crate::jobs::{EventActivity, EventHandler, Job, pause};

/// How often the watchdog checks the subscription.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Silence longer than this while subscribed forces a resubscribe.
const STALE_AFTER_SECS: i64 = 5 * 60;

/// Advertised by nodes but not consumed; known to break some clients' streams.
const EXCLUDED_TOPIC: &str = "contribution_and_proof";

/// Every supported topic except the excluded one.
pub fn select_topics(supported: &HashMap<String, bool>) -> BTreeSet<String> {
    supported
        .iter()
        .filter(|&(topic, &is_supported)| is_supported && topic != EXCLUDED_TOPIC)
        .map(|(topic, _)| topic.clone())
        .collect()
}

/// Keeps one live event subscription open against the node.
///
/// Each tick drops a subscription that has gone quiet and, while
/// unsubscribed, tries to subscribe again. Failures are retried on the next
/// tick at the same fixed rate, forever.
pub struct Watchdog {
    client: Option<Arc<dyn NodeClient>>,
    activity: EventActivity,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl Watchdog {
    pub fn new(
        client: Option<Arc<dyn NodeClient>>,
        activity: EventActivity,
        handlers: Vec<Arc<dyn EventHandler>>,
    ) -> Self {
        Self {
            client,
            activity,
            handlers,
        }
    }

    /// Run one iteration of the subscription lifecycle.
    pub async fn tick(
        &self,
        subscription: &mut Subscription,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SubscriptionState {
        let last_event_at = self.activity.last_event_at();
        if subscription.is_stale(last_event_at, now, TimeDelta::seconds(STALE_AFTER_SECS)) {
            info!(
                last_event_at = ?last_event_at,
                topics = ?subscription.topics(),
                "haven't received any events for 5 minutes, re-subscribing"
            );
            subscription.mark_unsubscribed();
        }

        if subscription.state() == SubscriptionState::Unsubscribed {
            if let Some(client) = &self.client {
                match self.subscribe(client.as_ref(), cancel).await {
                    Ok((topics, stream)) => {
                        info!(topics = ?topics, "subscribed to beacon node events");
                        subscription.mark_subscribed(topics, now, stream);
                    }
                    Err(SubscriptionError::Cancelled) => debug!("subscribe abandoned on shutdown"),
                    Err(err) => error!(error = %err, "failed to subscribe to beacon node events"),
                }
            }
        }

        subscription.state()
    }

    async fn subscribe(
        &self,
        client: &dyn NodeClient,
        cancel: &CancellationToken,
    ) -> Result<(BTreeSet<String>, CancellationToken), SubscriptionError> {
        info!("starting subscriptions");
        let subscriber = client.events().ok_or(SubscriptionError::Unsupported)?;
        let topics = select_topics(&subscriber.supported_topics());

        let stream = cancel.child_token();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(SubscriptionError::Cancelled),
            result = subscriber.subscribe(stream.clone(), &topics, self.delivery()) => result,
        };
        if let Err(err) = result {
            stream.cancel();
            return Err(err);
        }
        Ok((topics, stream))
    }

    fn delivery(&self) -> EventCallback {
        let handlers = self.handlers.clone();
        Arc::new(move |event: BeaconEvent| {
            for handler in &handlers {
                handler.handle_event(&event);
            }
        })
    }
}

#[async_trait]
impl Job for Watchdog {
    fn name(&self) -> &str {
        "watchdog"
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut subscription = Subscription::new();
        loop {
            self.tick(&mut subscription, Utc::now(), &cancel).await;
            if !pause(&cancel, POLL_INTERVAL).await {
                subscription.mark_unsubscribed();
                return;
            }
        }
    }
}
