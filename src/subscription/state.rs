use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

/// The two states of the event subscription lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribed,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Unsubscribed => write!(f, "UNSUBSCRIBED"),
            SubscriptionState::Subscribed => write!(f, "SUBSCRIBED"),
        }
    }
}

/// The single live subscription owned by the watchdog.
///
/// `Subscribed` is entered only after a subscribe call succeeds. Leaving it
/// cancels the stream opened for that subscription.
#[derive(Debug)]
pub struct Subscription {
    state: SubscriptionState,
    topics: BTreeSet<String>,
    subscribed_at: Option<DateTime<Utc>>,
    stream: Option<CancellationToken>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    pub fn new() -> Self {
        Self {
            state: SubscriptionState::Unsubscribed,
            topics: BTreeSet::new(),
            subscribed_at: None,
            stream: None,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn topics(&self) -> &BTreeSet<String> {
        &self.topics
    }

    /// True when subscribed and nothing has arrived for longer than `threshold`.
    ///
    /// Silence is measured from the last event. Before any event has arrived it
    /// is measured from the moment the subscription was established.
    pub fn is_stale(
        &self,
        last_event_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        threshold: TimeDelta,
    ) -> bool {
        if self.state != SubscriptionState::Subscribed {
            return false;
        }
        let since = match last_event_at.or(self.subscribed_at) {
            Some(since) => since,
            None => return false,
        };
        now - since > threshold
    }

    pub fn mark_subscribed(
        &mut self,
        topics: BTreeSet<String>,
        now: DateTime<Utc>,
        stream: CancellationToken,
    ) {
        self.state = SubscriptionState::Subscribed;
        self.topics = topics;
        self.subscribed_at = Some(now);
        self.stream = Some(stream);
    }

    pub fn mark_unsubscribed(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.cancel();
        }
        self.state = SubscriptionState::Unsubscribed;
        self.subscribed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold() -> TimeDelta {
        TimeDelta::minutes(5)
    }

    fn subscribed(at: DateTime<Utc>) -> (Subscription, CancellationToken) {
        let mut subscription = Subscription::new();
        let stream = CancellationToken::new();
        subscription.mark_subscribed(["head".to_string()].into(), at, stream.clone());
        (subscription, stream)
    }

    #[test]
    fn starts_unsubscribed() {
        let subscription = Subscription::new();
        assert_eq!(subscription.state(), SubscriptionState::Unsubscribed);
        assert!(subscription.topics().is_empty());
        assert!(!subscription.is_stale(None, Utc::now(), threshold()));
    }

    #[test]
    fn stale_after_threshold() {
        let now = Utc::now();
        let (subscription, _) = subscribed(now - TimeDelta::seconds(600));
        assert!(subscription.is_stale(Some(now - TimeDelta::seconds(301)), now, threshold()));
    }

    #[test]
    fn fresh_within_threshold() {
        let now = Utc::now();
        let (subscription, _) = subscribed(now - TimeDelta::seconds(600));
        assert!(!subscription.is_stale(Some(now - TimeDelta::seconds(299)), now, threshold()));
    }

    #[test]
    fn old_event_makes_recent_subscription_stale() {
        let now = Utc::now();
        let (subscription, _) = subscribed(now - TimeDelta::seconds(60));
        assert!(subscription.is_stale(Some(now - TimeDelta::seconds(301)), now, threshold()));
    }

    #[test]
    fn silence_measured_from_subscribe_time_before_first_event() {
        let now = Utc::now();
        let (subscription, _) = subscribed(now - TimeDelta::seconds(60));
        assert!(!subscription.is_stale(None, now, threshold()));
        assert!(!subscription.is_stale(None, now + TimeDelta::seconds(240), threshold()));
        assert!(subscription.is_stale(None, now + TimeDelta::seconds(241), threshold()));
    }

    #[test]
    fn unsubscribed_is_never_stale() {
        let now = Utc::now();
        let subscription = Subscription::new();
        assert!(!subscription.is_stale(Some(now - TimeDelta::hours(1)), now, threshold()));
    }

    #[test]
    fn unsubscribing_cancels_stream() {
        let (mut subscription, stream) = subscribed(Utc::now());
        assert_eq!(subscription.state(), SubscriptionState::Subscribed);
        assert!(!stream.is_cancelled());

        subscription.mark_unsubscribed();
        assert_eq!(subscription.state(), SubscriptionState::Unsubscribed);
        assert!(stream.is_cancelled());
    }

    #[test]
    fn state_display() {
        assert_eq!(SubscriptionState::Subscribed.to_string(), "SUBSCRIBED");
        assert_eq!(SubscriptionState::Unsubscribed.to_string(), "UNSUBSCRIBED");
    }
}
