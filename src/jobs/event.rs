use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prometheus::{IntCounterVec, IntGauge};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{EventHandler, Job, pause};
use crate::beacon::BeaconEvent;
use crate::metrics::MetricsSink;

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Time of the most recent event delivered by the node.
///
/// Written from the stream's delivery task, read by the watchdog. Never moves
/// backwards.
#[derive(Clone)]
pub struct EventActivity(Arc<watch::Sender<Option<DateTime<Utc>>>>);

impl Default for EventActivity {
    fn default() -> Self {
        Self(Arc::new(watch::channel(None).0))
    }
}

impl EventActivity {
    pub fn record(&self, at: DateTime<Utc>) {
        self.0.send_if_modified(|last| match last {
            Some(previous) if *previous >= at => false,
            _ => {
                *last = Some(at);
                true
            }
        });
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        *self.0.borrow()
    }
}

/// Counts delivered events and tracks how long the stream has been quiet.
pub struct EventJob {
    count: IntCounterVec,
    time_since_last_event: IntGauge,
    activity: EventActivity,
}

impl EventJob {
    pub fn new(sink: &MetricsSink) -> prometheus::Result<Self> {
        Ok(Self {
            count: sink.int_counter_vec(
                "event",
                "count",
                "The count of beacon events received",
                &["name"],
            )?,
            time_since_last_event: sink.int_gauge(
                "event",
                "time_since_last_subscription_event_ms",
                "The amount of time since the last subscription event (in milliseconds)",
            )?,
            activity: EventActivity::default(),
        })
    }

    pub fn activity(&self) -> EventActivity {
        self.activity.clone()
    }

    fn refresh(&self, now: DateTime<Utc>) {
        if let Some(last) = self.activity.last_event_at() {
            self.time_since_last_event
                .set((now - last).num_milliseconds().max(0));
        }
    }
}

impl EventHandler for EventJob {
    fn handle_event(&self, event: &BeaconEvent) {
        self.count.with_label_values(&[event.topic.as_str()]).inc();
        self.activity.record(Utc::now());
    }
}

#[async_trait]
impl Job for EventJob {
    fn name(&self) -> &str {
        "event"
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            self.refresh(Utc::now());
            if !pause(&cancel, REFRESH_INTERVAL).await {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use serde_json::json;

    #[test]
    fn activity_never_moves_backwards() {
        let activity = EventActivity::default();
        assert_eq!(activity.last_event_at(), None);

        let now = Utc::now();
        activity.record(now);
        activity.record(now - TimeDelta::seconds(30));
        assert_eq!(activity.last_event_at(), Some(now));

        let later = now + TimeDelta::seconds(1);
        activity.record(later);
        assert_eq!(activity.last_event_at(), Some(later));
    }

    #[test]
    fn handled_events_are_counted_by_topic() {
        let sink = MetricsSink::new("eth");
        let job = EventJob::new(&sink).unwrap();

        job.handle_event(&BeaconEvent::new("head", json!({})));
        job.handle_event(&BeaconEvent::new("head", json!({})));
        job.handle_event(&BeaconEvent::new("block", json!({})));

        assert_eq!(job.count.with_label_values(&["head"]).get(), 2);
        assert_eq!(job.count.with_label_values(&["block"]).get(), 1);
        assert!(job.activity().last_event_at().is_some());
    }

    #[test]
    fn refresh_reports_quiet_time() {
        let sink = MetricsSink::new("eth");
        let job = EventJob::new(&sink).unwrap();
        let last = Utc::now();
        job.activity.record(last);

        job.refresh(last + TimeDelta::milliseconds(1500));
        assert_eq!(job.time_since_last_event.get(), 1500);
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let sink = MetricsSink::new("eth");
        let job = EventJob::new(&sink).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        job.run(cancel).await;
    }
}
