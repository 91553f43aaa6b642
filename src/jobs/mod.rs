mod beacon;
mod event;
mod fork;
mod general;
mod spec;
mod supervisor;
mod sync;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::beacon::BeaconEvent;

pub use beacon::BeaconJob;
pub use event::{EventActivity, EventJob};
pub use fork::ForkJob;
pub use general::GeneralJob;
pub use spec::SpecJob;
pub use supervisor::{Job, JobStatus, Supervisor};
pub use sync::SyncJob;

/// Receives events forwarded from the node's event stream.
///
/// Called on the stream's delivery task; must not block.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &BeaconEvent);
}

/// Sleep for `period` unless `cancel` fires first. Returns `false` once cancelled.
pub async fn pause(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
