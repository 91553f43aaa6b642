use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::error::JobError;

/// An independently scheduled unit of metrics collection.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// One-time startup work. An error leaves the job inert for the rest of the process.
    async fn start(&self) -> Result<(), JobError> {
        Ok(())
    }

    /// Periodic work after a successful start, until `cancel` fires.
    async fn run(&self, cancel: CancellationToken);
}

/// Lifecycle status of a supervised job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    NotStarted,
    Running,
    Failed(String),
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::NotStarted => write!(f, "not started"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

struct Supervised {
    job: Arc<dyn Job>,
    status: Arc<watch::Sender<JobStatus>>,
}

/// Launches a fixed set of jobs, each on its own task.
///
/// A job whose start fails is logged and left inert. Nothing is retried and
/// no failure reaches the other jobs.
pub struct Supervisor {
    jobs: Vec<Supervised>,
    tracker: TaskTracker,
}

impl Supervisor {
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        let jobs = jobs
            .into_iter()
            .map(|job| Supervised {
                job,
                status: Arc::new(watch::channel(JobStatus::NotStarted).0),
            })
            .collect();
        Self {
            jobs,
            tracker: TaskTracker::new(),
        }
    }

    pub fn start(&self, cancel: &CancellationToken) {
        info!(jobs = self.jobs.len(), "starting jobs");
        for supervised in &self.jobs {
            let job = Arc::clone(&supervised.job);
            let status = Arc::clone(&supervised.status);
            let cancel = cancel.clone();
            self.tracker.spawn(async move {
                match cancel.run_until_cancelled(job.start()).await {
                    None => debug!(job = job.name(), "cancelled before start"),
                    Some(Err(err)) => {
                        error!(job = job.name(), error = %err, "failed to start job");
                        status.send_replace(JobStatus::Failed(err.to_string()));
                    }
                    Some(Ok(())) => {
                        status.send_replace(JobStatus::Running);
                        debug!(job = job.name(), "job running");
                        job.run(cancel).await;
                        debug!(job = job.name(), "job stopped");
                    }
                }
            });
        }
    }

    /// Current status of every job, in registration order.
    pub fn statuses(&self) -> Vec<(String, JobStatus)> {
        self.jobs
            .iter()
            .map(|s| (s.job.name().to_string(), s.status.borrow().clone()))
            .collect()
    }

    /// Wait for every job task to finish. Call after cancelling.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
