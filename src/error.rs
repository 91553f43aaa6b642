use std::path::PathBuf;

use thiserror::Error;

use crate::beacon::ClientError;

/// A job could not start. The job stays inert for the rest of the process.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("beacon node request failed: {0}")]
    Client(#[from] ClientError),

    #[error("metric registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Subscribing to the node's event stream failed; retried on the next watchdog tick.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("client does not support event subscriptions")]
    Unsupported,

    #[error("event stream returned status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("event stream request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("subscription cancelled")]
    Cancelled,
}

/// A monitored path could not be measured for the current cycle.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_error_display() {
        let err = SubscriptionError::Rejected {
            status: 503,
            message: "node is syncing".into(),
        };
        assert_eq!(
            err.to_string(),
            "event stream returned status 503: node is syncing"
        );
        assert_eq!(
            SubscriptionError::Unsupported.to_string(),
            "client does not support event subscriptions"
        );
    }

    #[test]
    fn path_error_includes_path() {
        let err = PathError::Stat {
            path: PathBuf::from("/data/missing"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("failed to stat /data/missing"));
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JobError>();
        assert_send_sync::<SubscriptionError>();
        assert_send_sync::<PathError>();
    }
}
