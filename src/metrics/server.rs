use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::MetricsSink;
use crate::error::JobError;
use crate::jobs::Job;

/// Serves the registry in text exposition format on `GET /metrics`.
pub struct MetricsServer {
    listen_addr: String,
    sink: MetricsSink,
    listener: Mutex<Option<TcpListener>>,
}

impl MetricsServer {
    pub fn new(listen_addr: impl Into<String>, sink: MetricsSink) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            sink,
            listener: Mutex::new(None),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(scrape))
            .with_state(self.sink.clone())
    }

    /// Serve on an already bound listener until `cancel` fires.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), JobError> {
        if let Ok(local_addr) = listener.local_addr() {
            info!(%local_addr, "metrics server listening");
        }
        axum::serve(listener, self.router())
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(JobError::Serve)
    }
}

async fn scrape(State(sink): State<MetricsSink>) -> impl IntoResponse {
    match sink.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[async_trait]
impl Job for MetricsServer {
    fn name(&self) -> &str {
        "metrics-server"
    }

    async fn start(&self) -> Result<(), JobError> {
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|source| JobError::Bind {
                addr: self.listen_addr.clone(),
                source,
            })?;
        if let Ok(mut slot) = self.listener.lock() {
            *slot = Some(listener);
        }
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) {
        let listener = self.listener.lock().ok().and_then(|mut slot| slot.take());
        let Some(listener) = listener else {
            debug!("metrics server has no bound listener");
            return;
        };
        if let Err(err) = self.serve(listener, cancel).await {
            error!(error = %err, "metrics server stopped");
        }
    }
}
