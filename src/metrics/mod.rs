//! Shared Prometheus registry and the `/metrics` scrape endpoint.

mod server;

use std::collections::HashMap;

use prometheus::{
    Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub use server::MetricsServer;

/// Concurrency-safe registry handle.
///
/// Every metric registered through a sink gets the sink's namespace and
/// constant labels. Clones share the same underlying registry.
#[derive(Clone)]
pub struct MetricsSink {
    registry: Registry,
    namespace: String,
    const_labels: HashMap<String, String>,
}

impl MetricsSink {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(),
            namespace: namespace.into(),
            const_labels: HashMap::new(),
        }
    }

    /// A sink on the same registry whose metrics also carry `labels`.
    pub fn with_const_labels<K, V>(&self, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut const_labels = self.const_labels.clone();
        const_labels.extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self {
            registry: self.registry.clone(),
            namespace: self.namespace.clone(),
            const_labels,
        }
    }

    fn opts(&self, subsystem: &str, name: &str, help: &str) -> Opts {
        Opts::new(name, help)
            .namespace(self.namespace.clone())
            .subsystem(subsystem)
            .const_labels(self.const_labels.clone())
    }

    pub fn int_gauge(&self, subsystem: &str, name: &str, help: &str) -> prometheus::Result<IntGauge> {
        let gauge = IntGauge::with_opts(self.opts(subsystem, name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    pub fn gauge(&self, subsystem: &str, name: &str, help: &str) -> prometheus::Result<Gauge> {
        let gauge = Gauge::with_opts(self.opts(subsystem, name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    pub fn int_counter(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
    ) -> prometheus::Result<IntCounter> {
        let counter = IntCounter::with_opts(self.opts(subsystem, name, help))?;
        self.registry.register(Box::new(counter.clone()))?;
        Ok(counter)
    }

    pub fn int_gauge_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> prometheus::Result<IntGaugeVec> {
        let gauge = IntGaugeVec::new(self.opts(subsystem, name, help), labels)?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    pub fn gauge_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> prometheus::Result<GaugeVec> {
        let gauge = GaugeVec::new(self.opts(subsystem, name, help), labels)?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    pub fn int_counter_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> prometheus::Result<IntCounterVec> {
        let counter = IntCounterVec::new(self.opts(subsystem, name, help), labels)?;
        self.registry.register(Box::new(counter.clone()))?;
        Ok(counter)
    }

    /// Render everything registered so far in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
