//! # Prometheus Metrics
//!
//! Counts vault operations by kind and outcome and times them. Printed in
//! the Prometheus text exposition format at the end of a `replay --metrics`
//! run.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Holds all Prometheus metric handles for a run.
#[derive(Clone)]
pub struct VaultMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Vault operations by `operation` and `outcome` (`ok` / `failed`).
    pub operations_total: IntCounterVec,
    /// Script steps executed, of any kind.
    pub steps_total: IntCounter,
    /// Wall-clock latency of vault operations in seconds, by `operation`.
    pub operation_seconds: HistogramVec,
}

impl VaultMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("vault".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Vault operations by kind and outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let steps_total = IntCounter::new("replay_steps_total", "Script steps executed")?;
        registry.register(Box::new(steps_total.clone()))?;

        let operation_seconds = HistogramVec::new(
            HistogramOpts::new("operation_seconds", "Vault operation latency in seconds")
                .buckets(vec![0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            steps_total,
            operation_seconds,
        })
    }

    /// Records one vault operation.
    pub fn observe(&self, operation: &str, ok: bool, elapsed: Duration) {
        let outcome = if ok { "ok" } else { "failed" };
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_seconds
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Count for one `(operation, outcome)` pair.
    pub fn operation_count(&self, operation: &str, ok: bool) -> u64 {
        let outcome = if ok { "ok" } else { "failed" };
        self.operations_total
            .with_label_values(&[operation, outcome])
            .get()
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
