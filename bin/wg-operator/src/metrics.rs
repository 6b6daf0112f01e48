//! Prometheus metrics of the reconcile loops

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use wg_core::Outcome;

#[derive(Clone)]
pub struct Metrics {
    /// Reconcile passes by controller and outcome
    pub reconciliations_total: CounterVec,
    /// Failed reconcile passes by controller
    pub reconcile_errors_total: CounterVec,
    /// Reconcile pass duration in seconds
    pub reconcile_duration_seconds: HistogramVec,
    registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let reconciliations_total = CounterVec::new(
            Opts::new("wireguard_reconciliations_total", "Total reconcile passes"),
            &["controller", "outcome"],
        )?;

        let reconcile_errors_total = CounterVec::new(
            Opts::new("wireguard_reconcile_errors_total", "Total failed reconcile passes"),
            &["controller"],
        )?;

        let reconcile_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "wireguard_reconcile_duration_seconds",
                "Reconcile pass duration in seconds",
            ),
            &["controller"],
        )?;

        registry.register(Box::new(reconciliations_total.clone()))?;
        registry.register(Box::new(reconcile_errors_total.clone()))?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;

        Ok(Self {
            reconciliations_total,
            reconcile_errors_total,
            reconcile_duration_seconds,
            registry,
        })
    }

    pub fn observe(&self, controller: &str, outcome: &Outcome, elapsed: Duration) {
        self.reconciliations_total
            .with_label_values(&[controller, outcome.label()])
            .inc();
        self.reconcile_duration_seconds
            .with_label_values(&[controller])
            .observe(elapsed.as_secs_f64());
    }

    pub fn error(&self, controller: &str) {
        self.reconcile_errors_total
            .with_label_values(&[controller])
            .inc();
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wg_core::WaitReason;

    #[test]
    fn test_observed_outcomes_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.observe(
            "wireguard",
            &Outcome::Waiting(WaitReason::EndpointPending),
            Duration::from_millis(12),
        );
        metrics.error("wireguardpeer");

        let text = metrics.gather().unwrap();
        assert!(text.contains(
            r#"wireguard_reconciliations_total{controller="wireguard",outcome="waiting"} 1"#
        ));
        assert!(text.contains(r#"wireguard_reconcile_errors_total{controller="wireguardpeer"} 1"#));
        assert!(text.contains("wireguard_reconcile_duration_seconds_count"));
    }

    #[test]
    fn test_clones_share_registry() {
        let metrics = Metrics::new().unwrap();
        metrics.clone().error("wireguard");
        assert!(metrics
            .gather()
            .unwrap()
            .contains(r#"wireguard_reconcile_errors_total{controller="wireguard"} 1"#));
    }
}
