//! Prometheus metrics using the prometheus-client crate.
//!
//! Exported in OpenMetrics text format by the server's `/metrics` route.
//! All label values are drawn from fixed sets (transport names, error
//! kinds), so cardinality is bounded.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Labels for completed orchestration runs.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    /// "gateway", "fallback", or "manual"
    pub method: String,
    /// "success" or "manual_fallback"
    pub outcome: String,
}

/// Labels for individual transport attempts.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AttemptLabels {
    /// "directory", "gateway", or "fallback"
    pub transport: String,
    /// "ok" or an error kind such as "gateway_timeout"
    pub result: String,
}

/// Run durations span a fast gateway hit up to two watchdogs plus fallback.
const RUN_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0];

/// Metrics for the approval relay.
#[derive(Clone)]
pub struct RelayMetrics {
    pub approvals_total: Family<OutcomeLabels, Counter>,
    pub attempts_total: Family<AttemptLabels, Counter>,
    pub run_duration_seconds: Histogram,
}

impl RelayMetrics {
    /// Create and register all metrics.
    pub fn new(registry: &mut Registry) -> Self {
        let approvals_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "pairgate_approvals",
            "Completed approval runs by method and outcome",
            approvals_total.clone(),
        );

        let attempts_total = Family::<AttemptLabels, Counter>::default();
        registry.register(
            "pairgate_transport_attempts",
            "Directory, gateway and fallback attempts by result",
            attempts_total.clone(),
        );

        let run_duration_seconds = Histogram::new(RUN_DURATION_BUCKETS.iter().copied());
        registry.register(
            "pairgate_run_duration_seconds",
            "Wall-clock duration of one approval run",
            run_duration_seconds.clone(),
        );

        Self {
            approvals_total,
            attempts_total,
            run_duration_seconds,
        }
    }

    pub fn record_attempt(&self, transport: &str, result: &str) {
        self.attempts_total
            .get_or_create(&AttemptLabels {
                transport: transport.to_string(),
                result: result.to_string(),
            })
            .inc();
    }

    pub fn record_outcome(&self, method: &str, outcome: &str, duration_secs: f64) {
        self.approvals_total
            .get_or_create(&OutcomeLabels {
                method: method.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.run_duration_seconds.observe(duration_secs);
    }
}
