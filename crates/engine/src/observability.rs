//! Observability for the rightsizing engine
//!
//! Provides:
//! - Prometheus metrics (recommendation latency and outcomes, catalog misses,
//!   explanation failures, batch item failures)
//! - Structured event logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Latency buckets in seconds; cost and explanation calls dominate
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    recommendation_latency_seconds: HistogramVec,
    recommendations_total: IntCounterVec,
    catalog_misses_total: IntCounterVec,
    explanation_failures_total: IntCounter,
    batch_item_failures_total: IntCounterVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            recommendation_latency_seconds: register_histogram_vec!(
                "rightsizing_recommendation_latency_seconds",
                "Time spent producing one recommendation",
                &["kind"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register recommendation_latency_seconds"),

            recommendations_total: register_int_counter_vec!(
                "rightsizing_recommendations_total",
                "Recommendations produced, by resource kind and outcome",
                &["kind", "outcome"]
            )
            .expect("Failed to register recommendations_total"),

            catalog_misses_total: register_int_counter_vec!(
                "rightsizing_catalog_misses_total",
                "Cheapest-fit searches that matched no catalog entry",
                &["catalog"]
            )
            .expect("Failed to register catalog_misses_total"),

            explanation_failures_total: register_int_counter!(
                "rightsizing_explanation_failures_total",
                "Explanation requests that failed or timed out"
            )
            .expect("Failed to register explanation_failures_total"),

            batch_item_failures_total: register_int_counter_vec!(
                "rightsizing_batch_item_failures_total",
                "Items of a multi-resource request that failed",
                &["kind"]
            )
            .expect("Failed to register batch_item_failures_total"),
        }
    }
}

/// Outcome label of a recommendation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Recommended,
    CurrentOnly,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Recommended => "recommended",
            Outcome::CurrentOnly => "current_only",
            Outcome::Failed => "failed",
        }
    }
}

/// Handle to the process-wide engine metrics; clones share one registry entry
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_latency(&self, kind: &str, duration_secs: f64) {
        self.inner()
            .recommendation_latency_seconds
            .with_label_values(&[kind])
            .observe(duration_secs);
    }

    pub fn inc_recommendation(&self, kind: &str, outcome: Outcome) {
        self.inner()
            .recommendations_total
            .with_label_values(&[kind, outcome.as_str()])
            .inc();
    }

    pub fn inc_catalog_miss(&self, catalog: &str) {
        self.inner()
            .catalog_misses_total
            .with_label_values(&[catalog])
            .inc();
    }

    pub fn inc_explanation_failure(&self) {
        self.inner().explanation_failures_total.inc();
    }

    pub fn inc_batch_failure(&self, kind: &str) {
        self.inner()
            .batch_item_failures_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn recommendations(&self, kind: &str, outcome: Outcome) -> u64 {
        self.inner()
            .recommendations_total
            .with_label_values(&[kind, outcome.as_str()])
            .get()
    }
}

/// Consistent structured events for recommendation lifecycles
#[derive(Clone)]
pub struct RecommendationLogger {
    node_name: String,
}

impl RecommendationLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_recommendation(
        &self,
        kind: &str,
        resource_id: &str,
        current: &str,
        recommended: Option<&str>,
        current_cost: f64,
        recommended_cost: Option<f64>,
    ) {
        info!(
            event = "recommendation_generated",
            node = %self.node_name,
            kind = %kind,
            resource_id = %resource_id,
            current = %current,
            recommended = ?recommended,
            current_cost = current_cost,
            recommended_cost = ?recommended_cost,
            "Generated rightsizing recommendation"
        );
    }

    /// Container sizing has no price attached
    pub fn log_container_sizing(
        &self,
        resource_id: &str,
        container: &str,
        current: &str,
        recommended: Option<&str>,
    ) {
        info!(
            event = "recommendation_generated",
            node = %self.node_name,
            kind = "kubernetes_container",
            resource_id = %resource_id,
            container = %container,
            current = %current,
            recommended = ?recommended,
            "Generated container sizing"
        );
    }

    pub fn log_failure(&self, kind: &str, resource_id: &str, error: &str) {
        warn!(
            event = "recommendation_failed",
            node = %self.node_name,
            kind = %kind,
            resource_id = %resource_id,
            error = %error,
            "Rightsizing recommendation failed"
        );
    }

    pub fn log_explanation_failure(&self, kind: &str, resource_id: &str, error: &str) {
        warn!(
            event = "explanation_failed",
            node = %self.node_name,
            kind = %kind,
            resource_id = %resource_id,
            error = %error,
            "Explanation unavailable, description left empty"
        );
    }

    pub fn log_startup(&self, version: &str, catalog_entries: usize) {
        info!(
            event = "engine_started",
            node = %self.node_name,
            engine_version = %version,
            catalog_entries = catalog_entries,
            "Rightsizing engine started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Rightsizing engine shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let a = EngineMetrics::new();
        let b = EngineMetrics::new();
        let before = a.recommendations("test_kind", Outcome::CurrentOnly);
        b.inc_recommendation("test_kind", Outcome::CurrentOnly);
        assert_eq!(a.recommendations("test_kind", Outcome::CurrentOnly), before + 1);
    }

    #[test]
    fn test_metrics_appear_in_gather() {
        let metrics = EngineMetrics::new();
        metrics.observe_latency("ec2_instance", 0.01);
        metrics.inc_catalog_miss("ec2_instance_types");
        metrics.inc_explanation_failure();
        metrics.inc_batch_failure("ebs_volume");

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"rightsizing_recommendation_latency_seconds".to_string()));
        assert!(names.contains(&"rightsizing_explanation_failures_total".to_string()));
    }

    #[test]
    fn test_logger_node_name() {
        let logger = RecommendationLogger::new("node-a");
        assert_eq!(logger.node_name(), "node-a");
        logger.log_recommendation("ec2_instance", "i-1", "m5.large", Some("t3.medium"), 70.0, Some(30.0));
        logger.log_failure("ebs_volume", "vol-1", "catalog unavailable");
    }
}
