//! Prometheus metrics shared by every component
//!
//! - `validation_records_total` (counter) - Records by table and outcome
//! - `validation_violations_total` (counter) - Violations by table and code
//! - `metric_computations_total` (counter) - Computations by metric and outcome
//! - `metric_compute_duration_seconds` (histogram) - Compute duration by metric
//! - `gold_publications_total` (counter) - Publications by table and outcome
//! - `contract_decisions_total` (counter) - Enforcer decisions by class and decision
//! - `audit_failures_total` (counter) - Audit sink write failures
//! - `scheduler_alerts_total` (counter) - Escalated metric failures
//! - `bronze_events_total` (counter) - Bronze events by type and outcome
//!
//! All components take an `Arc<PlatformMetrics>` so that a single registry
//! is exported on `/metrics`.

use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{CoreError, Result};

const NAMESPACE: &str = "bnpl_gold";

/// Platform metrics for Prometheus
pub struct PlatformMetrics {
    registry: Arc<Registry>,
    records_total: CounterVec,
    violations_total: CounterVec,
    computations_total: CounterVec,
    compute_duration_seconds: HistogramVec,
    publications_total: CounterVec,
    decisions_total: CounterVec,
    audit_failures_total: Counter,
    alerts_total: CounterVec,
    bronze_events_total: CounterVec,
}

impl PlatformMetrics {
    /// Create metrics on a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create metrics and register them with the provided registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let records_total = CounterVec::new(
            Opts::new("validation_records_total", "Silver records validated").namespace(NAMESPACE),
            &["table", "outcome"],
        )?;

        let violations_total = CounterVec::new(
            Opts::new("validation_violations_total", "Record violations by code")
                .namespace(NAMESPACE),
            &["table", "code"],
        )?;

        let computations_total = CounterVec::new(
            Opts::new("metric_computations_total", "Metric computations by outcome")
                .namespace(NAMESPACE),
            &["metric", "outcome"],
        )?;

        let compute_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "metric_compute_duration_seconds",
                "Metric computation duration in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["metric"],
        )?;

        let publications_total = CounterVec::new(
            Opts::new("gold_publications_total", "Gold partition publications")
                .namespace(NAMESPACE),
            &["table", "outcome"],
        )?;

        let decisions_total = CounterVec::new(
            Opts::new("contract_decisions_total", "Contract enforcer decisions")
                .namespace(NAMESPACE),
            &["consumer_class", "decision"],
        )?;

        let audit_failures_total = Counter::with_opts(
            Opts::new("audit_failures_total", "Query log writes that failed").namespace(NAMESPACE),
        )?;

        let alerts_total = CounterVec::new(
            Opts::new("scheduler_alerts_total", "Metric failures escalated to alerts")
                .namespace(NAMESPACE),
            &["metric"],
        )?;

        let bronze_events_total = CounterVec::new(
            Opts::new("bronze_events_total", "Bronze events processed").namespace(NAMESPACE),
            &["event_type", "outcome"],
        )?;

        registry.register(Box::new(records_total.clone()))?;
        registry.register(Box::new(violations_total.clone()))?;
        registry.register(Box::new(computations_total.clone()))?;
        registry.register(Box::new(compute_duration_seconds.clone()))?;
        registry.register(Box::new(publications_total.clone()))?;
        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(audit_failures_total.clone()))?;
        registry.register(Box::new(alerts_total.clone()))?;
        registry.register(Box::new(bronze_events_total.clone()))?;

        Ok(Self {
            registry,
            records_total,
            violations_total,
            computations_total,
            compute_duration_seconds,
            publications_total,
            decisions_total,
            audit_failures_total,
            alerts_total,
            bronze_events_total,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Record the outcome of validating one record
    pub fn record_validation(&self, table: &str, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        self.records_total.with_label_values(&[table, outcome]).inc();
    }

    /// Record one violation
    pub fn record_violation(&self, table: &str, code: &str) {
        self.violations_total.with_label_values(&[table, code]).inc();
    }

    /// Record a metric computation outcome (`ok`, `no_data`, or an error code)
    pub fn record_computation(&self, metric: &str, outcome: &str) {
        self.computations_total
            .with_label_values(&[metric, outcome])
            .inc();
    }

    /// Observe compute duration
    pub fn observe_compute_duration(&self, metric: &str, duration_secs: f64) {
        self.compute_duration_seconds
            .with_label_values(&[metric])
            .observe(duration_secs);
    }

    /// Record a Gold publication (`published`, `unchanged`, `conflict`)
    pub fn record_publication(&self, table: &str, outcome: &str) {
        self.publications_total
            .with_label_values(&[table, outcome])
            .inc();
    }

    /// Record an enforcer decision (`allowed`, `denied`, `masked`)
    pub fn record_decision(&self, consumer_class: &str, decision: &str) {
        self.decisions_total
            .with_label_values(&[consumer_class, decision])
            .inc();
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures_total.inc();
    }

    pub fn record_alert(&self, metric: &str) {
        self.alerts_total.with_label_values(&[metric]).inc();
    }

    /// Record a Bronze event (`converted`, `skipped`, `malformed`)
    pub fn record_bronze_event(&self, event_type: &str, outcome: &str) {
        self.bronze_events_total
            .with_label_values(&[event_type, outcome])
            .inc();
    }

    /// Start a compute timer (records duration on drop)
    pub fn start_compute_timer(&self, metric: &str) -> ComputeTimer<'_> {
        ComputeTimer {
            start: Instant::now(),
            metric: metric.to_string(),
            metrics: self,
        }
    }

    /// Encode all metrics as text for scraping
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| CoreError::MetricsError(prometheus::Error::Msg(e.to_string())))
    }
}

/// RAII guard for timing metric computations
pub struct ComputeTimer<'a> {
    start: Instant,
    metric: String,
    metrics: &'a PlatformMetrics,
}

impl<'a> Drop for ComputeTimer<'a> {
    fn drop(&mut self) {
        self.metrics
            .observe_compute_duration(&self.metric, self.start.elapsed().as_secs_f64());
    }
}
