use std::sync::Arc;
use std::time::Instant;

use burstguard_common::AppConfig;
use burstguard_detect::{BurstGuard, Decision, RejectCode};
use chrono::{DateTime, Utc};
use prometheus::{HistogramOpts, HistogramVec, IntCounter, Opts, Registry};

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Central admin state: configuration, the live engine and the metrics the
/// proxy records into.
pub struct AppState {
    pub config: AppConfig,
    pub engine: BurstGuard,
    pub metrics: Arc<GatewayMetrics>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

/// Prometheus metrics collected by the gateway.
pub struct GatewayMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub requests_allowed: IntCounter,
    pub micro_burst_rejections: IntCounter,
    pub anomaly_rejections: IntCounter,
    pub request_duration: HistogramVec,
}

impl GatewayMetrics {
    /// Create all counters and histograms and register them against a fresh
    /// Prometheus registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "burstguard_requests_total",
            "Total number of requests evaluated",
        ))?;
        let requests_allowed = IntCounter::with_opts(Opts::new(
            "burstguard_requests_allowed",
            "Total number of requests admitted",
        ))?;
        let micro_burst_rejections = IntCounter::with_opts(Opts::new(
            "burstguard_rejections_micro_burst",
            "Total number of requests rejected for a micro-burst",
        ))?;
        let anomaly_rejections = IntCounter::with_opts(Opts::new(
            "burstguard_rejections_anomaly",
            "Total number of requests rejected for an anomaly score over threshold",
        ))?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "burstguard_request_duration_seconds",
                "Request duration in seconds, by admission outcome",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_allowed.clone()))?;
        registry.register(Box::new(micro_burst_rejections.clone()))?;
        registry.register(Box::new(anomaly_rejections.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            requests_allowed,
            micro_burst_rejections,
            anomaly_rejections,
            request_duration,
        })
    }

    /// Count an admission decision.
    pub fn record_decision(&self, decision: &Decision) {
        self.requests_total.inc();
        match decision.rejection().map(|r| r.code) {
            None => self.requests_allowed.inc(),
            Some(RejectCode::MicroBurst) => self.micro_burst_rejections.inc(),
            Some(RejectCode::AnomalyDetected) => self.anomaly_rejections.inc(),
        }
    }

    /// Record how long a request took end to end.
    pub fn observe_duration(&self, rejected: Option<RejectCode>, secs: f64) {
        let outcome = match rejected {
            None => "allow",
            Some(RejectCode::MicroBurst) => "micro_burst",
            Some(RejectCode::AnomalyDetected) => "anomaly_detected",
        };
        self.request_duration
            .with_label_values(&[outcome])
            .observe(secs);
    }
}

impl AppState {
    pub fn new(config: AppConfig, engine: BurstGuard, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            config,
            engine,
            metrics,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burstguard_detect::Rejection;

    #[test]
    fn decisions_are_counted_by_outcome() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.record_decision(&Decision::Allow);
        metrics.record_decision(&Decision::Reject(Rejection {
            code: RejectCode::MicroBurst,
            message: RejectCode::MicroBurst.message(),
            details: None,
        }));

        assert_eq!(metrics.requests_total.get(), 2);
        assert_eq!(metrics.requests_allowed.get(), 1);
        assert_eq!(metrics.micro_burst_rejections.get(), 1);
        assert_eq!(metrics.anomaly_rejections.get(), 0);
    }

    #[test]
    fn durations_are_labelled() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.observe_duration(Some(RejectCode::AnomalyDetected), 0.002);
        let count = metrics
            .request_duration
            .with_label_values(&["anomaly_detected"])
            .get_sample_count();
        assert_eq!(count, 1);
    }
}
