use burstguard_common::DetectionConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::allowlist::Allowlist;
use crate::detectors::{DetectorSet, Factor};
use crate::identity::resolve_client_key;
use crate::ledger::{AnomalyLedger, AnomalySnapshot};
use crate::signature::build_signature;
use crate::window::SlidingWindowTracker;

/// The parts of an inbound HTTP request the engine looks at.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub method: &'a str,
    /// Request path, optionally with a query string.
    pub path: &'a str,
    /// Request headers as (name, value) pairs.
    pub headers: &'a [(String, String)],
    /// Transport peer address, with or without a port.
    pub peer_addr: Option<&'a str>,
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    MicroBurst,
    AnomalyDetected,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::MicroBurst => "MICRO_BURST",
            RejectCode::AnomalyDetected => "ANOMALY_DETECTED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RejectCode::MicroBurst => "Excessive request rate detected. Please slow down.",
            RejectCode::AnomalyDetected => {
                "Suspicious activity detected. Your IP has been temporarily blocked."
            }
        }
    }

    /// HTTP status the dispatch layer should answer with.
    pub fn http_status(&self) -> u16 {
        429
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub code: RejectCode,
    pub message: &'static str,
    /// Only populated for anomaly blocks when diagnostics are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<AnomalySnapshot>,
}

impl Rejection {
    fn new(code: RejectCode, details: Option<AnomalySnapshot>) -> Self {
        Self {
            code,
            message: code.message(),
            details,
        }
    }
}

/// Admission outcome for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject(Rejection),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Decision::Allow => None,
            Decision::Reject(rejection) => Some(rejection),
        }
    }
}

/// The detection settings in effect, as reported by [`BurstGuard::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationEcho {
    pub window_size_ms: u64,
    pub micro_burst_interval_ms: u64,
    pub micro_burst_threshold: usize,
    pub sustained_burst_threshold: usize,
    pub pattern_min_requests: usize,
    pub pattern_ratio: f64,
    pub block_threshold: u32,
    pub max_age_secs: u64,
    pub janitor_interval_secs: u64,
    pub decay_step: u32,
}

impl From<&DetectionConfig> for ConfigurationEcho {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            window_size_ms: config.window_size_ms,
            micro_burst_interval_ms: config.micro_burst_interval_ms,
            micro_burst_threshold: config.micro_burst_threshold,
            sustained_burst_threshold: config.sustained_burst_threshold,
            pattern_min_requests: config.pattern_min_requests,
            pattern_ratio: config.pattern_ratio,
            block_threshold: config.block_threshold,
            max_age_secs: config.max_age_secs,
            janitor_interval_secs: config.janitor_interval_secs,
            decay_step: config.decay_step,
        }
    }
}

/// Read-only snapshot for operational monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub tracked_clients: usize,
    pub whitelisted_clients: usize,
    pub anomalies_detected: usize,
    pub total_anomaly_score: u64,
    pub configuration: ConfigurationEcho,
}

/// Request-level burst and abuse detection engine.
///
/// Cheaply cloneable (backed by `Arc`); every clone shares the same windows,
/// ledger and allowlist. Hand one clone to the request path and one to the
/// janitor.
#[derive(Clone)]
pub struct BurstGuard {
    pub(crate) inner: Arc<BurstGuardInner>,
}

pub(crate) struct BurstGuardInner {
    pub(crate) config: DetectionConfig,
    pub(crate) detectors: DetectorSet,
    pub(crate) windows: SlidingWindowTracker,
    pub(crate) ledger: AnomalyLedger,
    pub(crate) allowlist: Allowlist,
}

impl BurstGuard {
    /// Build an engine from its configuration. Keys in `config.allowlist` are
    /// allowlisted up front.
    pub fn new(config: DetectionConfig) -> Self {
        info!(
            window_size_ms = config.window_size_ms,
            block_threshold = config.block_threshold,
            allowlisted = config.allowlist.len(),
            "creating burst detection engine"
        );

        let inner = BurstGuardInner {
            detectors: DetectorSet::from_config(&config),
            windows: SlidingWindowTracker::new(
                config.window_size(),
                config.micro_burst_interval(),
            ),
            ledger: AnomalyLedger::new(),
            allowlist: config.allowlist.iter().collect(),
            config,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Decide whether to admit `request`, using the current time.
    pub fn evaluate(&self, request: &InboundRequest<'_>) -> Decision {
        self.evaluate_at(request, Instant::now())
    }

    /// Decide whether to admit `request` as if it arrived at `now`.
    ///
    /// The request is recorded in the client's window even when it ends up
    /// rejected, so the window reflects the real arrival rate.
    pub fn evaluate_at(&self, request: &InboundRequest<'_>, now: Instant) -> Decision {
        let inner = &self.inner;
        let client_key = resolve_client_key(request.headers, request.peer_addr);

        if inner.allowlist.contains(&client_key) {
            trace!(client_key = %client_key, "allowlisted client, skipping detection");
            return Decision::Allow;
        }

        let signature = build_signature(request.method, request.path, request.headers);
        let window = inner.windows.record(&client_key, &signature, now);
        let findings = inner.detectors.evaluate(&window);

        for finding in &findings {
            debug!(
                client_key = %client_key,
                factor = %finding.factor,
                points = finding.points,
                total = window.total,
                recent = window.recent,
                "anomaly detector fired"
            );
        }

        let anomaly = inner.ledger.accumulate(&client_key, &findings, now);

        if let Some(anomaly) = anomaly.filter(|a| a.score >= inner.config.block_threshold) {
            warn!(
                client_key = %client_key,
                score = anomaly.score,
                factors = ?anomaly.factors,
                "request blocked: anomaly score over threshold"
            );
            let details = inner.config.diagnostics.then_some(anomaly);
            return Decision::Reject(Rejection::new(RejectCode::AnomalyDetected, details));
        }

        if findings.iter().any(|f| f.factor == Factor::MicroBurst) {
            warn!(
                client_key = %client_key,
                recent = window.recent,
                "request blocked: micro-burst"
            );
            return Decision::Reject(Rejection::new(RejectCode::MicroBurst, None));
        }

        Decision::Allow
    }

    /// Add `client_key` to the allowlist. Returns `false` if it was already there.
    pub fn whitelist(&self, client_key: &str) -> bool {
        let added = self.inner.allowlist.insert(client_key);
        if added {
            info!(client_key, "client allowlisted");
        }
        added
    }

    /// Remove `client_key` from the allowlist. Returns `false` if it was not there.
    pub fn unwhitelist(&self, client_key: &str) -> bool {
        let removed = self.inner.allowlist.remove(client_key);
        if removed {
            info!(client_key, "client removed from allowlist");
        }
        removed
    }

    pub fn is_whitelisted(&self, client_key: &str) -> bool {
        self.inner.allowlist.contains(client_key)
    }

    pub fn whitelisted_clients(&self) -> Vec<String> {
        self.inner.allowlist.entries()
    }

    /// Whether a sliding window currently exists for `client_key`.
    pub fn is_tracked(&self, client_key: &str) -> bool {
        self.inner.windows.contains(client_key)
    }

    /// Current anomaly score and factors for `client_key`, if it has any.
    pub fn anomaly(&self, client_key: &str) -> Option<AnomalySnapshot> {
        self.inner.ledger.snapshot(client_key)
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            tracked_clients: self.inner.windows.len(),
            whitelisted_clients: self.inner.allowlist.len(),
            anomalies_detected: self.inner.ledger.len(),
            total_anomaly_score: self.inner.ledger.total_score(),
            configuration: ConfigurationEcho::from(&self.inner.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request<'a>(path: &'a str, headers: &'a [(String, String)]) -> InboundRequest<'a> {
        InboundRequest {
            method: "POST",
            path,
            headers,
            peer_addr: Some("203.0.113.10:40000"),
        }
    }

    #[test]
    fn first_contact_is_allowed() {
        let guard = BurstGuard::new(DetectionConfig::default());
        let decision = guard.evaluate(&request("/v1/charges", &[]));
        assert!(decision.is_allowed());
        assert!(guard.is_tracked("203.0.113.10"));
        assert!(guard.anomaly("203.0.113.10").is_none());
    }

    #[test]
    fn configured_allowlist_bypasses_tracking() {
        let config = DetectionConfig {
            allowlist: vec!["203.0.113.10".to_string()],
            ..DetectionConfig::default()
        };
        let guard = BurstGuard::new(config);
        let now = Instant::now();

        for i in 0..50 {
            let path = format!("/v1/charges/{}", i);
            assert!(guard.evaluate_at(&request(&path, &[]), now).is_allowed());
        }
        assert!(!guard.is_tracked("203.0.113.10"));
        assert_eq!(guard.stats().whitelisted_clients, 1);
    }

    #[test]
    fn anomaly_block_outlasts_calm_traffic_until_decay() {
        let config = DetectionConfig {
            diagnostics: true,
            ..DetectionConfig::default()
        };
        let guard = BurstGuard::new(config);
        let start = Instant::now();
        let key = "203.0.113.10";

        guard.inner.ledger.add_score(key, 30, Factor::SustainedBurst, start);
        guard.inner.ledger.add_score(key, 30, Factor::SustainedBurst, start);
        guard.inner.ledger.add_score(key, 50, Factor::MicroBurst, start);

        let decision = guard.evaluate_at(&request("/v1/charges", &[]), start);
        let rejection = decision.rejection().unwrap();
        assert_eq!(rejection.code, RejectCode::AnomalyDetected);
        assert_eq!(
            rejection.details,
            Some(AnomalySnapshot {
                score: 110,
                factors: vec![Factor::MicroBurst, Factor::SustainedBurst],
            })
        );

        // 110 -> 105 -> 100: still at the threshold.
        guard.sweep_at(start + Duration::from_secs(30));
        guard.sweep_at(start + Duration::from_secs(60));
        let later = start + Duration::from_secs(61);
        assert!(!guard.evaluate_at(&request("/v1/charges", &[]), later).is_allowed());

        // 95: back under the threshold.
        guard.sweep_at(start + Duration::from_secs(90));
        let later = start + Duration::from_secs(91);
        assert_eq!(guard.evaluate_at(&request("/v1/charges", &[]), later), Decision::Allow);
    }

    #[test]
    fn details_hidden_without_diagnostics() {
        let guard = BurstGuard::new(DetectionConfig::default());
        let now = Instant::now();
        guard.inner.ledger.add_score("203.0.113.10", 100, Factor::MicroBurst, now);

        let decision = guard.evaluate_at(&request("/v1/charges", &[]), now);
        let rejection = decision.rejection().unwrap();
        assert_eq!(rejection.code, RejectCode::AnomalyDetected);
        assert!(rejection.details.is_none());
    }

    #[test]
    fn anomaly_takes_precedence_over_micro_burst() {
        let guard = BurstGuard::new(DetectionConfig::default());
        let now = Instant::now();
        guard.inner.ledger.add_score("203.0.113.10", 60, Factor::SustainedBurst, now);

        let last = (0..31)
            .map(|i| {
                let path = format!("/v1/refunds/{}", i);
                guard.evaluate_at(&request(&path, &[]), now)
            })
            .last()
            .unwrap();
        // 60 + 50 crosses the threshold on the same request that trips micro-burst.
        assert_eq!(last.rejection().unwrap().code, RejectCode::AnomalyDetected);
    }

    #[test]
    fn whitelist_and_unwhitelist() {
        let guard = BurstGuard::new(DetectionConfig::default());
        assert!(guard.whitelist("10.1.1.1"));
        assert!(!guard.whitelist("10.1.1.1"));
        assert!(guard.is_whitelisted("10.1.1.1"));
        assert_eq!(guard.whitelisted_clients(), vec!["10.1.1.1".to_string()]);

        assert!(guard.unwhitelist("10.1.1.1"));
        assert!(!guard.is_whitelisted("10.1.1.1"));
    }

    #[test]
    fn rejection_serializes_like_the_api_contract() {
        let rejection = Rejection::new(
            RejectCode::AnomalyDetected,
            Some(AnomalySnapshot {
                score: 105,
                factors: vec![Factor::RepetitivePattern],
            }),
        );
        let json = serde_json::to_value(&rejection).unwrap();
        assert_eq!(json["code"], "ANOMALY_DETECTED");
        assert_eq!(json["details"]["score"], 105);
        assert_eq!(json["details"]["factors"][0], "repetitive_pattern");

        let plain = serde_json::to_value(Rejection::new(RejectCode::MicroBurst, None)).unwrap();
        assert_eq!(plain["code"], "MICRO_BURST");
        assert_eq!(plain["message"], "Excessive request rate detected. Please slow down.");
        assert!(plain.get("details").is_none());
    }

    #[test]
    fn stats_echo_configuration() {
        let guard = BurstGuard::new(DetectionConfig::default());
        let stats = guard.stats();
        assert_eq!(stats.tracked_clients, 0);
        assert_eq!(stats.configuration.window_size_ms, 10_000);
        assert_eq!(stats.configuration.block_threshold, 100);
        assert_eq!(stats.configuration.micro_burst_threshold, 30);
        assert_eq!(stats.configuration.sustained_burst_threshold, 100);
    }
}
