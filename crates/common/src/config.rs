use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{BurstGuardError, BurstGuardResult};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: Vec<String>,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_admin_listen(),
        }
    }
}

/// The payments API backend that admitted requests are forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_name")]
    pub name: String,
    pub servers: Vec<UpstreamServer>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub sni: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub addr: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Thresholds and timings for the burst/anomaly detection engine.
///
/// The defaults are the production values; every field may be overridden in
/// the `detection` section of the YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Length of the sliding window in milliseconds.
    #[serde(default = "default_window_size_ms")]
    pub window_size_ms: u64,
    /// Sub-window used by the micro-burst detector.
    #[serde(default = "default_micro_burst_interval_ms")]
    pub micro_burst_interval_ms: u64,
    /// Micro-burst fires when strictly more requests than this land in the sub-window.
    #[serde(default = "default_micro_burst_threshold")]
    pub micro_burst_threshold: usize,
    #[serde(default = "default_micro_burst_points")]
    pub micro_burst_points: u32,
    /// Sustained-burst fires when the full window holds strictly more requests than this.
    #[serde(default = "default_sustained_burst_threshold")]
    pub sustained_burst_threshold: usize,
    #[serde(default = "default_sustained_burst_points")]
    pub sustained_burst_points: u32,
    /// Minimum window population (exclusive) before the pattern ratio is considered.
    #[serde(default = "default_pattern_min_requests")]
    pub pattern_min_requests: usize,
    /// Share of the window a single signature must exceed to count as repetitive.
    #[serde(default = "default_pattern_ratio")]
    pub pattern_ratio: f64,
    #[serde(default = "default_pattern_points")]
    pub pattern_points: u32,
    /// Accumulated score at or above which a client is blocked.
    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,
    /// Idle time after which the janitor forgets a client.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
    /// Points removed from every live score per janitor pass.
    #[serde(default = "default_decay_step")]
    pub decay_step: u32,
    /// Expose score and factors in anomaly rejections. Keep off in production.
    #[serde(default)]
    pub diagnostics: bool,
    /// Client keys that bypass detection entirely.
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_size_ms: default_window_size_ms(),
            micro_burst_interval_ms: default_micro_burst_interval_ms(),
            micro_burst_threshold: default_micro_burst_threshold(),
            micro_burst_points: default_micro_burst_points(),
            sustained_burst_threshold: default_sustained_burst_threshold(),
            sustained_burst_points: default_sustained_burst_points(),
            pattern_min_requests: default_pattern_min_requests(),
            pattern_ratio: default_pattern_ratio(),
            pattern_points: default_pattern_points(),
            block_threshold: default_block_threshold(),
            max_age_secs: default_max_age_secs(),
            janitor_interval_secs: default_janitor_interval_secs(),
            decay_step: default_decay_step(),
            diagnostics: false,
            allowlist: vec![],
        }
    }
}

impl DetectionConfig {
    pub fn window_size(&self) -> Duration {
        Duration::from_millis(self.window_size_ms)
    }

    pub fn micro_burst_interval(&self) -> Duration {
        Duration::from_millis(self.micro_burst_interval_ms)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    /// Check the detection section for values the engine cannot work with.
    pub fn validate(&self) -> BurstGuardResult<()> {
        if self.window_size_ms == 0 {
            return Err(BurstGuardError::Config(
                "detection.window_size_ms must be greater than zero".into(),
            ));
        }
        if self.micro_burst_interval_ms > self.window_size_ms {
            return Err(BurstGuardError::Config(format!(
                "detection.micro_burst_interval_ms ({}) exceeds window_size_ms ({})",
                self.micro_burst_interval_ms, self.window_size_ms
            )));
        }
        if self.janitor_interval_secs == 0 {
            return Err(BurstGuardError::Config(
                "detection.janitor_interval_secs must be greater than zero".into(),
            ));
        }
        if !(self.pattern_ratio > 0.0 && self.pattern_ratio <= 1.0) {
            return Err(BurstGuardError::Config(format!(
                "detection.pattern_ratio must be in (0, 1], got {}",
                self.pattern_ratio
            )));
        }
        Ok(())
    }
}

// Default value helpers
fn default_admin_listen() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_true() -> bool {
    true
}
fn default_weight() -> u32 {
    1
}
fn default_upstream_name() -> String {
    "payments-api".to_string()
}
fn default_window_size_ms() -> u64 {
    10_000
}
fn default_micro_burst_interval_ms() -> u64 {
    1_000
}
fn default_micro_burst_threshold() -> usize {
    30
}
fn default_micro_burst_points() -> u32 {
    50
}
fn default_sustained_burst_threshold() -> usize {
    100
}
fn default_sustained_burst_points() -> u32 {
    30
}
fn default_pattern_min_requests() -> usize {
    10
}
fn default_pattern_ratio() -> f64 {
    0.8
}
fn default_pattern_points() -> u32 {
    25
}
fn default_block_threshold() -> u32 {
    100
}
fn default_max_age_secs() -> u64 {
    5 * 60
}
fn default_janitor_interval_secs() -> u64 {
    30
}
fn default_decay_step() -> u32 {
    5
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> BurstGuardResult<Self> {
        info!(path, "loading configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> BurstGuardResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> BurstGuardResult<()> {
        if self.server.listen.is_empty() {
            return Err(BurstGuardError::Config(
                "server.listen must have at least one address".into(),
            ));
        }

        if self.upstream.servers.is_empty() {
            return Err(BurstGuardError::Config(format!(
                "upstream '{}' has no servers",
                self.upstream.name
            )));
        }

        self.detection.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
server:
  listen: ["0.0.0.0:8080"]
upstream:
  servers:
    - addr: "127.0.0.1:3000"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.upstream.name, "payments-api");
        assert_eq!(config.upstream.servers[0].weight, 1);
        assert_eq!(config.server.admin.listen, "127.0.0.1:9090");
        assert_eq!(config.detection, DetectionConfig::default());
        assert_eq!(config.detection.window_size(), Duration::from_secs(10));
        assert_eq!(config.detection.max_age(), Duration::from_secs(300));
        assert_eq!(config.detection.janitor_interval(), Duration::from_secs(30));
    }

    #[test]
    fn detection_overrides() {
        let yaml = format!(
            "{}detection:\n  block_threshold: 80\n  diagnostics: true\n  allowlist: [\"10.0.0.1\"]\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.detection.block_threshold, 80);
        assert!(config.detection.diagnostics);
        assert_eq!(config.detection.allowlist, vec!["10.0.0.1".to_string()]);
        assert_eq!(config.detection.micro_burst_threshold, 30);
    }

    #[test]
    fn empty_listen_rejected() {
        let yaml = r#"
server:
  listen: []
upstream:
  servers:
    - addr: "127.0.0.1:3000"
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BurstGuardError::Config(_)));
    }

    #[test]
    fn upstream_without_servers_rejected() {
        let yaml = r#"
server:
  listen: ["0.0.0.0:8080"]
upstream:
  servers: []
"#;
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn invalid_detection_values_rejected() {
        let mut detection = DetectionConfig::default();
        detection.micro_burst_interval_ms = 20_000;
        assert!(detection.validate().is_err());

        let mut detection = DetectionConfig::default();
        detection.pattern_ratio = 1.5;
        assert!(detection.validate().is_err());

        let mut detection = DetectionConfig::default();
        detection.window_size_ms = 0;
        assert!(detection.validate().is_err());

        let mut detection = DetectionConfig::default();
        detection.janitor_interval_secs = 0;
        assert!(detection.validate().is_err());
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let err = AppConfig::from_yaml("server: [").unwrap_err();
        assert!(matches!(err, BurstGuardError::Yaml(_)));
    }
}
