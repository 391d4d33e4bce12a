use burstguard_common::DetectionConfig;
use serde::Serialize;
use std::fmt;

use crate::window::WindowSnapshot;

/// Name of a heuristic that contributed to a client's anomaly score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    MicroBurst,
    SustainedBurst,
    RepetitivePattern,
}

impl Factor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::MicroBurst => "micro_burst",
            Factor::SustainedBurst => "sustained_burst",
            Factor::RepetitivePattern => "repetitive_pattern",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A positive detector result and the points it adds to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finding {
    pub factor: Factor,
    pub points: u32,
}

/// The three fixed heuristics run against every recorded request.
///
/// Each detector is a pure function of the [`WindowSnapshot`]; none of them
/// mutates state or depends on another's outcome.
#[derive(Debug, Clone)]
pub struct DetectorSet {
    micro_burst_threshold: usize,
    micro_burst_points: u32,
    sustained_burst_threshold: usize,
    sustained_burst_points: u32,
    pattern_min_requests: usize,
    pattern_ratio: f64,
    pattern_points: u32,
}

impl DetectorSet {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            micro_burst_threshold: config.micro_burst_threshold,
            micro_burst_points: config.micro_burst_points,
            sustained_burst_threshold: config.sustained_burst_threshold,
            sustained_burst_points: config.sustained_burst_points,
            pattern_min_requests: config.pattern_min_requests,
            pattern_ratio: config.pattern_ratio,
            pattern_points: config.pattern_points,
        }
    }

    /// More than `micro_burst_threshold` requests inside the micro-burst interval.
    pub fn micro_burst(&self, window: &WindowSnapshot) -> Option<Finding> {
        (window.recent > self.micro_burst_threshold).then_some(Finding {
            factor: Factor::MicroBurst,
            points: self.micro_burst_points,
        })
    }

    /// More than `sustained_burst_threshold` requests across the whole window.
    pub fn sustained_burst(&self, window: &WindowSnapshot) -> Option<Finding> {
        (window.total > self.sustained_burst_threshold).then_some(Finding {
            factor: Factor::SustainedBurst,
            points: self.sustained_burst_points,
        })
    }

    /// The current signature makes up more than `pattern_ratio` of a window
    /// holding more than `pattern_min_requests` requests.
    pub fn repetitive_pattern(&self, window: &WindowSnapshot) -> Option<Finding> {
        if window.total == 0 || window.total <= self.pattern_min_requests {
            return None;
        }

        let ratio = f64::from(window.signature_count) / window.total as f64;
        (ratio > self.pattern_ratio).then_some(Finding {
            factor: Factor::RepetitivePattern,
            points: self.pattern_points,
        })
    }

    /// Run all detectors in their fixed order and collect the findings.
    pub fn evaluate(&self, window: &WindowSnapshot) -> Vec<Finding> {
        [
            self.micro_burst(window),
            self.sustained_burst(window),
            self.repetitive_pattern(window),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
