use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::detectors::{Factor, Finding};

/// Accumulated penalty for one client.
#[derive(Debug, Clone)]
struct AnomalyRecord {
    score: u32,
    factors: BTreeSet<Factor>,
    last_updated: Instant,
}

impl AnomalyRecord {
    fn new(now: Instant) -> Self {
        Self {
            score: 0,
            factors: BTreeSet::new(),
            last_updated: now,
        }
    }

    fn add(&mut self, points: u32, factor: Factor, now: Instant) {
        self.score = self.score.saturating_add(points);
        self.factors.insert(factor);
        self.last_updated = now;
    }

    fn snapshot(&self) -> AnomalySnapshot {
        AnomalySnapshot {
            score: self.score,
            factors: self.factors.iter().copied().collect(),
        }
    }
}

/// Copy of a client's score and the distinct factors that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalySnapshot {
    pub score: u32,
    pub factors: Vec<Factor>,
}

/// Outcome of one ledger sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSweep {
    pub evicted: usize,
    pub decayed: usize,
}

/// Per-client anomaly scores.
///
/// Scores only go up on the request path; [`AnomalyLedger::sweep`] is the
/// single place they come down.
pub struct AnomalyLedger {
    records: DashMap<String, AnomalyRecord>,
}

impl AnomalyLedger {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Add `points` for `factor` to the client's score, creating the record if needed.
    pub fn add_score(&self, key: &str, points: u32, factor: Factor, now: Instant) {
        self.records
            .entry(key.to_string())
            .or_insert_with(|| AnomalyRecord::new(now))
            .add(points, factor, now);
    }

    /// Current score, or 0 for a client with no record.
    pub fn current_score(&self, key: &str) -> u32 {
        self.records.get(key).map_or(0, |record| record.score)
    }

    pub fn snapshot(&self, key: &str) -> Option<AnomalySnapshot> {
        self.records.get(key).map(|record| record.snapshot())
    }

    /// Apply every finding of one request under a single lock and return the
    /// resulting state.
    ///
    /// With no findings this is a plain read and no record is created.
    pub fn accumulate(
        &self,
        key: &str,
        findings: &[Finding],
        now: Instant,
    ) -> Option<AnomalySnapshot> {
        if findings.is_empty() {
            return self.snapshot(key);
        }

        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| AnomalyRecord::new(now));
        for finding in findings {
            record.add(finding.points, finding.factor, now);
        }
        Some(record.snapshot())
    }

    /// Evict records not updated within `max_age` and decay the rest by
    /// `decay_step`, floored at zero.
    ///
    /// Decay does not refresh `last_updated`, so a client that stays quiet is
    /// still evicted on schedule.
    pub fn sweep(&self, now: Instant, max_age: Duration, decay_step: u32) -> LedgerSweep {
        let mut result = LedgerSweep::default();
        self.records.retain(|_key, record| {
            if now.duration_since(record.last_updated) > max_age {
                result.evicted += 1;
                return false;
            }
            if record.score > 0 {
                record.score = record.score.saturating_sub(decay_step);
                result.decayed += 1;
            }
            true
        });
        result
    }

    /// Number of clients with a record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_score(&self) -> u64 {
        self.records
            .iter()
            .map(|entry| u64::from(entry.value().score))
            .sum()
    }
}

impl Default for AnomalyLedger {
    fn default() -> Self {
        Self::new()
    }
}
