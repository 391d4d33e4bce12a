use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Per-client recent activity.
///
/// `timestamps` is pruned continuously to the trailing window, while
/// `signature_counts` is only cleared when the whole epoch goes stale. The
/// two therefore disagree after a partial prune; the pattern detector reads
/// both as-is.
#[derive(Debug)]
struct Window {
    timestamps: VecDeque<Instant>,
    signature_counts: HashMap<String, u32>,
    epoch_start: Instant,
}

/// What the detectors get to see of a window right after a request was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Requests inside the trailing window, including the current one.
    pub total: usize,
    /// Requests inside the micro-burst interval, including the current one.
    pub recent: usize,
    /// Occurrences of the current request's signature in this epoch.
    pub signature_count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            timestamps: VecDeque::new(),
            signature_counts: HashMap::new(),
            epoch_start: now,
        }
    }

    fn record(
        &mut self,
        signature: &str,
        now: Instant,
        window_size: Duration,
        micro_interval: Duration,
    ) -> WindowSnapshot {
        // Callers sample the clock before taking the shard lock, so a slightly
        // older instant can arrive after a newer one.
        let now = match self.timestamps.back() {
            Some(&last) if last > now => last,
            _ => now,
        };

        if now.duration_since(self.epoch_start) > window_size {
            self.timestamps.clear();
            self.signature_counts.clear();
            self.epoch_start = now;
        }

        self.timestamps.push_back(now);
        let signature_count = {
            let count = self
                .signature_counts
                .entry(signature.to_string())
                .or_insert(0);
            *count += 1;
            *count
        };

        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) < window_size {
                break;
            }
            self.timestamps.pop_front();
        }

        let recent = self
            .timestamps
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < micro_interval)
            .count();

        WindowSnapshot {
            total: self.timestamps.len(),
            recent,
            signature_count,
        }
    }

    /// Most recent instant this window was touched. Never earlier than `epoch_start`.
    fn last_activity(&self) -> Instant {
        self.timestamps
            .back()
            .copied()
            .map_or(self.epoch_start, |last| last.max(self.epoch_start))
    }
}

/// Concurrent map of client key to sliding window.
///
/// Each `record` runs under the DashMap shard lock for its key, so requests
/// from one client are serialized while different clients proceed in
/// parallel.
pub struct SlidingWindowTracker {
    windows: DashMap<String, Window>,
    window_size: Duration,
    micro_interval: Duration,
}

impl SlidingWindowTracker {
    /// * `window_size`    - trailing window kept per client
    /// * `micro_interval` - sub-window counted into [`WindowSnapshot::recent`]
    pub fn new(window_size: Duration, micro_interval: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window_size,
            micro_interval,
        }
    }

    /// Record a request for `key` at `now` and return the resulting window view.
    pub fn record(&self, key: &str, signature: &str, now: Instant) -> WindowSnapshot {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window::new(now));

        entry
            .value_mut()
            .record(signature, now, self.window_size, self.micro_interval)
    }

    /// Drop windows that have seen no activity for longer than `max_age`.
    ///
    /// Returns the number of windows removed.
    pub fn evict_idle(&self, now: Instant, max_age: Duration) -> usize {
        let mut evicted = 0;
        self.windows.retain(|_key, window| {
            let keep = now.duration_since(window.last_activity()) <= max_age;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn contains(&self, key: &str) -> bool {
        self.windows.contains_key(key)
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
