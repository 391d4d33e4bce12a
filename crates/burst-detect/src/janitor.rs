use burstguard_common::BurstGuardResult;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::engine::BurstGuard;

/// What a single janitor pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub windows_evicted: usize,
    pub anomalies_evicted: usize,
    pub scores_decayed: usize,
}

/// Handle to the background janitor thread.
///
/// Dropping the handle also stops the thread at its next wake-up, but does
/// not wait for it.
pub struct JanitorHandle {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl JanitorHandle {
    /// Stop the janitor and wait for it to exit.
    pub fn shutdown(self) {
        let JanitorHandle { stop, thread } = self;
        // The thread may already be gone if it panicked; nothing to signal then.
        let _ = stop.send(());
        if thread.join().is_err() {
            tracing::error!("janitor thread panicked");
        }
    }
}

impl BurstGuard {
    /// Run one janitor pass now.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Run one janitor pass as if the clock read `now`.
    ///
    /// Windows and anomaly records idle for longer than `max_age` are
    /// removed; every remaining positive score drops by `decay_step`. Each
    /// entry is visited under its shard lock, the same lock the request path
    /// takes.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let config = &self.inner.config;
        let max_age = config.max_age();

        let windows_evicted = self.inner.windows.evict_idle(now, max_age);
        let ledger = self.inner.ledger.sweep(now, max_age, config.decay_step);

        let report = SweepReport {
            windows_evicted,
            anomalies_evicted: ledger.evicted,
            scores_decayed: ledger.decayed,
        };

        debug!(
            windows_evicted = report.windows_evicted,
            anomalies_evicted = report.anomalies_evicted,
            scores_decayed = report.scores_decayed,
            tracked = self.inner.windows.len(),
            anomalies = self.inner.ledger.len(),
            "janitor sweep complete"
        );

        report
    }

    /// Spawn the background janitor, sweeping every `janitor_interval`.
    ///
    /// The thread holds a clone of the engine, so the shared state stays
    /// alive for as long as the janitor runs.
    pub fn start_janitor(&self) -> BurstGuardResult<JanitorHandle> {
        let guard = self.clone();
        let interval = self.inner.config.janitor_interval();
        let (stop, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("burstguard-janitor".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        guard.sweep();
                        trace!("janitor tick completed");
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!("janitor stopping");
                        break;
                    }
                }
            })?;

        info!(interval_secs = interval.as_secs(), "janitor started");

        Ok(JanitorHandle { stop, thread })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::Factor;
    use burstguard_common::DetectionConfig;
    use std::time::Duration;

    #[test]
    fn sweep_decays_and_evicts() {
        let guard = BurstGuard::new(DetectionConfig::default());
        let start = Instant::now();

        guard.inner.windows.record("quiet", "sig", start);
        guard.inner.ledger.add_score("quiet", 50, Factor::MicroBurst, start);

        let report = guard.sweep_at(start + Duration::from_secs(30));
        assert_eq!(
            report,
            SweepReport {
                windows_evicted: 0,
                anomalies_evicted: 0,
                scores_decayed: 1,
            }
        );
        assert_eq!(guard.inner.ledger.current_score("quiet"), 45);

        let report = guard.sweep_at(start + Duration::from_secs(301));
        assert_eq!(report.windows_evicted, 1);
        assert_eq!(report.anomalies_evicted, 1);
        assert_eq!(guard.stats().tracked_clients, 0);
        assert_eq!(guard.stats().anomalies_detected, 0);
    }

    #[test]
    fn background_janitor_decays_and_shuts_down() {
        let config = DetectionConfig {
            janitor_interval_secs: 1,
            ..DetectionConfig::default()
        };
        let guard = BurstGuard::new(config);
        guard
            .inner
            .ledger
            .add_score("busy", 50, Factor::MicroBurst, Instant::now());

        let janitor = guard.start_janitor().unwrap();
        std::thread::sleep(Duration::from_millis(1_500));
        janitor.shutdown();

        assert!(guard.inner.ledger.current_score("busy") < 50);
    }
}
