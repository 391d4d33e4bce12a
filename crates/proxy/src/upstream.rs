use burstguard_common::UpstreamConfig;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Weighted round-robin over the payments API servers.
pub struct UpstreamSelector {
    pub name: String,
    pub tls: bool,
    pub sni: String,
    /// Server addresses, each repeated `weight` times.
    slots: Vec<String>,
    counter: AtomicUsize,
}

impl UpstreamSelector {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        let mut slots: Vec<String> = config
            .servers
            .iter()
            .flat_map(|s| std::iter::repeat(s.addr.clone()).take(s.weight as usize))
            .collect();

        // All weights zero: fall back to equal weighting.
        if slots.is_empty() {
            slots = config.servers.iter().map(|s| s.addr.clone()).collect();
        }

        Self {
            name: config.name.clone(),
            tls: config.tls,
            sni: config.sni.clone(),
            slots,
            counter: AtomicUsize::new(0),
        }
    }

    /// Next server address, or `None` if no servers are configured.
    pub fn select(&self) -> Option<&str> {
        if self.slots.is_empty() {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        Some(&self.slots[idx])
    }
}
