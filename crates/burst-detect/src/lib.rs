//! Request-level burst and abuse detection for the payments gateway.
//!
//! Every inbound request is attributed to a client key, recorded in that
//! client's sliding window, and run through three fixed heuristics:
//!
//! - **Micro-burst** -- too many requests inside a one-second sub-window.
//!   Rejected immediately.
//! - **Sustained burst** -- too many requests across the whole window.
//!   Adds to the anomaly score.
//! - **Repetitive pattern** -- one request signature dominating the window.
//!   Adds to the anomaly score.
//!
//! Clients whose accumulated score reaches the block threshold are rejected
//! until the [janitor](BurstGuard::start_janitor) has decayed the score back
//! under it. All state is process-local and held in
//! [`DashMap`](dashmap::DashMap)s, so clients never contend on a global lock.

pub mod allowlist;
pub mod detectors;
pub mod engine;
pub mod identity;
pub mod janitor;
pub mod ledger;
pub mod signature;
pub mod window;

pub use allowlist::Allowlist;
pub use detectors::{DetectorSet, Factor, Finding};
pub use engine::{
    BurstGuard, ConfigurationEcho, Decision, EngineStats, InboundRequest, RejectCode, Rejection,
};
pub use identity::{resolve_client_key, UNKNOWN_CLIENT};
pub use janitor::{JanitorHandle, SweepReport};
pub use ledger::{AnomalyLedger, AnomalySnapshot};
pub use signature::build_signature;
pub use window::{SlidingWindowTracker, WindowSnapshot};
