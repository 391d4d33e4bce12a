use axum::extract::State;
use axum::Json;
use burstguard_detect::EngineStats;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub engine: EngineStats,
    pub requests_total: u64,
    pub requests_allowed: u64,
    pub micro_burst_rejections: u64,
    pub anomaly_rejections: u64,
    pub uptime_secs: u64,
}

/// GET /api/stats
///
/// Engine snapshot (tracked clients, allowlist size, anomaly totals and the
/// detection settings in effect) plus the gateway's request counters.
pub async fn get_stats(State(state): State<SharedState>) -> Json<StatsResponse> {
    let metrics = &state.metrics;

    Json(StatsResponse {
        engine: state.engine.stats(),
        requests_total: metrics.requests_total.get(),
        requests_allowed: metrics.requests_allowed.get(),
        micro_burst_rejections: metrics.micro_burst_rejections.get(),
        anomaly_rejections: metrics.anomaly_rejections.get(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
