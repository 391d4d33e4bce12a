use async_trait::async_trait;
use burstguard_admin::GatewayMetrics;
use burstguard_common::DetectionConfig;
use burstguard_detect::{resolve_client_key, BurstGuard, InboundRequest, RejectCode, Rejection};
use bytes::Bytes;
use http::StatusCode;
use pingora_core::prelude::*;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{ProxyHttp, Session};
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::upstream::UpstreamSelector;

/// Reverse proxy in front of the payments API that runs every request
/// through the burst detection engine.
pub struct BurstGuardProxy {
    pub engine: BurstGuard,
    pub upstream: UpstreamSelector,
    pub metrics: Arc<GatewayMetrics>,
}

impl BurstGuardProxy {
    pub fn new(engine: BurstGuard, upstream: UpstreamSelector, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            engine,
            upstream,
            metrics,
        }
    }
}

#[async_trait]
impl ProxyHttp for BurstGuardProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let header = session.req_header();
        ctx.method = header.method.as_str().to_string();
        ctx.uri = header
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        let headers: Vec<(String, String)> = header
            .headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();
        let peer_addr = session.client_addr().map(|a| a.to_string());
        ctx.client_key = resolve_client_key(&headers, peer_addr.as_deref());

        let decision = self.engine.evaluate(&InboundRequest {
            method: &ctx.method,
            path: &ctx.uri,
            headers: &headers,
            peer_addr: peer_addr.as_deref(),
        });
        self.metrics.record_decision(&decision);

        let Some(rejection) = decision.rejection() else {
            return Ok(false); // continue to upstream
        };

        ctx.rejected = Some(rejection.code);
        ctx.response_status = rejection.code.http_status();

        let body = Bytes::from(rejection_body(rejection));
        let status =
            StatusCode::from_u16(ctx.response_status).unwrap_or(StatusCode::TOO_MANY_REQUESTS);
        let retry_after = retry_after_secs(rejection.code, self.engine.config());

        let mut resp = ResponseHeader::build(status, Some(4))?;
        resp.insert_header("content-type", "application/json")?;
        resp.insert_header("content-length", body.len().to_string())?;
        resp.insert_header("retry-after", retry_after.to_string())?;
        session.set_keepalive(None);
        session.write_response_header(Box::new(resp), false).await?;
        session.write_response_body(Some(body), true).await?;

        Ok(true)
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let addr = self.upstream.select().ok_or_else(|| {
            Error::explain(ErrorType::ConnectProxyFailure, "no upstream servers configured")
        })?;

        debug!(upstream = %self.upstream.name, addr, "selected upstream peer");

        let peer = HttpPeer::new(addr, self.upstream.tls, self.upstream.sni.clone());
        Ok(Box::new(peer))
    }

    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        if !ctx.client_key.is_empty() {
            upstream_request.insert_header("x-real-ip", &ctx.client_key)?;
        }
        Ok(())
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        ctx.response_status = upstream_response.status.as_u16();
        Ok(())
    }

    async fn logging(&self, _session: &mut Session, error: Option<&pingora_core::Error>, ctx: &mut Self::CTX) {
        let duration = ctx.request_start.elapsed();
        self.metrics
            .observe_duration(ctx.rejected, duration.as_secs_f64());

        info!(
            client_key = %ctx.client_key,
            method = %ctx.method,
            uri = %ctx.uri,
            status = ctx.response_status,
            duration_ms = duration.as_millis() as u64,
            rejected = ctx.rejected.map(|code| code.as_str()).unwrap_or(""),
            error = %error.map(|e| e.to_string()).unwrap_or_default(),
            "request completed"
        );
    }
}

/// JSON body sent with a rejection: `{"error": {"code", "message", "details"?}}`.
fn rejection_body(rejection: &Rejection) -> Vec<u8> {
    serde_json::json!({ "error": rejection })
        .to_string()
        .into_bytes()
}

/// Seconds a rejected client is told to wait. Micro-bursts clear within the
/// sub-window; anomaly blocks only lift at the next janitor decay.
fn retry_after_secs(code: RejectCode, config: &DetectionConfig) -> u64 {
    match code {
        RejectCode::MicroBurst => config.micro_burst_interval().as_secs().max(1),
        RejectCode::AnomalyDetected => config.janitor_interval_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burstguard_detect::{AnomalySnapshot, Factor};
    use serde_json::Value;

    #[test]
    fn micro_burst_body() {
        let rejection = Rejection {
            code: RejectCode::MicroBurst,
            message: RejectCode::MicroBurst.message(),
            details: None,
        };
        let body: Value = serde_json::from_slice(&rejection_body(&rejection)).unwrap();
        assert_eq!(body["error"]["code"], "MICRO_BURST");
        assert_eq!(
            body["error"]["message"],
            "Excessive request rate detected. Please slow down."
        );
        assert!(body["error"].get("details").is_none());
    }

    #[test]
    fn anomaly_body_with_details() {
        let rejection = Rejection {
            code: RejectCode::AnomalyDetected,
            message: RejectCode::AnomalyDetected.message(),
            details: Some(AnomalySnapshot {
                score: 125,
                factors: vec![Factor::MicroBurst, Factor::RepetitivePattern],
            }),
        };
        let body: Value = serde_json::from_slice(&rejection_body(&rejection)).unwrap();
        assert_eq!(body["error"]["code"], "ANOMALY_DETECTED");
        assert_eq!(body["error"]["details"]["score"], 125);
        assert_eq!(body["error"]["details"]["factors"][1], "repetitive_pattern");
    }

    #[test]
    fn retry_after_follows_configuration() {
        let config = DetectionConfig::default();
        assert_eq!(retry_after_secs(RejectCode::MicroBurst, &config), 1);
        assert_eq!(retry_after_secs(RejectCode::AnomalyDetected, &config), 30);
    }
}
