use burstguard_detect::RejectCode;
use std::time::Instant;

/// Per-request context carried through the Pingora proxy pipeline.
pub struct RequestContext {
    /// Client key the engine attributed the request to.
    pub client_key: String,

    /// Request start time for latency measurement.
    pub request_start: Instant,

    /// Set when the engine rejected the request.
    pub rejected: Option<RejectCode>,

    /// HTTP method (cached for logging).
    pub method: String,

    /// Request URI (cached for logging).
    pub uri: String,

    /// Response status code.
    pub response_status: u16,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            client_key: String::new(),
            request_start: Instant::now(),
            rejected: None,
            method: String::new(),
            uri: String::new(),
            response_status: 0,
        }
    }
}
