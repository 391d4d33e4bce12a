use std::net::SocketAddr;

/// Client key used when neither a forwarded-for chain nor a peer address is available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the client key for a request.
///
/// The first entry of `X-Forwarded-For` wins when present and non-empty,
/// then the transport peer address (with any port removed), then
/// [`UNKNOWN_CLIENT`]. The forwarded header is taken at face value: the
/// gateway is expected to sit behind a single trusted reverse proxy.
pub fn resolve_client_key(headers: &[(String, String)], peer_addr: Option<&str>) -> String {
    let forwarded = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("x-forwarded-for"))
        .and_then(|(_, v)| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    peer_addr
        .map(strip_port)
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// `1.2.3.4:5678` -> `1.2.3.4`, `[::1]:443` -> `::1`. Anything that is not a
/// socket address (bare IPs, unix socket paths) is returned trimmed.
fn strip_port(addr: &str) -> String {
    match addr.trim().parse::<SocketAddr>() {
        Ok(sock) => sock.ip().to_string(),
        Err(_) => addr.trim().to_string(),
    }
}
