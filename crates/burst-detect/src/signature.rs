/// Build the coarse behavioral fingerprint of a request.
///
/// The signature is `METHOD:path:user-agent`, with the query string dropped
/// and `unknown` standing in for a missing or empty `User-Agent`. It groups
/// automated requests that hit the same endpoint with the same client without
/// hashing payloads.
pub fn build_signature(method: &str, path: &str, headers: &[(String, String)]) -> String {
    let path = path.split('?').next().unwrap_or(path);
    let agent = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown");

    format!("{}:{}:{}", method, path, agent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_method_path_and_agent() {
        let headers = vec![("User-Agent".to_string(), "payments-sdk/2.1".to_string())];
        assert_eq!(
            build_signature("POST", "/v1/charges", &headers),
            "POST:/v1/charges:payments-sdk/2.1"
        );
    }

    #[test]
    fn missing_agent_is_unknown() {
        assert_eq!(build_signature("GET", "/v1/disputes", &[]), "GET:/v1/disputes:unknown");

        let blank = vec![("user-agent".to_string(), "".to_string())];
        assert_eq!(build_signature("GET", "/", &blank), "GET:/:unknown");
    }

    #[test]
    fn query_string_is_ignored() {
        let a = build_signature("GET", "/v1/charges?limit=10", &[]);
        let b = build_signature("GET", "/v1/charges?limit=20", &[]);
        assert_eq!(a, b);
        assert_eq!(a, "GET:/v1/charges:unknown");
    }
}
