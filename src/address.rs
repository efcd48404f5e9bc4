use std::net::{IpAddr, SocketAddr};

use axum::extract::Query;
use axum::http::{HeaderMap, Uri};

use crate::config::AppConfig;
use crate::error::AppError;

/// Determine the client's address for this request.
///
/// Precedence: the `?host=` query parameter (debug builds of the config only),
/// then the configured trusted header, then the transport peer. Ports are
/// stripped from header and peer values; a value that is not `host:port` is
/// used as-is.
pub fn resolve_remote_addr(
    config: &AppConfig,
    uri: &Uri,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Result<String, AppError> {
    if config.debug {
        if let Some(host) = host_override(uri) {
            return Ok(host);
        }
    }

    let remote_addr = match trusted_header_value(config, headers) {
        Some(value) => value,
        None => peer
            .map(|addr| addr.to_string())
            .ok_or_else(|| AppError::Resolution("no peer address available".to_string()))?,
    };

    Ok(strip_port(&remote_addr).to_string())
}

/// First `host` query parameter, if non-empty. Repeated keys are allowed.
fn host_override(uri: &Uri) -> Option<String> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri).ok()?;
    pairs
        .into_iter()
        .find(|(key, _)| key == "host")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// The configured header's value. Empty or undecodable values count as absent
/// so the request falls back to the transport peer.
fn trusted_header_value(config: &AppConfig, headers: &HeaderMap) -> Option<String> {
    let name = config.ip_header.as_deref()?;
    let value = headers.get(name)?;

    match value.to_str() {
        Ok("") => None,
        Ok(value) => Some(value.to_string()),
        Err(_) => {
            tracing::warn!(header = name, "Ignoring non-ASCII trusted header value");
            None
        }
    }
}

/// The address the transport actually observed, without the port.
pub fn observed_addr(peer: Option<SocketAddr>) -> Option<String> {
    peer.map(|addr| addr.ip().to_string())
}

/// Strip a trailing `:port` (or `[v6]:port`) if present.
pub fn strip_port(addr: &str) -> &str {
    split_host_port(addr).map_or(addr, |(host, _)| host)
}

fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        return Some((host, port));
    }

    let (host, port) = addr.rsplit_once(':')?;
    // A second colon means a bare IPv6 address, not host:port.
    if host.contains(':') {
        return None;
    }
    Some((host, port))
}

pub fn address_family(addr: &str) -> &'static str {
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => "IPv4",
        Ok(IpAddr::V6(_)) => "IPv6",
        Err(_) => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.1:40000".parse().unwrap())
    }

    #[test]
    fn test_peer_address_port_stripped() {
        let config = test_config();
        let uri: Uri = "/json".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &HeaderMap::new(), peer()).unwrap();
        assert_eq!(addr, "10.0.0.1");
    }

    #[test]
    fn test_debug_override() {
        let mut config = test_config();
        config.debug = true;
        let uri: Uri = "/json?host=203.0.113.7".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &HeaderMap::new(), peer()).unwrap();
        assert_eq!(addr, "203.0.113.7");
    }

    #[test]
    fn test_override_ignored_without_debug() {
        let config = test_config();
        let uri: Uri = "/json?host=203.0.113.7".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &HeaderMap::new(), peer()).unwrap();
        assert_eq!(addr, "10.0.0.1");
    }

    #[test]
    fn test_debug_override_beats_trusted_header() {
        let mut config = test_config();
        config.debug = true;
        config.ip_header = Some("X-Real-IP".to_string());
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));
        let uri: Uri = "/?host=203.0.113.7".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &headers, peer()).unwrap();
        assert_eq!(addr, "203.0.113.7");
    }

    #[test]
    fn test_trusted_header_precedence() {
        let mut config = test_config();
        config.ip_header = Some("X-Real-IP".to_string());
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));
        let uri: Uri = "/json".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &headers, peer()).unwrap();
        assert_eq!(addr, "198.51.100.9");
    }

    #[test]
    fn test_trusted_header_ignored_when_not_configured() {
        let config = test_config();
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));
        let uri: Uri = "/json".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &headers, peer()).unwrap();
        assert_eq!(addr, "10.0.0.1");
    }

    #[test]
    fn test_empty_trusted_header_falls_back_to_peer() {
        let mut config = test_config();
        config.ip_header = Some("X-Real-IP".to_string());
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(""));
        let uri: Uri = "/json".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &headers, peer()).unwrap();
        assert_eq!(addr, "10.0.0.1");
    }

    #[test]
    fn test_trusted_header_with_port() {
        let mut config = test_config();
        config.ip_header = Some("X-Real-IP".to_string());
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.5:54321"));
        let uri: Uri = "/".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &headers, None).unwrap();
        assert_eq!(addr, "192.0.2.5");
    }

    #[test]
    fn test_undecodable_trusted_header_falls_back_to_peer() {
        let mut config = test_config();
        config.ip_header = Some("X-Real-IP".to_string());
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_bytes(b"192.0.2.\xff").unwrap());
        let uri: Uri = "/".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &headers, peer()).unwrap();
        assert_eq!(addr, "10.0.0.1");
    }

    #[test]
    fn test_debug_override_repeated_key_takes_first() {
        let mut config = test_config();
        config.debug = true;
        let uri: Uri = "/json?host=203.0.113.7&host=198.51.100.1".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &HeaderMap::new(), peer()).unwrap();
        assert_eq!(addr, "203.0.113.7");
    }

    #[test]
    fn test_debug_override_empty_is_ignored() {
        let mut config = test_config();
        config.debug = true;
        let uri: Uri = "/json?host=&x=1".parse().unwrap();
        let addr = resolve_remote_addr(&config, &uri, &HeaderMap::new(), peer()).unwrap();
        assert_eq!(addr, "10.0.0.1");
    }

    #[test]
    fn test_no_peer_is_resolution_error() {
        let config = test_config();
        let uri: Uri = "/".parse().unwrap();
        let err = resolve_remote_addr(&config, &uri, &HeaderMap::new(), None).unwrap_err();
        assert!(matches!(err, AppError::Resolution(_)));
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("192.0.2.5:54321"), "192.0.2.5");
        assert_eq!(strip_port("192.0.2.5"), "192.0.2.5");
        assert_eq!(strip_port("[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(strip_port("2001:db8::1"), "2001:db8::1");
        assert_eq!(strip_port("[2001:db8::1]"), "[2001:db8::1]");
    }

    #[test]
    fn test_observed_addr() {
        assert_eq!(observed_addr(peer()).as_deref(), Some("10.0.0.1"));
        let v6: SocketAddr = "[2001:db8::2]:8080".parse().unwrap();
        assert_eq!(observed_addr(Some(v6)).as_deref(), Some("2001:db8::2"));
        assert_eq!(observed_addr(None), None);
    }

    #[test]
    fn test_address_family() {
        assert_eq!(address_family("192.0.2.5"), "IPv4");
        assert_eq!(address_family("2001:db8::1"), "IPv6");
        assert_eq!(address_family("not-an-ip"), "unknown");
    }
}
