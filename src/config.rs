use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Host the JSON endpoint is served to; scopes `Access-Control-Allow-Origin`.
    pub public_host: String,
    /// Enables the `?host=` address override. Never set in production.
    pub debug: bool,
    /// Trusted forwarding header, only meaningful behind a proxy that overwrites it.
    pub ip_header: Option<String>,
    pub lookup_timeout_ms: u64,
    pub geoip_db: Option<String>,
    pub geo_api_url: Option<String>,
    pub whois_server: String,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub tls_port: u16,
    pub static_dir: String,
    /// uap-core `regexes.yaml`; the built-in table is used when unset.
    pub ua_regexes: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            public_host: env::var("PUBLIC_HOST")?,
            debug: env::var("DEBUG")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            ip_header: env::var("IP_HEADER").ok().filter(|s| !s.is_empty()),
            lookup_timeout_ms: env::var("LOOKUP_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            geoip_db: env::var("GEOIP_DB").ok().filter(|s| !s.is_empty()),
            geo_api_url: env::var("GEO_API_URL").ok().filter(|s| !s.is_empty()),
            whois_server: env::var("WHOIS_SERVER")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "whois.iana.org".to_string()),
            tls_cert_path: env::var("TLS_CERT_PATH").ok().filter(|s| !s.is_empty()),
            tls_key_path: env::var("TLS_KEY_PATH").ok().filter(|s| !s.is_empty()),
            tls_port: env::var("TLS_PORT")
                .unwrap_or_else(|_| "8443".to_string())
                .parse()
                .unwrap_or(8443),
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
            ua_regexes: env::var("UA_REGEXES").ok().filter(|s| !s.is_empty()),
        })
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Returns the certificate and key paths when both are configured.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn test_config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_host: "ip.example.com".to_string(),
            debug: false,
            ip_header: None,
            lookup_timeout_ms: 200,
            geoip_db: None,
            geo_api_url: None,
            whois_server: "whois.iana.org".to_string(),
            tls_cert_path: None,
            tls_key_path: None,
            tls_port: 8443,
            static_dir: "static".to_string(),
            ua_regexes: None,
        }
    }

    #[test]
    fn test_lookup_timeout() {
        let config = test_config();
        assert_eq!(config.lookup_timeout(), Duration::from_millis(200));
    }

    #[test]
    fn test_tls_paths_requires_both() {
        let mut config = test_config();
        assert!(config.tls_paths().is_none());

        config.tls_cert_path = Some("cert.pem".to_string());
        assert!(config.tls_paths().is_none());

        config.tls_key_path = Some("key.pem".to_string());
        assert_eq!(config.tls_paths(), Some(("cert.pem", "key.pem")));
    }
}
