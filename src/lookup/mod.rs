use std::time::Duration;

pub mod dns;
pub mod location;
pub mod useragent;
pub mod whois;

pub use dns::ReverseDns;
pub use location::GeoLocator;
pub use useragent::UserAgentParser;
pub use whois::WhoisClient;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("lookup failed: {0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("not an IP address: {0}")]
    InvalidAddress(String),

    #[error("not configured")]
    NotConfigured,

    #[error("lookup aborted: {0}")]
    Aborted(String),
}
