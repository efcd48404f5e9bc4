use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use serde::Serialize;

use super::LookupError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub query: String,
    pub names: Vec<String>,
}

#[async_trait]
pub trait ReverseDns: Send + Sync {
    async fn reverse(&self, addr: &str) -> Result<Response, LookupError>;
}

/// PTR lookups through the system resolver configuration.
pub struct HickoryReverseDns {
    resolver: TokioAsyncResolver,
}

impl HickoryReverseDns {
    pub fn from_system_conf() -> Result<Self, LookupError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| LookupError::Failed(e.to_string()))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl ReverseDns for HickoryReverseDns {
    async fn reverse(&self, addr: &str) -> Result<Response, LookupError> {
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| LookupError::InvalidAddress(addr.to_string()))?;

        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| LookupError::Failed(e.to_string()))?;

        let names = lookup.iter().map(ToString::to_string).collect();
        Ok(Response {
            query: addr.to_string(),
            names,
        })
    }
}
