use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::lookup::{dns, location, useragent, whois};
use crate::lookup::{GeoLocator, LookupError, ReverseDns, UserAgentParser, WhoisClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Dns,
    Whois,
    Location,
    UserAgent,
}

impl Source {
    /// Key used for this source in the insights map.
    pub fn key(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Whois => "whois",
            Self::Location => "location",
            Self::UserAgent => "user_agent",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment {
    Dns(dns::Response),
    Whois(whois::Response),
    Location(location::Response),
    UserAgent(useragent::Client),
}

#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub source: Source,
    pub outcome: Result<Enrichment, LookupError>,
}

/// The four enrichment collaborators plus the per-source deadline.
#[derive(Clone)]
pub struct Lookups {
    pub dns: Arc<dyn ReverseDns>,
    pub whois: Arc<dyn WhoisClient>,
    pub location: Arc<dyn GeoLocator>,
    pub user_agent: Arc<dyn UserAgentParser>,
    pub timeout: Duration,
}

impl Lookups {
    /// Query every source concurrently. Each runs on its own task under its own
    /// timeout, so a hung or panicking source only costs its own field.
    pub async fn enrich(&self, addr: &str, user_agent: &str) -> Vec<EnrichmentResult> {
        let dns = {
            let svc = Arc::clone(&self.dns);
            let addr = addr.to_string();
            self.spawn(async move { svc.reverse(&addr).await.map(Enrichment::Dns) })
        };
        let whois = {
            let svc = Arc::clone(&self.whois);
            let addr = addr.to_string();
            self.spawn(async move { svc.lookup(&addr).await.map(Enrichment::Whois) })
        };
        let location = {
            let svc = Arc::clone(&self.location);
            let addr = addr.to_string();
            self.spawn(async move { svc.locate(&addr).await.map(Enrichment::Location) })
        };
        let user_agent = {
            let svc = Arc::clone(&self.user_agent);
            let ua = user_agent.to_string();
            self.spawn(async move { svc.parse(&ua).await.map(Enrichment::UserAgent) })
        };

        let (dns, whois, location, user_agent) = tokio::join!(dns, whois, location, user_agent);

        let results = vec![
            finish(Source::Dns, dns),
            finish(Source::Whois, whois),
            finish(Source::Location, location),
            finish(Source::UserAgent, user_agent),
        ];

        for result in &results {
            if let Err(e) = &result.outcome {
                tracing::warn!(source = %result.source, addr, "Enrichment failed: {e}");
            }
        }

        results
    }

    fn spawn<F>(&self, lookup: F) -> JoinHandle<Result<Enrichment, LookupError>>
    where
        F: Future<Output = Result<Enrichment, LookupError>> + Send + 'static,
    {
        let limit = self.timeout;
        tokio::spawn(async move {
            tokio::time::timeout(limit, lookup)
                .await
                .unwrap_or(Err(LookupError::TimedOut(limit)))
        })
    }
}

fn finish(
    source: Source,
    joined: Result<Result<Enrichment, LookupError>, tokio::task::JoinError>,
) -> EnrichmentResult {
    let outcome = joined.unwrap_or_else(|e| Err(LookupError::Aborted(e.to_string())));
    EnrichmentResult { source, outcome }
}
