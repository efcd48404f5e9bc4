use std::collections::BTreeMap;

use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use serde::Serialize;

use crate::address;
use crate::enrich::{Enrichment, EnrichmentResult, Lookups};
use crate::error::AppError;
use crate::lookup::{dns, location, useragent, whois};

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Everything about an incoming request that ends up in the response,
/// independent of how its address resolves.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub request_id: String,
    pub method: String,
    pub url: String,
    pub proto: String,
    pub header: BTreeMap<String, Vec<String>>,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            request_id: request_id(&parts.headers),
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            proto: format!("{:?}", parts.version),
            header: header_snapshot(&parts.headers),
            user_agent: parts
                .headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string(),
        }
    }
}

/// Reuse the caller's `X-Request-Id` if it is sane, otherwise mint one.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string)
}

fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut snapshot: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        snapshot.entry(name.as_str().to_string()).or_default().push(value);
    }
    snapshot
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AggregateResponse {
    #[serde(rename = "RequestID", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    pub remote_addr: String,
    pub remote_addr_family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr_reverse: Option<dns::Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr_whois: Option<whois::Response>,

    /// The transport address, kept when a trusted header or override replaced it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_remote_addr: Option<String>,

    pub method: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub proto: String,
    pub header: BTreeMap<String, Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<location::Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<useragent::Client>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub insights: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    #[serde(rename = "Error")]
    pub message: String,
}

impl From<&AppError> for ErrorRecord {
    fn from(err: &AppError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// What goes on the wire: one shape or the other, never both.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Ok(Box<AggregateResponse>),
    Err(ErrorRecord),
}

impl Reply {
    pub fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }
}

/// Merge request metadata and enrichment outcomes into one response.
/// Failed sources leave their field empty and leave a note in `insights`.
pub fn compose(
    remote_addr: &str,
    actual_addr: Option<String>,
    meta: &RequestMeta,
    results: Vec<EnrichmentResult>,
) -> AggregateResponse {
    let mut response = AggregateResponse {
        request_id: Some(meta.request_id.clone()).filter(|id| !id.is_empty()),
        remote_addr: remote_addr.to_string(),
        remote_addr_family: address::address_family(remote_addr).to_string(),
        actual_remote_addr: actual_addr.filter(|addr| addr != remote_addr),
        method: meta.method.clone(),
        url: meta.url.clone(),
        proto: meta.proto.clone(),
        header: meta.header.clone(),
        ..AggregateResponse::default()
    };

    for result in results {
        match result.outcome {
            Ok(Enrichment::Dns(r)) => response.remote_addr_reverse = Some(r),
            Ok(Enrichment::Whois(r)) => response.remote_addr_whois = Some(r),
            Ok(Enrichment::Location(r)) => response.location = Some(r),
            Ok(Enrichment::UserAgent(r)) => response.user_agent = Some(r),
            Err(e) => {
                response
                    .insights
                    .insert(result.source.key().to_string(), e.to_string());
            }
        }
    }

    response
}

/// Diagnostics for a request whose address could not be resolved: enrich the
/// transport peer instead, when there is one, and record what went wrong.
pub async fn add_insights(
    lookups: &Lookups,
    meta: &RequestMeta,
    peer_addr: Option<String>,
    err: &AppError,
) -> AggregateResponse {
    let mut response = match peer_addr.as_deref() {
        Some(addr) => {
            let results = lookups.enrich(addr, &meta.user_agent).await;
            compose(addr, None, meta, results)
        }
        None => compose("", None, meta, Vec::new()),
    };

    response
        .insights
        .insert("error".to_string(), err.to_string());
    response.insights.insert(
        "peer_addr".to_string(),
        peer_addr.unwrap_or_else(|| "unavailable".to_string()),
    );
    response
}
