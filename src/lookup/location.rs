use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use maxminddb::{geoip2, MaxMindDBError};
use serde::{Deserialize, Serialize};

use super::LookupError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub city: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub long: f64,
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, addr: &str) -> Result<Response, LookupError>;
}

fn parse_ip(addr: &str) -> Result<IpAddr, LookupError> {
    addr.parse()
        .map_err(|_| LookupError::InvalidAddress(addr.to_string()))
}

// --- MaxMind City database ---

pub struct MaxMindLocator {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindLocator {
    pub fn open(path: &Path) -> Result<Self, LookupError> {
        let reader = maxminddb::Reader::open_readfile(path)
            .map_err(|e| LookupError::Failed(format!("open {}: {e}", path.display())))?;
        Ok(Self { reader })
    }
}

#[async_trait]
impl GeoLocator for MaxMindLocator {
    async fn locate(&self, addr: &str) -> Result<Response, LookupError> {
        let ip = parse_ip(addr)?;
        let city: geoip2::City = self.reader.lookup(ip).map_err(|e| match e {
            MaxMindDBError::AddressNotFoundError(_) => {
                LookupError::Failed(format!("{addr} not in database"))
            }
            e => LookupError::Failed(e.to_string()),
        })?;

        let location = city.location.as_ref();
        Ok(Response {
            city: english_name(city.city.as_ref().and_then(|c| c.names.as_ref())),
            region: english_name(
                city.subdivisions
                    .as_ref()
                    .and_then(|s| s.first())
                    .and_then(|s| s.names.as_ref()),
            ),
            country: city
                .country
                .as_ref()
                .and_then(|c| c.iso_code)
                .unwrap_or_default()
                .to_string(),
            lat: location.and_then(|l| l.latitude).unwrap_or_default(),
            long: location.and_then(|l| l.longitude).unwrap_or_default(),
        })
    }
}

fn english_name(names: Option<&BTreeMap<&str, &str>>) -> String {
    names
        .and_then(|n| n.get("en"))
        .map(ToString::to_string)
        .unwrap_or_default()
}

// --- HTTP JSON endpoint (ip-api.com style) ---

pub struct HttpLocator {
    url_template: String,
    client: reqwest::Client,
}

impl HttpLocator {
    /// `url_template` must contain `{ip}`, e.g. `http://ip-api.com/json/{ip}`.
    pub fn new(url_template: String) -> Self {
        Self {
            url_template,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct HttpLocation {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    city: String,
    #[serde(default)]
    region: String,
    #[serde(default, rename = "regionName")]
    region_name: Option<String>,
    #[serde(default)]
    country: String,
    #[serde(default, rename = "countryCode")]
    country_code: Option<String>,
    #[serde(default)]
    lat: f64,
    #[serde(default, alias = "lon")]
    long: f64,
}

#[async_trait]
impl GeoLocator for HttpLocator {
    async fn locate(&self, addr: &str) -> Result<Response, LookupError> {
        let ip = parse_ip(addr)?;
        let url = self.url_template.replace("{ip}", &ip.to_string());

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::Failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| LookupError::Failed(e.to_string()))?
            .json::<HttpLocation>()
            .await
            .map_err(|e| LookupError::Failed(e.to_string()))?;

        if resp.status.as_deref() == Some("fail") {
            return Err(LookupError::Failed(
                resp.message.unwrap_or_else(|| "location unavailable".to_string()),
            ));
        }

        Ok(Response {
            city: resp.city,
            region: resp.region_name.unwrap_or(resp.region),
            country: resp.country_code.unwrap_or(resp.country),
            lat: resp.lat,
            long: resp.long,
        })
    }
}

// --- No provider configured ---

pub struct UnconfiguredLocator;

#[async_trait]
impl GeoLocator for UnconfiguredLocator {
    async fn locate(&self, _addr: &str) -> Result<Response, LookupError> {
        Err(LookupError::NotConfigured)
    }
}
