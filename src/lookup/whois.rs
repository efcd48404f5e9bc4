use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::LookupError;

const WHOIS_PORT: u16 = 43;
const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub query: String,
    pub body: String,
}

#[async_trait]
pub trait WhoisClient: Send + Sync {
    async fn lookup(&self, addr: &str) -> Result<Response, LookupError>;
}

/// RFC 3912 client. Asks the root server first and follows at most one
/// `refer:` / `whois:` referral to the registry that owns the address.
pub struct TcpWhoisClient {
    root_server: String,
    port: u16,
}

impl TcpWhoisClient {
    pub fn new(root_server: String) -> Self {
        Self {
            root_server,
            port: WHOIS_PORT,
        }
    }

    #[cfg(test)]
    fn with_port(root_server: String, port: u16) -> Self {
        Self { root_server, port }
    }

    async fn query(&self, server: &str, query: &str) -> Result<String, LookupError> {
        let mut stream = TcpStream::connect((server, self.port))
            .await
            .map_err(|e| LookupError::Failed(format!("connect {server}: {e}")))?;

        stream
            .write_all(format!("{query}\r\n").as_bytes())
            .await
            .map_err(|e| LookupError::Failed(format!("write {server}: {e}")))?;

        let mut body = Vec::new();
        (&mut stream)
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .await
            .map_err(|e| LookupError::Failed(format!("read {server}: {e}")))?;

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl WhoisClient for TcpWhoisClient {
    async fn lookup(&self, addr: &str) -> Result<Response, LookupError> {
        if addr.is_empty() || addr.contains(['\r', '\n']) {
            return Err(LookupError::InvalidAddress(addr.to_string()));
        }

        let root_body = self.query(&self.root_server, addr).await?;
        let body = match find_referral(&root_body) {
            Some(server) if !server.eq_ignore_ascii_case(&self.root_server) => {
                tracing::debug!(addr, server = %server, "Following WHOIS referral");
                self.query(&server, addr).await?
            }
            _ => root_body,
        };

        Ok(Response {
            query: addr.to_string(),
            body,
        })
    }
}

/// Extract the referred server from a root WHOIS answer.
fn find_referral(body: &str) -> Option<String> {
    body.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_ascii_lowercase();
        if key != "refer" && key != "whois" {
            return None;
        }
        let value = value.trim();
        let value = value.strip_prefix("whois://").unwrap_or(value);
        let value = value.split('/').next().unwrap_or_default();
        (!value.is_empty()).then(|| value.to_string())
    })
}
