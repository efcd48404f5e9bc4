use std::fmt::Write;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::response::{AggregateResponse, Reply};

/// Client-identifier prefixes that get the plain-text report. Case-sensitive.
const SCRIPT_PREFIXES: &[&str] = &["curl/", "Wget/", "HTTPie/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Script,
    Browser,
}

pub fn classify(headers: &HeaderMap) -> ClientKind {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if SCRIPT_PREFIXES.iter().any(|p| user_agent.starts_with(p)) {
        ClientKind::Script
    } else {
        ClientKind::Browser
    }
}

/// The line-oriented report sent to command-line clients.
pub fn render_text(response: &AggregateResponse) -> Result<String, std::fmt::Error> {
    let mut out = String::new();

    writeln!(out, "IP: {}", response.remote_addr)?;
    if let Some(reverse) = &response.remote_addr_reverse {
        for name in &reverse.names {
            writeln!(out, "DNS: {name}")?;
        }
    }
    writeln!(out)?;

    writeln!(out, "WHOIS:")?;
    if let Some(whois) = &response.remote_addr_whois {
        write!(out, "{}", whois.body)?;
    }
    writeln!(out)?;
    writeln!(out)?;

    write!(out, "Location:")?;
    if let Some(location) = &response.location {
        for part in [&location.city, &location.region, &location.country] {
            if !part.is_empty() {
                write!(out, " {part}")?;
            }
        }
        // (0, 0) is what providers report for "unknown".
        if location.lat != 0.0 && location.long != 0.0 {
            write!(out, " ({:.4}, {:.4})", location.lat, location.long)?;
        }
    }
    writeln!(out)?;
    writeln!(out)?;

    writeln!(out, "ID: {}", response.request_id.as_deref().unwrap_or(""))?;
    Ok(out)
}

pub fn write_text(result: Result<AggregateResponse, AppError>) -> Response {
    let body = result.and_then(|response| render_text(&response).map_err(AppError::from));

    match body {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            body,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Origin allowed to read the JSON. The scheme reflects TLS terminated by this
/// process only; a TLS-terminating proxy in front still yields `http://`.
pub fn allowed_origin(public_host: &str, tls: bool) -> String {
    let scheme = if tls { "https" } else { "http" };
    format!("{scheme}://{public_host}")
}

pub fn write_json(public_host: &str, tls: bool, reply: &Reply) -> Response {
    let status = if reply.is_err() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    let (status, body) = match serde_json::to_string(reply) {
        Ok(body) => (status, body),
        Err(e) => {
            let err = AppError::from(e);
            tracing::error!("Failed to serialize response: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "Error": err.to_string() }).to_string(),
            )
        }
    };

    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    match HeaderValue::from_str(&allowed_origin(public_host, tls)) {
        Ok(origin) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        Err(e) => tracing::warn!(public_host, "Invalid CORS origin: {e}"),
    }
    response
}
