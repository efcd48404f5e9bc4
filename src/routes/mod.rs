use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::request::Parts;

pub mod myip;

/// Marker extension present on requests accepted by the TLS listener.
#[derive(Clone, Copy, Debug)]
pub struct TlsConnection;

/// Transport peer address, if the server was started with connect info.
pub(crate) fn peer_addr(parts: &Parts) -> Option<SocketAddr> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0)
}

pub(crate) fn is_tls(parts: &Parts) -> bool {
    parts.extensions.get::<TlsConnection>().is_some()
}
