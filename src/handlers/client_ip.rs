//! Client address extraction for upload metadata.
//!
//! Forwarding headers are only honored through the configured number of
//! trusted proxies; otherwise the socket address is used.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

/// Socket address of the peer, if the server was started with connect info.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

/// Best-effort client IP as a string, `"unknown"` when nothing usable exists.
pub fn client_ip(headers: &HeaderMap, socket: Option<SocketAddr>, trusted_proxies: usize) -> String {
    if trusted_proxies > 0 {
        if let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| from_forwarded_for(v, trusted_proxies))
        {
            return ip;
        }
        if let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| v.parse::<IpAddr>().is_ok())
        {
            return ip.to_string();
        }
    }

    socket
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// With N trusted proxies the client is the entry N positions from the end.
fn from_forwarded_for(value: &str, trusted_proxies: usize) -> Option<String> {
    let hops: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let index = hops.len().checked_sub(trusted_proxies)?;
    let candidate = hops.get(index)?;
    candidate.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}
