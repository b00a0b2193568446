//! IP allowlist applied in front of every route except the health check.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

pub const HEALTH_PATH: &str = "/health";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Permitted client IPs. Empty means every caller is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    ips: BTreeSet<String>,
}

impl Allowlist {
    /// Parses a comma-separated list, dropping blank entries.
    pub fn parse(raw: &str) -> Self {
        let ips = raw
            .split(',')
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .collect();
        Self { ips }
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn permits(&self, ip: &str) -> bool {
        self.ips.is_empty() || self.ips.contains(ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ips.iter().map(String::as_str)
    }
}

/// Caller IP as determined by the gate, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// First `X-Forwarded-For` entry, else the peer address, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

fn request_ip(request: &Request) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip(request.headers(), peer)
}

pub async fn enforce(State(allowlist): State<Arc<Allowlist>>, mut request: Request, next: Next) -> Response {
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !allowlist.permits(&ip) {
        log::warn!("Access denied for {} on {}", ip, request.uri().path());
        return ApiError::Forbidden.into_response();
    }

    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}
