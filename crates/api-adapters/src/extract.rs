//! Request extractors for caller identity and curator access.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::state::AppState;

pub const ADMIN_HEADER: &str = "x-admin-password";

const UNKNOWN_CLIENT: &str = "unknown";

/// Best-effort client address used as the rate-limit identity.
///
/// With proxy headers trusted, takes the first `x-forwarded-for` hop, then
/// `x-real-ip`. Otherwise, or when neither is present, the socket peer.
/// Requests with no address at all share the "unknown" bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn resolve(parts: &Parts, trust_proxy_headers: bool) -> Self {
        let from_headers = if trust_proxy_headers {
            header_ip(&parts.headers)
        } else {
            None
        };
        let ip = from_headers
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        ClientIp(ip)
    }
}

fn header_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(ClientIp::resolve(parts, state.trust_proxy_headers))
    }
}

/// Proof that the request carried the curator secret.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok());
        state.admin.authorize(presented)?;
        Ok(AdminAccess)
    }
}
