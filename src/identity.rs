//! Requester identity: the raw `X-Forwarded-For` value, else the peer IP.
//!
//! Nothing is validated or normalized. A client can spoof the header and a
//! multi-proxy chain is used verbatim.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};

use crate::error::AppError;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<Self> {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .filter(|value| !value.is_empty());

        forwarded
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .map(ClientIdentity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self::resolve(&parts.headers, peer).ok_or(AppError::MissingIdentity)
    }
}
