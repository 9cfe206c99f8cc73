//! Rate limit gate shared by every rate-limited handler.
//!
//! Flow Overview:
//! 1) Resolve the caller from the connection's peer address. `X-Forwarded-For`
//!    only counts through the configured number of trusted proxy hops.
//! 2) Consume one unit of the action's quota.
//! 3) Usable quota yields the disclosure headers for the final response.
//! 4) Exhausted quota becomes a 429 and a store failure a 500 (fail closed).

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use tracing::error;

use crate::ratelimit::{ActionKind, RateLimitHeaders, RateLimiter};

/// Identity used when the peer address is unknown (no connection info).
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Number of reverse proxies in front of the service whose
/// `X-Forwarded-For` entries are trusted. Zero trusts none.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    hops: usize,
}

impl TrustedProxies {
    #[must_use]
    pub const fn new(hops: usize) -> Self {
        Self { hops }
    }

    #[must_use]
    pub const fn hops(self) -> usize {
        self.hops
    }

    /// Client address for a request that arrived from `peer`.
    ///
    /// The chain is every `X-Forwarded-For` entry followed by the peer. The
    /// last `hops` entries are trusted proxies; the one before them is the
    /// client. Anything further left was written by the client and is ignored.
    /// A chain too short for the configured hops, or an unreadable entry,
    /// falls back to the peer.
    #[must_use]
    pub fn client_ip(self, peer: Option<IpAddr>, headers: &HeaderMap) -> Option<IpAddr> {
        let peer = peer.map(|ip| ip.to_canonical());
        if self.hops == 0 {
            return peer;
        }

        let forwarded: Vec<&str> = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();

        // The peer is the nearest trusted hop, so it counts towards `hops`.
        let Some(entry) = forwarded
            .len()
            .checked_sub(self.hops)
            .and_then(|index| forwarded.get(index))
        else {
            return peer;
        };
        parse_hop(entry).or(peer)
    }
}

fn parse_hop(entry: &str) -> Option<IpAddr> {
    entry
        .parse::<IpAddr>()
        .or_else(|_| entry.parse::<SocketAddr>().map(|addr| addr.ip()))
        .ok()
        .map(|ip| ip.to_canonical())
}

/// Rate-limit identity of the caller, also the address a login token is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    #[must_use]
    pub fn resolve(proxies: TrustedProxies, peer: Option<IpAddr>, headers: &HeaderMap) -> Self {
        Self(
            proxies
                .client_ip(peer, headers)
                .map_or_else(|| UNKNOWN_CLIENT.to_string(), |ip| ip.to_string()),
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let proxies = parts
            .extensions
            .get::<TrustedProxies>()
            .copied()
            .unwrap_or_default();
        Ok(Self::resolve(proxies, peer, &parts.headers))
    }
}

/// Consume one unit of `kind` for the caller.
///
/// `Ok` carries the quota headers to attach to the response; `Err` is the
/// response to return as is.
pub async fn admit(
    limiter: &RateLimiter,
    kind: ActionKind,
    client: &ClientIdentity,
) -> Result<HeaderMap, Response> {
    match limiter.consume(kind, client.as_str(), 1).await {
        Ok(status) => {
            let quota = RateLimitHeaders::from_status(&status, limiter.now()).to_header_map();
            if status.usable {
                Ok(quota)
            } else {
                Err((
                    StatusCode::TOO_MANY_REQUESTS,
                    quota,
                    "Too many requests".to_string(),
                )
                    .into_response())
            }
        }
        Err(err) => {
            error!(action = %kind, "Rate limit state unavailable: {err}");
            Err(internal_error(HeaderMap::new()))
        }
    }
}

/// Generic 500 carrying whatever quota headers were already computed; details stay in the logs.
#[must_use]
pub fn internal_error(quota: HeaderMap) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        quota,
        "Internal server error".to_string(),
    )
        .into_response()
}
