use axum::Extension;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::server::error::Error;
use crate::server::services::ProxyServices;
use crate::server::services::rate_limit_services::RateLimitResult;

/// the client a request is counted against, admitted by the rate limiter. the string is the
/// caller's ip as far as we can tell
pub struct RateLimitedClient(pub String, pub ProxyServices);

/// first hop of X-Forwarded-For, then X-Real-IP, then the socket peer, then "unknown"
pub fn client_id_from_parts(parts: &Parts) -> String {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .or_else(|| {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// runs before any query parsing, so a flooding client gets its 429 even for malformed requests
impl<S> FromRequestParts<S> for RateLimitedClient
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<ProxyServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        let client_id = client_id_from_parts(parts);

        match services.rate_limit.check_rate_limit(&client_id).await {
            RateLimitResult::Allowed { remaining } => {
                debug!("Client {} admitted, {} left in window", client_id, remaining);
                Ok(RateLimitedClient(client_id, services))
            }
            RateLimitResult::RateLimited { retry_after } => {
                warn!("Client {} rate limited for {}s", client_id, retry_after);
                Err(Error::RateLimited { retry_after })
            }
        }
    }
}
