use axum::Extension;
use axum::Json;
use chrono::Utc;

use crate::logger::Logger;
use crate::server::dtos::health_dto::{HealthResponse, HealthStatus, RateLimiterHealth};
use crate::server::services::ProxyServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// everything lives in process, so the only thing worth reporting is limiter pressure
pub async fn health_endpoint(Extension(services): Extension<ProxyServices>) -> Json<HealthResponse> {
    let limiter = services.rate_limit.config();
    let tracked_clients = services.rate_limit.tracked_clients().await;

    let status = if limiter.max_clients > 0 && tracked_clients >= limiter.max_clients {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponse {
        status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: Logger::environment_name(services.config.cargo_env).to_string(),
        rate_limiter: RateLimiterHealth {
            tracked_clients,
            max_clients: limiter.max_clients,
            max_requests: limiter.max_requests_per_window,
            window_seconds: limiter.window_seconds,
        },
    })
}
