use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// still serving, but the limiter is at its client cap and evicting
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct RateLimiterHealth {
    pub tracked_clients: usize,
    pub max_clients: usize,
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub rate_limiter: RateLimiterHealth,
}
