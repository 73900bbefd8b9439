use axum::{Extension, http::StatusCode, response::Response};

use crate::server::{
    error::Error,
    get_app_version,
    services::ProxyServices,
    utils::{
        header_utils::html_response,
        page_utils::{LandingInfo, landing_page},
    },
};

const LANDING_CACHE_CONTROL: &str = "public, max-age=3600";

pub async fn index_endpoint(Extension(services): Extension<ProxyServices>) -> Response {
    let info = LandingInfo {
        version: get_app_version(),
        rate_limit_max_requests: services.config.rate_limit_max_requests,
        rate_limit_window_seconds: services.config.rate_limit_window_seconds,
    };

    html_response(StatusCode::OK, landing_page(&info), LANDING_CACHE_CONTROL)
}

pub async fn not_found_endpoint() -> Error {
    Error::NotFound
}
