use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::server::services::fetch_services::FetchError;
use crate::server::utils::header_utils::html_response;
use crate::server::utils::page_utils::error_page;

pub type AppResult<T> = Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),

    #[error("rate limit exceeded, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("not found")]
    NotFound,

    #[error("upstream request failed: {0}")]
    Upstream(#[from] FetchError),

    #[error("internal server error")]
    InternalServerError,

    #[error("{0}")]
    InternalServerErrorWithContext(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::HostNotAllowed(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream(_)
            | Self::InternalServerError
            | Self::InternalServerErrorWithContext(_)
            | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// (title, message) shown to the client. internal errors only ever get a generic message,
    /// the detail goes to the logs
    fn public_message(&self) -> (&'static str, String) {
        match self {
            Self::BadRequest(msg) => ("Invalid request", msg.clone()),
            Self::HostNotAllowed(host) => (
                "Invalid request",
                format!("The host '{}' is not an allowed embed source.", host),
            ),
            Self::RateLimited { retry_after } => (
                "Too many requests",
                format!("Rate limit exceeded. Please try again in {} seconds.", retry_after),
            ),
            Self::NotFound => ("Not found", "Nothing lives at this address.".to_string()),
            Self::Upstream(e) => (
                "Unable to load video",
                format!("There was an error loading the video page: {}", e),
            ),
            Self::InternalServerError
            | Self::InternalServerErrorWithContext(_)
            | Self::Anyhow(_) => (
                "Unable to load video",
                "There was an error processing the video URL.".to_string(),
            ),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
        }

        let (title, message) = self.public_message();
        let mut response =
            html_response(status, error_page(status.as_u16(), title, &message), "no-store");

        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}
