use axum::{Router, http::StatusCode, response::Response, routing::get};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use url::Url;
use validator::Validate;

use crate::server::{
    error::{AppResult, Error},
    extractors::{RateLimitedClient, ValidatedQuery},
    services::ProxyServices,
    utils::{
        header_utils::{PAGE_CACHE_CONTROL, html_response},
        host_utils::{is_allowed_url, is_web_url},
        vidsrc_utils::{EmbedIds, PlaybackOptions, episode_embed_url, movie_embed_url, tv_embed_url},
    },
};

static IMDB_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^tt\d{5,10}$").expect("static imdb pattern should compile"));

#[derive(Debug, Deserialize, Validate)]
pub struct EmbedQuery {
    /// presence is checked by the handler, an empty value counts as missing there
    #[validate(length(max = 2048, message = "url parameter is too long"))]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MovieQuery {
    pub tmdb: Option<u64>,
    #[validate(regex(path = *IMDB_ID, message = "Invalid imdb id"))]
    pub imdb: Option<String>,
    #[validate(url(message = "Invalid sub_url parameter"))]
    pub sub_url: Option<String>,
    #[validate(length(min = 2, max = 8, message = "Invalid ds_lang parameter"))]
    pub ds_lang: Option<String>,
    #[validate(range(max = 1, message = "autoplay must be 0 or 1"))]
    pub autoplay: Option<u8>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TvQuery {
    pub tmdb: Option<u64>,
    #[validate(regex(path = *IMDB_ID, message = "Invalid imdb id"))]
    pub imdb: Option<String>,
    #[validate(range(min = 1, message = "season starts at 1"))]
    pub season: Option<u32>,
    #[validate(range(min = 1, message = "episode starts at 1"))]
    pub episode: Option<u32>,
    #[validate(url(message = "Invalid sub_url parameter"))]
    pub sub_url: Option<String>,
    #[validate(length(min = 2, max = 8, message = "Invalid ds_lang parameter"))]
    pub ds_lang: Option<String>,
    #[validate(range(max = 1, message = "autoplay must be 0 or 1"))]
    pub autoplay: Option<u8>,
    #[validate(range(max = 1, message = "autonext must be 0 or 1"))]
    pub autonext: Option<u8>,
}

pub struct EmbedController;

impl EmbedController {
    pub fn app() -> Router {
        Router::new()
            .route("/", get(Self::embed_get))
            .route("/movie", get(Self::movie_get))
            .route("/tv", get(Self::tv_get))
    }

    /// an absolute http(s) url on one of the allowed embed hosts
    pub fn parse_target(raw: &str) -> AppResult<Url> {
        let target = Url::parse(raw.trim())
            .map_err(|_| Error::BadRequest("Invalid url parameter".to_string()))?;

        if !is_web_url(&target) {
            return Err(Error::BadRequest(
                "Only http and https urls can be embedded".to_string(),
            ));
        }

        if !is_allowed_url(&target) {
            return Err(Error::HostNotAllowed(
                target.host_str().unwrap_or_default().to_string(),
            ));
        }

        Ok(target)
    }

    async fn render(services: &ProxyServices, target: Url) -> AppResult<Response> {
        let html = services.embed.render(&target).await?;
        Ok(html_response(StatusCode::OK, html, PAGE_CACHE_CONTROL))
    }

    async fn embed_get(
        RateLimitedClient(client_id, services): RateLimitedClient,
        ValidatedQuery(query): ValidatedQuery<EmbedQuery>,
    ) -> AppResult<Response> {
        let Some(raw) = query.url.filter(|url| !url.trim().is_empty()) else {
            return Err(Error::BadRequest("Missing url parameter".to_string()));
        };

        let target = Self::parse_target(&raw)?;
        debug!("Client {} embedding {}", client_id, target);

        Self::render(&services, target).await
    }

    async fn movie_get(
        RateLimitedClient(client_id, services): RateLimitedClient,
        ValidatedQuery(query): ValidatedQuery<MovieQuery>,
    ) -> AppResult<Response> {
        let ids = EmbedIds {
            tmdb: query.tmdb,
            imdb: query.imdb,
        };
        if ids.is_empty() {
            return Err(Error::BadRequest(
                "Either a tmdb or an imdb id is required".to_string(),
            ));
        }

        let opts = PlaybackOptions {
            sub_url: query.sub_url,
            ds_lang: query.ds_lang,
            autoplay: query.autoplay,
            autonext: None,
        };

        let target = movie_embed_url(&ids, &opts);
        debug!("Client {} embedding movie {}", client_id, target);

        Self::render(&services, target).await
    }

    async fn tv_get(
        RateLimitedClient(client_id, services): RateLimitedClient,
        ValidatedQuery(query): ValidatedQuery<TvQuery>,
    ) -> AppResult<Response> {
        let ids = EmbedIds {
            tmdb: query.tmdb,
            imdb: query.imdb,
        };
        if ids.is_empty() {
            return Err(Error::BadRequest(
                "Either a tmdb or an imdb id is required".to_string(),
            ));
        }

        let target = match (query.season, query.episode) {
            (Some(season), Some(episode)) => {
                let opts = PlaybackOptions {
                    sub_url: query.sub_url,
                    ds_lang: query.ds_lang,
                    autoplay: query.autoplay,
                    autonext: query.autonext,
                };
                episode_embed_url(&ids, season, episode, &opts)
            }
            (None, None) => tv_embed_url(&ids, query.ds_lang.as_deref()),
            _ => {
                return Err(Error::BadRequest(
                    "season and episode have to be given together".to_string(),
                ));
            }
        };
        debug!("Client {} embedding show {}", client_id, target);

        Self::render(&services, target).await
    }
}
